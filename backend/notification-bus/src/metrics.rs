use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

static BUS_OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_bus_operations_total",
            "Mutating operations completed by the notification bus",
        ),
        &["operation"],
    )
    .expect("failed to create notification_bus_operations_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_bus_operations_total");
    counter
});

static FANOUT_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_bus_fanout_failures_total",
            "Fan-out deliveries that were skipped",
        ),
        &["path"],
    )
    .expect("failed to create notification_bus_fanout_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_bus_fanout_failures_total");
    counter
});

static MALFORMED_READS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "notification_bus_malformed_reads_total",
        "Stored lists that failed to parse and were treated as empty",
    )
    .expect("failed to create notification_bus_malformed_reads_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_bus_malformed_reads_total");
    counter
});

static DEGRADED_WRITES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "notification_bus_degraded_writes_total",
        "Writes kept in memory because storage rejected them",
    )
    .expect("failed to create notification_bus_degraded_writes_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_bus_degraded_writes_total");
    counter
});

static CAS_RETRIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "notification_bus_cas_retries_total",
        "Compare-and-swap attempts lost to a concurrent writer",
    )
    .expect("failed to create notification_bus_cas_retries_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_bus_cas_retries_total");
    counter
});

static UNREAD_NOTIFICATIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "notification_bus_unread",
        "Unread count after the most recent mutation",
    )
    .expect("failed to create notification_bus_unread");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register notification_bus_unread");
    gauge
});

/// Operations that carry a series in `notification_bus_operations_total`
pub const OPERATIONS: [&str; 4] = ["publish", "mark_all_read", "mark_one_read", "clear_all"];

/// Register every series at zero so a fresh process exports all of them.
pub fn init() {
    for operation in OPERATIONS {
        BUS_OPERATIONS_TOTAL.with_label_values(&[operation]);
    }
    FANOUT_FAILURES_TOTAL.with_label_values(&["broadcast"]);
    Lazy::force(&MALFORMED_READS_TOTAL);
    Lazy::force(&DEGRADED_WRITES_TOTAL);
    Lazy::force(&CAS_RETRIES_TOTAL);
    Lazy::force(&UNREAD_NOTIFICATIONS);
}

pub fn record_operation(operation: &str) {
    BUS_OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn record_fanout_failure(path: &str) {
    FANOUT_FAILURES_TOTAL.with_label_values(&[path]).inc();
}

pub fn record_malformed_read() {
    MALFORMED_READS_TOTAL.inc();
}

pub fn record_degraded_write() {
    DEGRADED_WRITES_TOTAL.inc();
}

pub fn record_cas_retry() {
    CAS_RETRIES_TOTAL.inc();
}

pub fn set_unread(unread: usize) {
    UNREAD_NOTIFICATIONS.set(unread as i64);
}

/// Prometheus text exposition of everything in the default registry
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_recorded_series() {
        record_operation("publish");
        record_fanout_failure("broadcast");
        set_unread(3);

        let text = gather_metrics().unwrap();
        assert!(text.contains("notification_bus_operations_total"));
        assert!(text.contains("path=\"broadcast\""));
        assert!(text.contains("notification_bus_unread"));
    }

    #[test]
    fn test_init_exports_every_family() {
        init();

        let text = gather_metrics().unwrap();
        for family in [
            "notification_bus_operations_total",
            "notification_bus_fanout_failures_total",
            "notification_bus_malformed_reads_total",
            "notification_bus_degraded_writes_total",
            "notification_bus_cas_retries_total",
            "notification_bus_unread",
        ] {
            assert!(text.contains(family), "missing {}", family);
        }
        for operation in OPERATIONS {
            assert!(text.contains(&format!("operation=\"{}\"", operation)));
        }
    }
}
