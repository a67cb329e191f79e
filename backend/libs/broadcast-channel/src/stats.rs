//! Delivery statistics for a broadcast channel

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const MAX_LATENCY_SAMPLES: usize = 1000;

/// Snapshot of channel activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastStats {
    pub posted: u64,
    pub delivered: u64,
    pub skipped_own: u64,
    pub errors: u64,
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
}

/// Thread-safe statistics collector shared by publishers and subscribers
#[derive(Clone, Default)]
pub struct StatsCollector {
    posted: Arc<AtomicU64>,
    delivered: Arc<AtomicU64>,
    skipped_own: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    latencies: Arc<Mutex<Vec<f64>>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_post(&self) {
        self.posted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self, latency_ms: f64) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.push(latency_ms.max(0.0));
            if latencies.len() > MAX_LATENCY_SAMPLES {
                latencies.drain(0..MAX_LATENCY_SAMPLES / 2);
            }
        }
    }

    /// Envelope came back to the origin that posted it
    pub fn record_skipped_own(&self) {
        self.skipped_own.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BroadcastStats {
        let (p50, p99) = match self.latencies.lock() {
            Ok(latencies) if !latencies.is_empty() => {
                let mut sorted = latencies.clone();
                sorted.sort_by(f64::total_cmp);
                (percentile(&sorted, 0.50), percentile(&sorted, 0.99))
            }
            _ => (0.0, 0.0),
        };

        BroadcastStats {
            posted: self.posted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            skipped_own: self.skipped_own.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            latency_p50_ms: p50,
            latency_p99_ms: p99,
        }
    }

    pub fn reset(&self) {
        self.posted.store(0, Ordering::Relaxed);
        self.delivered.store(0, Ordering::Relaxed);
        self.skipped_own.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.clear();
        }
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = (sorted.len() as f64 * q) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_starts_empty() {
        let stats = StatsCollector::new().snapshot();
        assert_eq!(stats.posted, 0);
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.latency_p50_ms, 0.0);
    }

    #[test]
    fn test_counters() {
        let collector = StatsCollector::new();
        collector.record_post();
        collector.record_post();
        collector.record_delivery(3.0);
        collector.record_skipped_own();
        collector.record_error();

        let stats = collector.snapshot();
        assert_eq!(stats.posted, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.skipped_own, 1);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn test_latency_percentiles() {
        let collector = StatsCollector::new();
        for i in 1..=100 {
            collector.record_delivery(i as f64);
        }

        let stats = collector.snapshot();
        assert!(stats.latency_p50_ms >= 49.0 && stats.latency_p50_ms <= 51.0);
        assert!(stats.latency_p99_ms >= 98.0 && stats.latency_p99_ms <= 100.0);
    }

    #[test]
    fn test_negative_latency_clamped() {
        // clock skew between hosts can make sent_at land in the future
        let collector = StatsCollector::new();
        collector.record_delivery(-12.0);
        assert_eq!(collector.snapshot().latency_p50_ms, 0.0);
    }

    #[test]
    fn test_clones_share_counters() {
        let a = StatsCollector::new();
        let b = a.clone();
        a.record_post();
        b.record_post();
        assert_eq!(a.snapshot().posted, 2);

        b.reset();
        assert_eq!(a.snapshot().posted, 0);
    }
}
