//! Timestamp helpers for `createdAt` strings

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// Formats accepted besides RFC 3339, tried in order.
///
/// The first is what an en-US browser writes for `toLocaleString()`,
/// which is how older lists were persisted.
const LOCAL_FORMATS: &[&str] = &[
    "%m/%d/%Y, %I:%M:%S %p",
    "%m/%d/%Y, %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Timestamp written into new notifications
pub fn now_created_at() -> String {
    Local::now().to_rfc3339()
}

/// Parse a stored `createdAt` into epoch milliseconds.
///
/// Offset-less formats are read as local time. Returns `None` for anything
/// unrecognised so callers can fall back to the id.
pub fn parse_timestamp_millis(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }

    LOCAL_FORMATS.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(value, fmt).ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.timestamp_millis())
    })
}

/// Compact age like `42s`, `5m`, `3h`, `2d`.
///
/// Unparseable timestamps count as "just now"; future timestamps clamp to `0s`.
pub fn relative_time(created_at: &str, now: DateTime<Utc>) -> String {
    let now_ms = now.timestamp_millis();
    let then_ms = parse_timestamp_millis(created_at).unwrap_or(now_ms);
    let diff = ((now_ms - then_ms) / 1000).max(0);

    match diff {
        d if d < 60 => format!("{}s", d),
        d if d < 3_600 => format!("{}m", d / 60),
        d if d < 86_400 => format!("{}h", d / 3_600),
        d => format!("{}d", d / 86_400),
    }
}
