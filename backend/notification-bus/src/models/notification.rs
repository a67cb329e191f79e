use super::time::{now_created_at, parse_timestamp_millis};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Notification severity
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationType {
    pub const ALL: [NotificationType; 4] = [
        NotificationType::Info,
        NotificationType::Success,
        NotificationType::Warning,
        NotificationType::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Info => "info",
            NotificationType::Success => "success",
            NotificationType::Warning => "warning",
            NotificationType::Error => "error",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(NotificationType::Info),
            "success" => Ok(NotificationType::Success),
            "warning" | "warn" => Ok(NotificationType::Warning),
            "error" => Ok(NotificationType::Error),
            other => Err(format!(
                "unknown notification type '{}' (expected info, success, warning or error)",
                other
            )),
        }
    }
}

/// A single persisted notification
///
/// Field names on the wire match the JSON array other readers of the
/// `notifications` key already understand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Creation time in epoch milliseconds, bumped when needed to stay unique
    pub id: i64,

    pub message: String,

    #[serde(rename = "type")]
    pub kind: NotificationType,

    pub read: bool,

    pub created_at: String,
}

impl Notification {
    /// Build an unread notification whose id sorts after everything in `existing`.
    pub fn new(
        message: impl Into<String>,
        kind: NotificationType,
        existing: &[Notification],
        now_ms: i64,
    ) -> Self {
        Self {
            id: next_id(existing, now_ms),
            message: message.into(),
            kind,
            read: false,
            created_at: now_created_at(),
        }
    }

    /// Ordering key for "most recent first" views
    pub fn recency_key(&self) -> i64 {
        parse_timestamp_millis(&self.created_at).unwrap_or(self.id)
    }
}

/// `now_ms`, unless an existing id is already at or past it.
pub fn next_id(existing: &[Notification], now_ms: i64) -> i64 {
    match existing.iter().map(|n| n.id).max() {
        Some(max) if max >= now_ms => max + 1,
        _ => now_ms,
    }
}

pub fn unread_count(list: &[Notification]) -> usize {
    list.iter().filter(|n| !n.read).count()
}

/// Top `limit` entries ordered by parsed `createdAt` descending, id as fallback.
pub fn most_recent(list: &[Notification], limit: usize) -> Vec<Notification> {
    let mut sorted = list.to_vec();
    sorted.sort_by_key(|n| std::cmp::Reverse(n.recency_key()));
    sorted.truncate(limit);
    sorted
}

/// One element of the stored array
///
/// Elements that do not decode as a [`Notification`] are kept verbatim so a
/// write never drops records this version does not understand.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
enum StoredEntry {
    Known(Notification),
    Unknown(Value),
}

/// The persisted `notifications` array, newest first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NotificationList {
    entries: Vec<StoredEntry>,
}

impl NotificationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored elements, including ones that did not decode
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Elements kept verbatim because they did not decode
    pub fn undecoded(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, StoredEntry::Unknown(_)))
            .count()
    }

    /// Decoded notifications in stored order
    pub fn notifications(&self) -> Vec<Notification> {
        self.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter().filter_map(|e| match e {
            StoredEntry::Known(n) => Some(n),
            StoredEntry::Unknown(_) => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Notification> {
        self.entries.iter_mut().filter_map(|e| match e {
            StoredEntry::Known(n) => Some(n),
            StoredEntry::Unknown(_) => None,
        })
    }

    pub fn prepend(&mut self, notification: Notification) {
        self.entries.insert(0, StoredEntry::Known(notification));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn unread(&self) -> usize {
        self.iter().filter(|n| !n.read).count()
    }
}

impl From<Vec<Notification>> for NotificationList {
    fn from(list: Vec<Notification>) -> Self {
        Self {
            entries: list.into_iter().map(StoredEntry::Known).collect(),
        }
    }
}

impl<'de> Deserialize<'de> for NotificationList {
    /// Only the outer array must be well formed; elements decode one by one.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<Value>::deserialize(deserializer)?;
        let entries = values
            .into_iter()
            .map(|value| match Notification::deserialize(&value) {
                Ok(n) => StoredEntry::Known(n),
                Err(_) => StoredEntry::Unknown(value),
            })
            .collect();
        Ok(Self { entries })
    }
}

/// What every observer derives from the stored list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationSnapshot {
    pub unread: usize,
    pub recent: Vec<Notification>,
}

impl NotificationSnapshot {
    pub fn from_list(list: &[Notification], limit: usize) -> Self {
        Self {
            unread: unread_count(list),
            recent: most_recent(list, limit),
        }
    }
}

/// Payload posted across processes after every change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnreadMessage {
    pub unread: usize,
}
