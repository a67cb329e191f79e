//! Error types for the notification bus

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BusError>;

/// Errors surfaced by bus operations
///
/// Malformed persisted state and broadcast failures never reach callers;
/// they are absorbed where they happen.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Every compare-and-swap attempt lost to a concurrent writer
    #[error("Concurrent update conflict on '{key}' after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors from a key/value backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Quota exceeded writing '{key}': {needed} bytes needed, limit {limit}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_converts() {
        let err: BusError = StorageError::InvalidKey("../etc".into()).into();
        assert!(matches!(err, BusError::Storage(StorageError::InvalidKey(_))));
        assert_eq!(
            err.to_string(),
            "Storage error: Invalid storage key: \"../etc\""
        );
    }

    #[test]
    fn test_conflict_display() {
        let err = BusError::Conflict {
            key: "notifications".into(),
            attempts: 9,
        };
        assert_eq!(
            err.to_string(),
            "Concurrent update conflict on 'notifications' after 9 attempts"
        );
    }
}
