//! Error types for broadcast channel operations

use thiserror::Error;

/// Broadcast channel errors
#[derive(Error, Debug)]
pub enum BroadcastError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Envelope serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Channel name rejected before connecting
    #[error("Invalid channel name: {0}")]
    InvalidChannel(String),

    /// Malformed envelope received on the channel
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Subscriber callback failed
    #[error("Callback execution failed: {0}")]
    CallbackFailed(String),
}

impl BroadcastError {
    /// Whether the failure means the channel itself is unreachable.
    ///
    /// Publishers treat these as "channel unsupported" and skip the path.
    pub fn is_unavailable(&self) -> bool {
        match self {
            BroadcastError::Redis(e) => {
                e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BroadcastError::InvalidChannel("bad name".to_string());
        assert_eq!(err.to_string(), "Invalid channel name: bad name");

        let err = BroadcastError::CallbackFailed("observer gone".to_string());
        assert_eq!(err.to_string(), "Callback execution failed: observer gone");
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: BroadcastError = json_err.into();
        assert!(matches!(err, BroadcastError::Serialization(_)));
        assert!(!err.is_unavailable());
    }
}
