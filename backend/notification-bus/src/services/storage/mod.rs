//! Key/value backends for persisted bus state
//!
//! Every value is an opaque string (JSON in practice). Backends only promise
//! atomicity of a single `compare_and_swap`; the bus builds its
//! read-modify-write on top of that.

mod file;
mod memory;
mod redis_store;

pub use self::file::FileStorage;
pub use self::memory::MemoryStorage;
pub use self::redis_store::RedisStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Native "this key changed" signal emitted by the backend itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Write `new` only if the current value equals `expected`
    /// (`None` meaning "absent"). Returns whether the write happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> StorageResult<bool>;

    /// Change feed for writers sharing this backend in-process.
    ///
    /// Backends without one return `None`; observers then rely on the bus
    /// signals alone.
    fn changes(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        None
    }
}

/// Load a JSON value, falling back to `T::default()` when the key is absent,
/// unreadable or malformed.
pub async fn load_json_or_default<T>(storage: &dyn Storage, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match storage.get(key).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(key = %key, error = %e, "Storage read failed, using defaults");
            return T::default();
        }
    };

    match raw {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "Stored value is malformed, using defaults");
            T::default()
        }),
        None => T::default(),
    }
}

pub async fn save_json<T: Serialize>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> crate::error::Result<()> {
    let encoded = serde_json::to_string(value)?;
    storage.set(key, &encoded).await?;
    Ok(())
}
