use super::{Storage, StorageEvent, StorageResult};
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const CHANGE_CAPACITY: usize = 64;
const UNLIMITED: usize = usize::MAX;

/// Process-local storage, shared by cloning
///
/// An optional byte quota makes writes fail the way a full browser store
/// does, which is how degraded-mode behaviour gets exercised.
#[derive(Clone)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
    quota: Arc<AtomicUsize>,
    changes: broadcast::Sender<StorageEvent>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            quota: Arc::new(AtomicUsize::new(UNLIMITED)),
            changes,
        }
    }

    /// Cap the total size of stored values in bytes
    pub fn with_quota(self, bytes: usize) -> Self {
        self.set_quota(Some(bytes));
        self
    }

    pub fn set_quota(&self, bytes: Option<usize>) {
        self.quota
            .store(bytes.unwrap_or(UNLIMITED), Ordering::Relaxed);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn check_quota(
        &self,
        entries: &HashMap<String, String>,
        key: &str,
        value: &str,
    ) -> StorageResult<()> {
        let limit = self.quota.load(Ordering::Relaxed);
        if limit == UNLIMITED {
            return Ok(());
        }

        let others: usize = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, v)| v.len())
            .sum();
        let needed = others + value.len();
        if needed > limit {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                needed,
                limit,
            });
        }
        Ok(())
    }

    fn notify(&self, key: &str) {
        // no receivers is fine
        let _ = self.changes.send(StorageEvent {
            key: key.to_string(),
        });
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        {
            let mut entries = self.entries.write().await;
            self.check_quota(&entries, key, value)?;
            entries.insert(key.to_string(), value.to_string());
        }
        self.notify(key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            self.notify(key);
        }
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> StorageResult<bool> {
        {
            let mut entries = self.entries.write().await;
            if entries.get(key).map(String::as_str) != expected {
                return Ok(false);
            }
            self.check_quota(&entries, key, new)?;
            entries.insert(key.to_string(), new.to_string());
        }
        self.notify(key);
        Ok(true)
    }

    fn changes(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        Some(self.changes.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("k").await.unwrap(), None);

        storage.set("k", "v").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("v"));

        storage.remove("k").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), None);
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let storage = MemoryStorage::new();

        assert!(storage.compare_and_swap("k", None, "1").await.unwrap());
        assert!(!storage.compare_and_swap("k", None, "2").await.unwrap());
        assert!(!storage.compare_and_swap("k", Some("0"), "2").await.unwrap());
        assert!(storage.compare_and_swap("k", Some("1"), "2").await.unwrap());
        assert_eq!(storage.get("k").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_quota_rejects_large_write() {
        let storage = MemoryStorage::new().with_quota(4);
        storage.set("a", "12").await.unwrap();

        let err = storage.set("b", "345").await.unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { needed: 5, limit: 4, .. }));

        // overwriting the same key only counts the new value
        storage.set("a", "1234").await.unwrap();

        storage.set_quota(None);
        storage.set("b", "345").await.unwrap();
        assert_eq!(storage.len().await, 2);
    }

    #[tokio::test]
    async fn test_clones_share_entries_and_changes() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        let mut changes = storage.changes().unwrap();

        other.set("notifications", "[]").await.unwrap();

        assert_eq!(storage.get("notifications").await.unwrap().as_deref(), Some("[]"));
        assert_eq!(changes.recv().await.unwrap().key, "notifications");
    }

    #[tokio::test]
    async fn test_failed_cas_emits_nothing() {
        let storage = MemoryStorage::new();
        let mut changes = storage.changes().unwrap();

        assert!(!storage.compare_and_swap("k", Some("x"), "y").await.unwrap());
        assert!(changes.try_recv().is_err());
    }
}
