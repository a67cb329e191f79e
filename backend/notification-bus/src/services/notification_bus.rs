/// Notification bus
///
/// Owns the persisted notification list and is the only code that writes it.
/// Each mutation is a read-modify-write against storage followed by a fan-out:
/// 1. Read the list (missing or malformed means empty)
/// 2. Apply the change and write it back with compare-and-swap, retrying
///    when another writer got there first
/// 3. Announce the new unread count on every delivery path
///
/// If storage refuses the write, the bus keeps serving an in-memory copy and
/// warns observers instead of failing the caller.
use super::fanout::{BusEvent, CrossProcessBroadcast, FanOut};
use super::storage::{Storage, StorageEvent};
use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::metrics;
use crate::models::{Notification, NotificationList, NotificationSnapshot, NotificationType};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

pub struct NotificationBus {
    storage: Arc<dyn Storage>,
    fanout: FanOut,
    config: BusConfig,
    /// Serializes mutations from this instance
    op_lock: Mutex<()>,
    /// In-memory list while storage is refusing writes
    shadow: RwLock<Option<NotificationList>>,
}

impl NotificationBus {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_config(storage, BusConfig::default())
    }

    pub fn with_config(storage: Arc<dyn Storage>, config: BusConfig) -> Self {
        Self {
            storage,
            fanout: FanOut::new(config.event_capacity),
            config,
            op_lock: Mutex::new(()),
            shadow: RwLock::new(None),
        }
    }

    /// Attach the cross-process delivery path
    pub fn with_broadcaster(mut self, remote: Arc<dyn CrossProcessBroadcast>) -> Self {
        self.fanout = self.fanout.with_remote(remote);
        self
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.fanout.subscribe()
    }

    /// Change feed of the backing storage, when it has one
    pub fn storage_changes(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        self.storage.changes()
    }

    pub async fn is_degraded(&self) -> bool {
        self.shadow.read().await.is_some()
    }

    /// Prepend a new unread notification and fan out.
    pub async fn publish(
        &self,
        message: impl Into<String>,
        kind: NotificationType,
    ) -> Result<Notification> {
        let message = message.into();
        let (list, created) = self
            .update("publish", |list| {
                let created = Notification::new(
                    message.clone(),
                    kind,
                    &list.notifications(),
                    Utc::now().timestamp_millis(),
                );
                list.prepend(created.clone());
                created
            })
            .await?;

        info!(id = created.id, kind = %kind, total = list.len(), "Notification published");
        Ok(created)
    }

    pub async fn publish_info(&self, message: impl Into<String>) -> Result<Notification> {
        self.publish(message, NotificationType::default()).await
    }

    /// Mark everything read. Returns how many entries changed.
    pub async fn mark_all_read(&self) -> Result<usize> {
        let (_, changed) = self
            .update("mark_all_read", |list| {
                let mut changed = 0;
                for n in list.iter_mut().filter(|n| !n.read) {
                    n.read = true;
                    changed += 1;
                }
                changed
            })
            .await?;

        debug!(changed, "Marked all notifications read");
        Ok(changed)
    }

    /// Mark one entry read. Unknown ids are not an error; returns whether it was found.
    pub async fn mark_one_read(&self, id: i64) -> Result<bool> {
        let (_, found) = self
            .update("mark_one_read", |list| match list.iter_mut().find(|n| n.id == id) {
                Some(n) => {
                    n.read = true;
                    true
                }
                None => false,
            })
            .await?;

        if !found {
            debug!(id, "mark_one_read: no such notification");
        }
        Ok(found)
    }

    pub async fn clear_all(&self) -> Result<()> {
        let (_, cleared) = self
            .update("clear_all", |list| {
                let cleared = list.len();
                list.clear();
                cleared
            })
            .await?;

        info!(cleared, "Cleared all notifications");
        Ok(())
    }

    /// Unread count plus the most recent entries, never failing.
    pub async fn hydrate(&self) -> NotificationSnapshot {
        let list = self.list().await;
        NotificationSnapshot::from_list(&list, self.config.recent_limit)
    }

    /// Stored list in stored (newest-first) order, never failing.
    ///
    /// Elements that do not decode are left out.
    pub async fn list(&self) -> Vec<Notification> {
        if let Some(shadow) = self.shadow.read().await.as_ref() {
            return shadow.notifications();
        }
        match self.storage.get(&self.config.storage_key).await {
            Ok(raw) => self.decode(raw.as_deref()).notifications(),
            Err(e) => {
                warn!(key = %self.config.storage_key, error = %e, "Storage read failed, treating as empty");
                Vec::new()
            }
        }
    }

    fn decode(&self, raw: Option<&str>) -> NotificationList {
        let Some(raw) = raw else {
            return NotificationList::new();
        };
        match serde_json::from_str::<NotificationList>(raw) {
            Ok(list) => {
                let undecoded = list.undecoded();
                if undecoded > 0 {
                    warn!(
                        key = %self.config.storage_key,
                        undecoded,
                        "Skipping stored notifications with an unexpected shape"
                    );
                    metrics::record_malformed_read();
                }
                list
            }
            Err(e) => {
                warn!(
                    key = %self.config.storage_key,
                    error = %e,
                    "Stored notifications are malformed, treating as empty"
                );
                metrics::record_malformed_read();
                NotificationList::new()
            }
        }
    }

    /// Read-modify-write with compare-and-swap, then fan out.
    ///
    /// A value that cannot be read at all is overwritten with a plain `set`,
    /// since no compare against it can ever succeed.
    async fn update<F, R>(&self, operation: &'static str, mut mutate: F) -> Result<(NotificationList, R)>
    where
        F: FnMut(&mut NotificationList) -> R,
    {
        let _guard = self.op_lock.lock().await;
        let key = self.config.storage_key.as_str();
        let mut attempts: u32 = 0;

        let (list, outcome) = loop {
            let read = self.storage.get(key).await;
            let shadow = self.shadow.read().await.clone();

            let (written, list, outcome) = match read {
                Ok(raw) => {
                    let mut list = shadow.unwrap_or_else(|| self.decode(raw.as_deref()));
                    let outcome = mutate(&mut list);
                    let encoded = serde_json::to_string(&list)?;
                    let written = self
                        .storage
                        .compare_and_swap(key, raw.as_deref(), &encoded)
                        .await;
                    (written, list, outcome)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, operation, "Stored value is unreadable, overwriting it");
                    metrics::record_malformed_read();
                    let mut list = shadow.unwrap_or_default();
                    let outcome = mutate(&mut list);
                    let encoded = serde_json::to_string(&list)?;
                    let written = self.storage.set(key, &encoded).await.map(|()| true);
                    (written, list, outcome)
                }
            };

            match written {
                Ok(true) => {
                    if self.shadow.write().await.take().is_some() {
                        info!(key = %key, "Storage accepted writes again, leaving degraded mode");
                    }
                    break (list, outcome);
                }
                Ok(false) => {
                    attempts += 1;
                    metrics::record_cas_retry();
                    if attempts > self.config.cas_max_retries {
                        warn!(key = %key, attempts, operation, "Giving up after repeated write conflicts");
                        return Err(BusError::Conflict {
                            key: key.to_string(),
                            attempts,
                        });
                    }
                    debug!(key = %key, attempts, operation, "Concurrent write detected, retrying");
                }
                Err(e) => {
                    warn!(
                        key = %key,
                        error = %e,
                        operation,
                        "Storage write failed, keeping notifications in memory"
                    );
                    metrics::record_degraded_write();
                    *self.shadow.write().await = Some(list.clone());
                    self.fanout.warn_unavailable(e.to_string());
                    break (list, outcome);
                }
            }
        };

        let unread = list.unread();
        metrics::record_operation(operation);
        metrics::set_unread(unread);
        self.fanout.emit(unread, key).await;

        Ok((list, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::services::storage::{MemoryStorage, StorageResult};
    use async_trait::async_trait;
    use std::io;

    /// Holds a value that `get` cannot return, like non-UTF-8 bytes in Redis
    struct UnreadableStorage {
        inner: MemoryStorage,
    }

    #[async_trait]
    impl Storage for UnreadableStorage {
        async fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "stream did not contain valid UTF-8",
            )))
        }

        async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key).await
        }

        async fn compare_and_swap(
            &self,
            key: &str,
            expected: Option<&str>,
            new: &str,
        ) -> StorageResult<bool> {
            self.inner.compare_and_swap(key, expected, new).await
        }
    }

    fn bus() -> (NotificationBus, MemoryStorage) {
        let storage = MemoryStorage::new();
        (NotificationBus::new(Arc::new(storage.clone())), storage)
    }

    #[tokio::test]
    async fn test_publish_prepends() {
        let (bus, _) = bus();
        bus.publish("first", NotificationType::Info).await.unwrap();
        bus.publish("second", NotificationType::Success).await.unwrap();

        let list = bus.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].message, "second");
        assert_eq!(list[1].message, "first");
        assert!(list[0].id > list[1].id);
    }

    #[tokio::test]
    async fn test_publish_info_defaults_type() {
        let (bus, _) = bus();
        let n = bus.publish_info("Profile updated").await.unwrap();
        assert_eq!(n.kind, NotificationType::Info);
        assert!(!n.read);
    }

    #[tokio::test]
    async fn test_mark_one_read_reports_found() {
        let (bus, _) = bus();
        let n = bus.publish_info("hello").await.unwrap();

        assert!(bus.mark_one_read(n.id).await.unwrap());
        assert!(!bus.mark_one_read(n.id + 1000).await.unwrap());
        assert_eq!(bus.hydrate().await.unread, 0);
    }

    #[tokio::test]
    async fn test_mark_all_read_counts_changes() {
        let (bus, _) = bus();
        for i in 0..3 {
            bus.publish_info(format!("n{}", i)).await.unwrap();
        }
        assert_eq!(bus.mark_all_read().await.unwrap(), 3);
        assert_eq!(bus.mark_all_read().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_value_is_overwritten() {
        let (bus, storage) = bus();
        storage.set("notifications", "{oops").await.unwrap();

        bus.publish_info("fresh").await.unwrap();

        let raw = storage.get("notifications").await.unwrap().unwrap();
        let parsed: Vec<Notification> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[tokio::test]
    async fn test_custom_storage_key() {
        let storage = MemoryStorage::new();
        let config = BusConfig {
            storage_key: "alerts".to_string(),
            ..BusConfig::default()
        };
        let bus = NotificationBus::with_config(Arc::new(storage.clone()), config);

        bus.publish_info("x").await.unwrap();
        assert!(storage.get("alerts").await.unwrap().is_some());
        assert!(storage.get("notifications").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_keeps_entries_with_unknown_shape() {
        let (bus, storage) = bus();
        let seeded = r#"[
            {"id":3,"message":"c","type":"info","read":false,"createdAt":"2024-03-01T12:00:00Z"},
            {"id":2,"message":"b","type":"danger","read":false,"createdAt":"2024-03-01T11:00:00Z"},
            {"id":1,"message":"a","type":"success","read":false,"createdAt":"2024-03-01T10:00:00Z"}
        ]"#;
        storage.set("notifications", seeded).await.unwrap();
        assert_eq!(bus.hydrate().await.unread, 2);

        bus.publish("new", NotificationType::Info).await.unwrap();

        let raw = storage.get("notifications").await.unwrap().unwrap();
        let stored: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[0]["message"], "new");
        assert_eq!(stored[2]["type"], "danger");
        assert_eq!(bus.hydrate().await.unread, 3);
    }

    #[tokio::test]
    async fn test_unreadable_value_is_overwritten() {
        let inner = MemoryStorage::new();
        inner.set("notifications", "\u{fffd}binary").await.unwrap();
        let bus = NotificationBus::new(Arc::new(UnreadableStorage {
            inner: inner.clone(),
        }));

        let created = bus.publish_info("after corruption").await.unwrap();

        assert!(!bus.is_degraded().await);
        let raw = inner.get("notifications").await.unwrap().unwrap();
        let parsed: Vec<Notification> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, created.id);
    }
}
