use super::notification_bus::NotificationBus;
use super::settings_store::SettingsStore;
use crate::error::Result;
use crate::models::{Notification, NotificationType};
use std::sync::Arc;
use tracing::debug;

/// Publishes on behalf of a feature, honoring `enableNotifications`.
///
/// The setting is re-read on every call so a toggle in another process takes
/// effect without restarting.
#[derive(Clone)]
pub struct Notifier {
    bus: Arc<NotificationBus>,
    settings: SettingsStore,
}

impl Notifier {
    pub fn new(bus: Arc<NotificationBus>) -> Self {
        let settings = SettingsStore::new(bus.storage(), bus.config().settings_key.clone());
        Self { bus, settings }
    }

    pub fn with_settings(bus: Arc<NotificationBus>, settings: SettingsStore) -> Self {
        Self { bus, settings }
    }

    /// Returns `None` when notifications are switched off.
    pub async fn notify(
        &self,
        message: impl Into<String>,
        kind: NotificationType,
    ) -> Result<Option<Notification>> {
        if !self.settings.load().await.enable_notifications {
            debug!("Notifications disabled, dropping message");
            return Ok(None);
        }
        self.bus.publish(message, kind).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SettingKey;
    use crate::services::storage::MemoryStorage;

    #[tokio::test]
    async fn test_notify_respects_setting() {
        let bus = Arc::new(NotificationBus::new(Arc::new(MemoryStorage::new())));
        let notifier = Notifier::new(bus.clone());

        assert!(notifier
            .notify("Message sent", NotificationType::Success)
            .await
            .unwrap()
            .is_some());

        SettingsStore::new(bus.storage(), "settings")
            .toggle(SettingKey::EnableNotifications)
            .await
            .unwrap();

        assert!(notifier
            .notify("Message sent", NotificationType::Success)
            .await
            .unwrap()
            .is_none());
        assert_eq!(bus.list().await.len(), 1);
    }
}
