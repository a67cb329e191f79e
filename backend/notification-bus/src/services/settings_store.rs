use super::storage::{load_json_or_default, save_json, Storage};
use crate::error::Result;
use crate::models::{MessagingSettings, SettingKey};
use std::sync::Arc;
use tracing::info;

/// Persisted messaging preferences
#[derive(Clone)]
pub struct SettingsStore {
    storage: Arc<dyn Storage>,
    key: String,
}

impl SettingsStore {
    pub fn new(storage: Arc<dyn Storage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Stored settings, or defaults when missing or unreadable
    pub async fn load(&self) -> MessagingSettings {
        load_json_or_default(self.storage.as_ref(), &self.key).await
    }

    pub async fn save(&self, settings: &MessagingSettings) -> Result<()> {
        save_json(self.storage.as_ref(), &self.key, settings).await
    }

    /// Flip one switch, persist, and return the updated settings
    pub async fn toggle(&self, key: SettingKey) -> Result<MessagingSettings> {
        let mut settings = self.load().await;
        let value = settings.toggle(key);
        self.save(&settings).await?;

        info!(setting = %key, value, "Setting toggled");
        Ok(settings)
    }
}
