use crate::error::{BusError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_STORAGE_KEY: &str = "notifications";
pub const DEFAULT_SETTINGS_KEY: &str = "settings";
pub const DEFAULT_CHANNEL: &str = "lynkr_notifications";
pub const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub broadcast: BroadcastConfig,
    pub bus: BusConfig,
}

/// Which key/value backend holds the persisted state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
    Redis,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            "redis" => Ok(StorageBackend::Redis),
            other => Err(format!(
                "unknown storage backend '{}' (expected memory, file or redis)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the file backend
    pub data_dir: PathBuf,
    pub redis_url: String,
    /// Namespace prepended to every Redis key
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    pub enabled: bool,
    pub redis_url: String,
    pub channel: String,
    /// Identifies this process in posted envelopes
    pub origin: String,
}

/// Tunables for a single bus instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub storage_key: String,
    pub settings_key: String,
    pub recent_limit: usize,
    pub cas_max_retries: u32,
    pub event_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            settings_key: DEFAULT_SETTINGS_KEY.to_string(),
            recent_limit: DEFAULT_RECENT_LIMIT,
            cas_max_retries: 8,
            event_capacity: 64,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let backend: StorageBackend = env_or("NOTIFICATION_BUS_STORAGE", StorageBackend::File)?;
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let bus = BusConfig {
            storage_key: env::var("NOTIFICATION_BUS_STORAGE_KEY")
                .unwrap_or_else(|_| DEFAULT_STORAGE_KEY.to_string()),
            settings_key: env::var("NOTIFICATION_BUS_SETTINGS_KEY")
                .unwrap_or_else(|_| DEFAULT_SETTINGS_KEY.to_string()),
            recent_limit: env_or("NOTIFICATION_BUS_RECENT_LIMIT", DEFAULT_RECENT_LIMIT)?,
            cas_max_retries: env_or("NOTIFICATION_BUS_CAS_RETRIES", 8)?,
            event_capacity: env_or("NOTIFICATION_BUS_EVENT_CAPACITY", 64)?,
        };

        if bus.event_capacity == 0 {
            return Err(BusError::Config(
                "NOTIFICATION_BUS_EVENT_CAPACITY must be greater than zero".to_string(),
            ));
        }

        Ok(Config {
            storage: StorageConfig {
                backend,
                data_dir: env::var("NOTIFICATION_BUS_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data")),
                redis_url: redis_url.clone(),
                key_prefix: env::var("NOTIFICATION_BUS_KEY_PREFIX")
                    .unwrap_or_else(|_| "lynkr".to_string()),
            },
            broadcast: BroadcastConfig {
                enabled: env_or("NOTIFICATION_BUS_BROADCAST", backend == StorageBackend::Redis)?,
                redis_url,
                channel: env::var("NOTIFICATION_BUS_CHANNEL")
                    .unwrap_or_else(|_| DEFAULT_CHANNEL.to_string()),
                origin: env::var("NOTIFICATION_BUS_ORIGIN")
                    .unwrap_or_else(|_| format!("notification-bus-{}", std::process::id())),
            },
            bus,
        })
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| BusError::Config(format!("{} is invalid: {}", name, e))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_parsing() {
        assert_eq!("memory".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert_eq!(" Redis ".parse::<StorageBackend>(), Ok(StorageBackend::Redis));
        assert!("sqlite".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_bus_config_defaults() {
        let cfg = BusConfig::default();
        assert_eq!(cfg.storage_key, "notifications");
        assert_eq!(cfg.settings_key, "settings");
        assert_eq!(cfg.recent_limit, 10);
        assert_eq!(cfg.cas_max_retries, 8);
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        env::set_var("NOTIFICATION_BUS_TEST_LIMIT", "ten");
        let parsed: Result<usize> = env_or("NOTIFICATION_BUS_TEST_LIMIT", 10);
        assert!(matches!(parsed, Err(BusError::Config(_))));
        env::remove_var("NOTIFICATION_BUS_TEST_LIMIT");
    }

    #[test]
    fn test_env_or_falls_back_when_unset() {
        let parsed: Result<u32> = env_or("NOTIFICATION_BUS_TEST_UNSET_VAR", 3);
        assert_eq!(parsed.ok(), Some(3));
    }
}
