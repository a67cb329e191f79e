//! Named broadcast channels over Redis Pub/Sub
//!
//! Lets several processes that share one origin (same user, same data store)
//! nudge each other when shared state changes. Delivery is best-effort: a
//! missing or unreachable Redis means the message is simply not seen, so
//! callers must always have another way to notice the change.
//!
//! # Architecture
//!
//! ```text
//! Process A:
//!   1. Mutate shared state (e.g. the "notifications" key)
//!   2. PUBLISH lynkr_notifications {"origin": "a", "payload": {"unread": 3}, ...}
//!      ↓
//! Redis Pub/Sub (fan-out to every subscriber of the channel)
//!      ↓
//! Process B, C:
//!   3. Receive envelope, skip it if it came from themselves
//!   4. Re-read the shared state (the payload is only a hint)
//! ```
//!
//! # Example: Publisher
//!
//! ```no_run
//! use broadcast_channel::BroadcastPublisher;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), broadcast_channel::BroadcastError> {
//!     let publisher = BroadcastPublisher::new(
//!         "redis://localhost:6379",
//!         "lynkr_notifications",
//!         "tab-1".to_string(),
//!     ).await?;
//!
//!     publisher.post(&json!({ "unread": 3 })).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example: Subscriber
//!
//! ```no_run
//! use broadcast_channel::{BroadcastEnvelope, BroadcastSubscriber};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), broadcast_channel::BroadcastError> {
//!     let subscriber = BroadcastSubscriber::new("redis://localhost:6379", "lynkr_notifications")
//!         .await?
//!         .ignoring_origin("tab-2");
//!
//!     let handle = subscriber
//!         .subscribe(|envelope: BroadcastEnvelope<serde_json::Value>| async move {
//!             println!("{} says {}", envelope.origin, envelope.payload);
//!             Ok(())
//!         })
//!         .await?;
//!
//!     let _ = handle.await;
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

mod error;
mod stats;

pub use error::BroadcastError;
pub use stats::{BroadcastStats, StatsCollector};

pub type Result<T> = std::result::Result<T, BroadcastError>;

/// Longest channel name accepted
pub const MAX_CHANNEL_LEN: usize = 128;

/// One message on a channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastEnvelope<T> {
    pub message_id: String,
    pub origin: String,
    pub sent_at: DateTime<Utc>,
    pub payload: T,
}

impl<T> BroadcastEnvelope<T> {
    pub fn new(origin: String, payload: T) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            origin,
            sent_at: Utc::now(),
            payload,
        }
    }

    /// Milliseconds between posting and `now`
    pub fn latency_ms(&self, now: DateTime<Utc>) -> f64 {
        (now - self.sent_at).num_microseconds().unwrap_or(0) as f64 / 1000.0
    }
}

/// Reject names Redis would accept but that are easy to mistype across processes.
pub fn validate_channel_name(channel: &str) -> Result<()> {
    if channel.is_empty() {
        return Err(BroadcastError::InvalidChannel("empty".to_string()));
    }
    if channel.len() > MAX_CHANNEL_LEN {
        return Err(BroadcastError::InvalidChannel(format!(
            "{} bytes exceeds {}",
            channel.len(),
            MAX_CHANNEL_LEN
        )));
    }
    if channel.chars().any(|c| c.is_whitespace() || c == '*' || c == '?') {
        return Err(BroadcastError::InvalidChannel(channel.to_string()));
    }
    Ok(())
}

/// Posts envelopes to one named channel
#[derive(Clone)]
pub struct BroadcastPublisher {
    client: ConnectionManager,
    channel: String,
    origin: String,
    stats: StatsCollector,
}

impl BroadcastPublisher {
    /// Connect a publisher
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `channel` - Channel name shared by every participant
    /// * `origin` - Identifier of this process, echoed in every envelope
    pub async fn new(redis_url: &str, channel: &str, origin: String) -> Result<Self> {
        validate_channel_name(channel)?;
        let client = Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            client: connection,
            channel: channel.to_string(),
            origin,
            stats: StatsCollector::new(),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn stats(&self) -> BroadcastStats {
        self.stats.snapshot()
    }

    /// Post a payload
    ///
    /// Returns the number of subscribers Redis handed the message to.
    pub async fn post<T: Serialize>(&self, payload: &T) -> Result<usize> {
        let envelope = BroadcastEnvelope::new(self.origin.clone(), payload);
        let encoded = serde_json::to_string(&envelope)?;

        let mut conn = self.client.clone();
        let receivers: usize = match conn.publish(&self.channel, encoded).await {
            Ok(n) => n,
            Err(e) => {
                self.stats.record_error();
                return Err(e.into());
            }
        };

        self.stats.record_post();
        debug!(
            message_id = %envelope.message_id,
            channel = %self.channel,
            receivers,
            "Broadcast posted"
        );

        Ok(receivers)
    }
}

/// Listens on one named channel
pub struct BroadcastSubscriber {
    client: Client,
    channel: String,
    ignore_origin: Option<String>,
    stats: StatsCollector,
}

impl BroadcastSubscriber {
    pub async fn new(redis_url: &str, channel: &str) -> Result<Self> {
        validate_channel_name(channel)?;
        let client = Client::open(redis_url)?;

        Ok(Self {
            client,
            channel: channel.to_string(),
            ignore_origin: None,
            stats: StatsCollector::new(),
        })
    }

    /// Drop envelopes posted by `origin`, the way a browser channel never
    /// echoes a message back to the object that posted it.
    pub fn ignoring_origin(mut self, origin: impl Into<String>) -> Self {
        self.ignore_origin = Some(origin.into());
        self
    }

    pub fn stats(&self) -> BroadcastStats {
        self.stats.snapshot()
    }

    /// Subscribe with a callback
    ///
    /// Returns the JoinHandle of the background listener. Envelopes that fail
    /// to decode are logged and skipped.
    pub async fn subscribe<T, F, Fut>(&self, callback: F) -> Result<JoinHandle<()>>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(BroadcastEnvelope<T>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;

        info!(channel = %self.channel, "Subscribed to broadcast channel");

        let callback = Arc::new(callback);
        let ignore_origin = self.ignore_origin.clone();
        let stats = self.stats.clone();
        let channel = self.channel.clone();

        let handle = tokio::spawn(async move {
            let mut stream = pubsub.on_message();

            while let Some(msg) = stream.next().await {
                let payload = match msg.get_payload::<String>() {
                    Ok(p) => p,
                    Err(e) => {
                        stats.record_error();
                        error!(error = ?e, "Failed to read broadcast payload");
                        continue;
                    }
                };

                let envelope: BroadcastEnvelope<T> = match serde_json::from_str(&payload) {
                    Ok(env) => env,
                    Err(e) => {
                        stats.record_error();
                        warn!(error = %e, payload = %payload, "Dropping malformed broadcast");
                        continue;
                    }
                };

                if ignore_origin.as_deref() == Some(envelope.origin.as_str()) {
                    stats.record_skipped_own();
                    continue;
                }

                stats.record_delivery(envelope.latency_ms(Utc::now()));
                let message_id = envelope.message_id.clone();
                if let Err(e) = callback(envelope).await {
                    stats.record_error();
                    error!(error = ?e, message_id = %message_id, "Broadcast callback failed");
                }
            }

            warn!(channel = %channel, "Broadcast subscription ended");
        });

        Ok(handle)
    }

    /// Stop a listener started by [`subscribe`](Self::subscribe)
    pub fn unsubscribe(&self, handle: JoinHandle<()>) {
        handle.abort();
    }
}
