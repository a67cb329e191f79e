//! Change propagation for the notification bus
//!
//! Every mutation is announced on three independent paths:
//! 1. an in-process `Updated { unread }` event,
//! 2. a best-effort cross-process broadcast of the same count,
//! 3. a payload-free `StorageChanged` fallback telling listeners to re-read.
//!
//! A failing path never blocks the others.

use crate::metrics;
use crate::models::UnreadMessage;
use async_trait::async_trait;
use broadcast_channel::{BroadcastEnvelope, BroadcastError, BroadcastPublisher, BroadcastSubscriber};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Signals delivered to in-process observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    /// Unread count after a mutation
    Updated { unread: usize },
    /// The key changed; re-read it, the event carries no state
    StorageChanged { key: String },
    /// A write failed and the bus is serving an in-memory copy
    StorageUnavailable { reason: String },
}

/// Delivery path to other processes sharing the same state
#[async_trait]
pub trait CrossProcessBroadcast: Send + Sync {
    async fn post(&self, message: &UnreadMessage) -> Result<(), BroadcastError>;
}

#[async_trait]
impl CrossProcessBroadcast for BroadcastPublisher {
    async fn post(&self, message: &UnreadMessage) -> Result<(), BroadcastError> {
        BroadcastPublisher::post(self, message).await.map(|_| ())
    }
}

#[derive(Clone)]
pub struct FanOut {
    events: broadcast::Sender<BusEvent>,
    remote: Option<Arc<dyn CrossProcessBroadcast>>,
}

impl FanOut {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            events,
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn CrossProcessBroadcast>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }

    /// Announce a new unread count on every path.
    pub async fn emit(&self, unread: usize, key: &str) {
        self.send_local(BusEvent::Updated { unread });

        match &self.remote {
            Some(remote) => {
                if let Err(e) = remote.post(&UnreadMessage { unread }).await {
                    debug!(error = %e, unavailable = e.is_unavailable(), "Cross-process broadcast skipped");
                    metrics::record_fanout_failure("broadcast");
                }
            }
            None => trace!("No cross-process broadcast configured"),
        }

        self.send_local(BusEvent::StorageChanged {
            key: key.to_string(),
        });
    }

    pub fn warn_unavailable(&self, reason: String) {
        self.send_local(BusEvent::StorageUnavailable { reason });
    }

    fn send_local(&self, event: BusEvent) {
        if self.events.send(event).is_err() {
            trace!("No in-process listeners");
        }
    }
}

/// Bridge a broadcast subscription into a channel of unread hints for an observer.
pub async fn remote_unread_feed(
    subscriber: &BroadcastSubscriber,
) -> Result<(mpsc::UnboundedReceiver<UnreadMessage>, JoinHandle<()>), BroadcastError> {
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = subscriber
        .subscribe(move |envelope: BroadcastEnvelope<UnreadMessage>| {
            let tx = tx.clone();
            async move {
                tx.send(envelope.payload).map_err(|_| {
                    warn!("Observer dropped, discarding cross-process update");
                    BroadcastError::CallbackFailed("observer closed".to_string())
                })
            }
        })
        .await?;

    Ok((rx, handle))
}
