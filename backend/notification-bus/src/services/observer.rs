//! Observers that keep a local view of the notification list in sync
//!
//! An observer hydrates once when spawned, then re-hydrates whenever any of
//! the delivery paths fires: the bus's own events, the storage change feed,
//! or the cross-process feed. Payloads are treated as hints only; the view is
//! always rebuilt from storage.

use super::fanout::BusEvent;
use super::notification_bus::NotificationBus;
use super::storage::StorageEvent;
use crate::models::{Notification, NotificationSnapshot, UnreadMessage};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Tracks the badge count and reports when it changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreadBadge {
    count: usize,
}

impl UnreadBadge {
    pub fn new(count: usize) -> Self {
        Self { count }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Store `unread`; true when it differs from the previous value
    pub fn apply(&mut self, unread: usize) -> bool {
        let bumped = self.count != unread;
        self.count = unread;
        bumped
    }
}

/// What a navbar badge or notifications page renders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationView {
    pub unread: usize,
    pub recent: Vec<Notification>,
    pub items: Vec<Notification>,
    /// The unread count changed on the last refresh
    pub bumped: bool,
    /// Storage refused the last write; the view reflects memory only
    pub degraded: bool,
}

pub struct NotificationObserver {
    view: watch::Receiver<NotificationView>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl NotificationObserver {
    /// Hydrate and start listening.
    ///
    /// `remote` is the cross-process feed, if one is available
    /// (see [`remote_unread_feed`](super::fanout::remote_unread_feed)).
    pub async fn spawn(
        bus: Arc<NotificationBus>,
        remote: Option<mpsc::UnboundedReceiver<UnreadMessage>>,
    ) -> Self {
        // subscribe before the first read so nothing slips between them
        let events = bus.subscribe();
        let storage_changes = bus.storage_changes();

        let mut badge = UnreadBadge::default();
        let initial = build_view(&bus, &mut badge).await;
        let (view_tx, view_rx) = watch::channel(initial);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let listener = Listener {
            bus,
            badge,
            view_tx,
            events,
            storage_changes,
            remote,
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(listener.run());

        Self {
            view: view_rx,
            shutdown: shutdown_tx,
            handle,
        }
    }

    /// Latest view
    pub fn view(&self) -> NotificationView {
        self.view.borrow().clone()
    }

    /// Watch handle for callers that want to await changes
    pub fn watch(&self) -> watch::Receiver<NotificationView> {
        self.view.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Observer task ended abnormally");
        }
    }
}

struct Listener {
    bus: Arc<NotificationBus>,
    badge: UnreadBadge,
    view_tx: watch::Sender<NotificationView>,
    events: broadcast::Receiver<BusEvent>,
    storage_changes: Option<broadcast::Receiver<StorageEvent>>,
    remote: Option<mpsc::UnboundedReceiver<UnreadMessage>>,
    shutdown: watch::Receiver<bool>,
}

impl Listener {
    async fn run(mut self) {
        let storage_key = self.bus.config().storage_key.clone();

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,

                event = self.events.recv() => match event {
                    Ok(BusEvent::Updated { unread }) => {
                        trace!(unread, "Local update event");
                        self.refresh().await;
                    }
                    Ok(BusEvent::StorageChanged { .. }) => self.refresh().await,
                    Ok(BusEvent::StorageUnavailable { reason }) => {
                        warn!(reason = %reason, "Notifications are not being persisted");
                        self.refresh().await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Observer lagged behind bus events");
                        self.refresh().await;
                    }
                    Err(RecvError::Closed) => break,
                },

                change = recv_change(&mut self.storage_changes) => match change {
                    Ok(StorageEvent { key }) if key == storage_key => self.refresh().await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => self.refresh().await,
                    Err(RecvError::Closed) => self.storage_changes = None,
                },

                hint = recv_remote(&mut self.remote) => match hint {
                    Some(UnreadMessage { unread }) => {
                        trace!(unread, "Cross-process update");
                        self.refresh().await;
                    }
                    None => self.remote = None,
                },
            }
        }

        debug!("Observer stopped");
    }

    async fn refresh(&mut self) {
        let view = build_view(&self.bus, &mut self.badge).await;
        self.view_tx.send_replace(view);
    }
}

async fn build_view(bus: &NotificationBus, badge: &mut UnreadBadge) -> NotificationView {
    let items = bus.list().await;
    let NotificationSnapshot { unread, recent } =
        NotificationSnapshot::from_list(&items, bus.config().recent_limit);
    let bumped = badge.apply(unread);

    NotificationView {
        unread,
        recent,
        items,
        bumped,
        degraded: bus.is_degraded().await,
    }
}

async fn recv_change(
    rx: &mut Option<broadcast::Receiver<StorageEvent>>,
) -> Result<StorageEvent, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_remote(rx: &mut Option<mpsc::UnboundedReceiver<UnreadMessage>>) -> Option<UnreadMessage> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_bumps_on_change() {
        let mut badge = UnreadBadge::new(2);
        assert!(!badge.apply(2));
        assert!(badge.apply(3));
        assert_eq!(badge.count(), 3);
        assert!(badge.apply(0));
    }
}
