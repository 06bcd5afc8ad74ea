//! Subscriptions deliver each periodic collection's [`ViewSnapshot`] to
//! interested consumers over a bounded channel. A slow subscriber does not
//! block collection: once its buffer is full, further snapshots for it are
//! dropped and counted rather than queued indefinitely.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Mutex, RwLock};

use crate::view_engine::ViewSnapshot;

/// A subscriber's default channel capacity if none is given.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Opaque handle identifying a live subscription; returned by
/// [`SubscriptionTable::subscribe`] and consumed by
/// [`SubscriptionTable::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Errors returned by [`SubscriptionTable::subscribe`] /
/// [`SubscriptionTable::unsubscribe`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    /// No such subscription id is live.
    #[error("subscription {0:?} is not active")]
    UnknownSubscription(SubscriptionId),
}

struct Subscriber {
    id: SubscriptionId,
    view_name: String,
    sender: SyncSender<ViewSnapshot>,
    dropped: AtomicU64,
}

/// All live subscriptions, keyed by the view they watch.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    next_id: AtomicU64,
    by_view: RwLock<HashMap<String, Vec<std::sync::Arc<Subscriber>>>>,
    by_id: Mutex<HashMap<u64, std::sync::Arc<Subscriber>>>,
}

impl SubscriptionTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `view_name`'s periodic snapshots. Returns a receiver
    /// the caller polls (or iterates) for incoming [`ViewSnapshot`]s.
    pub(crate) fn subscribe(
        &self,
        view_name: &str,
        buffer: usize,
    ) -> (SubscriptionId, Receiver<ViewSnapshot>) {
        let (sender, receiver) = sync_channel(buffer.max(1));
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber = std::sync::Arc::new(Subscriber {
            id,
            view_name: view_name.to_owned(),
            sender,
            dropped: AtomicU64::new(0),
        });

        self.by_view
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(view_name.to_owned())
            .or_default()
            .push(subscriber.clone());
        self.by_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.0, subscriber);

        (id, receiver)
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> Result<(), SubscribeError> {
        let subscriber = self
            .by_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id.0)
            .ok_or(SubscribeError::UnknownSubscription(id))?;

        if let Some(subs) = self
            .by_view
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&subscriber.view_name)
        {
            subs.retain(|s| s.id != id);
        }
        Ok(())
    }

    /// Deliver `snapshot` to every subscriber of its view. Subscribers
    /// whose buffer is full have the snapshot dropped and their drop
    /// counter incremented instead of blocking the caller.
    pub(crate) fn dispatch(&self, snapshot: &ViewSnapshot) {
        let by_view = self.by_view.read().unwrap_or_else(|e| e.into_inner());
        let Some(subs) = by_view.get(&snapshot.view_name) else {
            return;
        };
        for sub in subs {
            match sub.sender.try_send(snapshot.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let dropped = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        view = %snapshot.view_name,
                        subscription = sub.id.0,
                        dropped,
                        "subscriber buffer full, dropping snapshot"
                    );
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }

    /// The number of snapshots dropped for `id` due to a full buffer.
    pub(crate) fn dropped_count(&self, id: SubscriptionId) -> Option<u64> {
        self.by_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id.0)
            .map(|s| s.dropped.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(view_name: &str) -> ViewSnapshot {
        ViewSnapshot {
            view_name: view_name.to_owned(),
            rows: Vec::new(),
        }
    }

    #[test]
    fn dispatch_delivers_to_subscribers_of_the_right_view() {
        let table = SubscriptionTable::new();
        let (_id, rx) = table.subscribe("test/view/a", 4);
        table.dispatch(&snapshot("test/view/a"));
        table.dispatch(&snapshot("test/view/b"));
        assert_eq!(rx.try_recv().unwrap().view_name, "test/view/a");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_buffer_drops_and_counts_instead_of_blocking() {
        let table = SubscriptionTable::new();
        let (id, _rx) = table.subscribe("test/view/full", 1);
        table.dispatch(&snapshot("test/view/full"));
        table.dispatch(&snapshot("test/view/full"));
        table.dispatch(&snapshot("test/view/full"));
        assert_eq!(table.dropped_count(id), Some(2));
    }

    #[test]
    fn unsubscribe_stops_future_dispatches() {
        let table = SubscriptionTable::new();
        let (id, rx) = table.subscribe("test/view/unsub", 4);
        table.unsubscribe(id).unwrap();
        table.dispatch(&snapshot("test/view/unsub"));
        assert!(rx.try_recv().is_err());
    }
}
