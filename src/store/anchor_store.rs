//! Persisted timer anchor with in-process change notification.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::kv::{KeyValueStore, TIMER_ANCHOR_KEY, read_json, write_json};
use crate::domain::{EventId, TimerAnchor};
use crate::error::SyncError;

/// On-disk shape of the anchor record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAnchor {
    event_id: EventId,
    anchor: TimerAnchor,
}

#[derive(Debug)]
struct Inner {
    kv: Arc<dyn KeyValueStore>,
    event_id: EventId,
    current: watch::Sender<Option<TimerAnchor>>,
}

/// Typed `get`/`set`/`subscribe` view over the timer-anchor record.
///
/// Every surface of the profile holds its own `AnchorStore` over the same
/// key-value store. Local writes notify local subscribers immediately;
/// writes from other surfaces become visible on [`AnchorStore::reload`],
/// which a surface calls when a signal arrives.
///
/// A missing, corrupt, or foreign (other event) record reads as `None`,
/// meaning "timer not started".
#[derive(Debug, Clone)]
pub struct AnchorStore {
    inner: Arc<Inner>,
}

impl AnchorStore {
    /// Opens the anchor record for `event_id`, loading whatever is stored.
    #[must_use]
    pub fn open(kv: Arc<dyn KeyValueStore>, event_id: EventId) -> Self {
        let initial = load(kv.as_ref(), event_id);
        let (current, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                kv,
                event_id,
                current,
            }),
        }
    }

    /// Event this store belongs to.
    #[must_use]
    pub fn event_id(&self) -> EventId {
        self.inner.event_id
    }

    /// Last known anchor, `None` if the timer has not started.
    #[must_use]
    pub fn get(&self) -> Option<TimerAnchor> {
        *self.inner.current.borrow()
    }

    /// Persists a new anchor and notifies subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the record cannot be written; the
    /// in-memory value is left unchanged in that case.
    pub fn set(&self, anchor: TimerAnchor) -> Result<(), SyncError> {
        let record = StoredAnchor {
            event_id: self.inner.event_id,
            anchor,
        };
        write_json(self.inner.kv.as_ref(), TIMER_ANCHOR_KEY, &record)?;
        self.inner.current.send_replace(Some(anchor));
        Ok(())
    }

    /// Deletes the anchor record if it belongs to this event. A record
    /// written by another event is left in place.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the record cannot be removed.
    pub fn clear(&self) -> Result<(), SyncError> {
        let event_id = self.inner.event_id;
        let stored: Option<StoredAnchor> = read_json(self.inner.kv.as_ref(), TIMER_ANCHOR_KEY);
        let result = match stored {
            Some(record) if record.event_id != event_id => {
                tracing::debug!(%event_id, stored = %record.event_id, "keeping anchor of another event");
                Ok(())
            }
            Some(_) => self.inner.kv.remove(TIMER_ANCHOR_KEY),
            None => Ok(()),
        };
        self.inner.current.send_replace(None);
        result
    }

    /// Re-reads the persisted record. Returns `true` if it differed from
    /// the in-memory value (subscribers are notified only then).
    pub fn reload(&self) -> bool {
        let fresh = load(self.inner.kv.as_ref(), self.inner.event_id);
        self.inner.current.send_if_modified(|current| {
            if *current == fresh {
                false
            } else {
                *current = fresh;
                true
            }
        })
    }

    /// Receiver notified on every change observed by this store.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<TimerAnchor>> {
        self.inner.current.subscribe()
    }
}

fn load(kv: &dyn KeyValueStore, event_id: EventId) -> Option<TimerAnchor> {
    let record: StoredAnchor = read_json(kv, TIMER_ANCHOR_KEY)?;
    if record.event_id != event_id {
        tracing::debug!(
            %event_id,
            stored = %record.event_id,
            "ignoring anchor of another event"
        );
        return None;
    }
    Some(record.anchor)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::store::kv::MemoryStore;

    fn shared_kv() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn missing_record_means_not_started() {
        let store = AnchorStore::open(shared_kv(), EventId::new());
        assert!(store.get().is_none());
    }

    #[test]
    fn set_is_visible_to_other_surface_after_reload() {
        let kv = shared_kv();
        let id = EventId::new();
        let control = AnchorStore::open(Arc::clone(&kv), id);
        let display = AnchorStore::open(Arc::clone(&kv), id);

        let anchor = TimerAnchor::running(600.0, 1, 5_000);
        assert!(control.set(anchor).is_ok());
        assert!(display.get().is_none());
        assert!(display.reload());
        assert_eq!(display.get(), Some(anchor));
        assert!(!display.reload());
    }

    #[test]
    fn corrupt_record_falls_back_to_not_started() {
        let kv = shared_kv();
        let _ = kv.set(TIMER_ANCHOR_KEY, "{\"eventId\": 42");
        let store = AnchorStore::open(kv, EventId::new());
        assert!(store.get().is_none());
    }

    #[test]
    fn foreign_event_record_is_ignored() {
        let kv = shared_kv();
        let other = AnchorStore::open(Arc::clone(&kv), EventId::new());
        let _ = other.set(TimerAnchor::paused(30.0, 0, 0));
        let mine = AnchorStore::open(kv, EventId::new());
        assert!(mine.get().is_none());
    }

    #[test]
    fn clear_keeps_anchor_of_another_event() {
        let kv = shared_kv();
        let stale = AnchorStore::open(Arc::clone(&kv), EventId::new());
        let current = AnchorStore::open(Arc::clone(&kv), EventId::new());
        let anchor = TimerAnchor::running(300.0, 2, 1_000);
        assert!(current.set(anchor).is_ok());

        assert!(stale.clear().is_ok());
        assert!(stale.get().is_none());
        assert!(!current.reload());
        assert_eq!(current.get(), Some(anchor));
        assert!(matches!(kv.get(TIMER_ANCHOR_KEY), Ok(Some(_))));

        assert!(current.clear().is_ok());
        assert_eq!(kv.get(TIMER_ANCHOR_KEY).ok(), Some(None));
    }

    #[tokio::test]
    async fn subscribers_see_local_writes_and_clear() {
        let store = AnchorStore::open(shared_kv(), EventId::new());
        let mut rx = store.subscribe();
        let anchor = TimerAnchor::paused(90.0, 0, 0);
        let _ = store.set(anchor);
        assert!(rx.changed().await.is_ok());
        assert_eq!(*rx.borrow_and_update(), Some(anchor));
        let _ = store.clear();
        assert!(rx.changed().await.is_ok());
        assert!(rx.borrow().is_none());
    }
}
