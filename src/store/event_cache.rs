//! Surface-local cache of the event record and its room overlay.
//!
//! The cache is the only state a surface renders from. Three writers feed
//! it: the reconciliation poll (canonical state), the room manager
//! (optimistic state, confirmations, rollbacks) and the control surface's
//! own timer operations. Every change bumps a revision so a writer can
//! tell whether somebody else replaced its state in the meantime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::kv::{KeyValueStore, ROOM_STATE_KEY, read_json, write_json};
use crate::domain::{Event, EventId, RoomState, TimerState};

/// Point-in-time view of the cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheState {
    /// Incremented on every change.
    pub revision: u64,
    /// Last event record applied, if any.
    pub event: Option<Event>,
    /// Room as the surface should render it (canonical or optimistic).
    pub room: RoomState,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRoom {
    event_id: EventId,
    room: RoomState,
}

#[derive(Debug)]
struct Inner {
    kv: Arc<dyn KeyValueStore>,
    event_id: EventId,
    closed: AtomicBool,
    state: watch::Sender<CacheState>,
}

/// Injected `get`/`set`/`subscribe` store for one event on one surface.
#[derive(Debug, Clone)]
pub struct EventCache {
    inner: Arc<Inner>,
}

impl EventCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, event_id: EventId) -> Self {
        let (state, _) = watch::channel(CacheState::default());
        Self {
            inner: Arc::new(Inner {
                kv,
                event_id,
                closed: AtomicBool::new(false),
                state,
            }),
        }
    }

    /// Creates a cache seeded from the persisted room snapshot, so a
    /// reloaded surface can render before its first poll. A corrupt or
    /// foreign snapshot yields an empty room.
    #[must_use]
    pub fn restore(kv: Arc<dyn KeyValueStore>, event_id: EventId) -> Self {
        let room = read_json::<StoredRoom>(kv.as_ref(), ROOM_STATE_KEY)
            .filter(|stored| stored.event_id == event_id)
            .map(|stored| stored.room)
            .filter(|room| match room.validate() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(%event_id, error = %e, "discarding invalid room snapshot");
                    false
                }
            })
            .unwrap_or_default();
        let cache = Self::new(kv, event_id);
        cache.inner.state.send_modify(|s| s.room = room);
        cache
    }

    /// Event this cache belongs to.
    #[must_use]
    pub fn event_id(&self) -> EventId {
        self.inner.event_id
    }

    /// Returns `true` once [`EventCache::clear`] has run. A closed cache
    /// ignores every later write.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Clone of the current state.
    #[must_use]
    pub fn snapshot(&self) -> CacheState {
        self.inner.state.borrow().clone()
    }

    /// Current revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.state.borrow().revision
    }

    /// Current room.
    #[must_use]
    pub fn room(&self) -> RoomState {
        self.inner.state.borrow().room.clone()
    }

    /// Current event record.
    #[must_use]
    pub fn event(&self) -> Option<Event> {
        self.inner.state.borrow().event.clone()
    }

    /// Current settings, if an event has been applied.
    #[must_use]
    pub fn settings(&self) -> Option<TimerState> {
        self.inner.state.borrow().event.as_ref().map(|e| e.settings.clone())
    }

    /// Receiver notified on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CacheState> {
        self.inner.state.subscribe()
    }

    /// Replaces the whole record (room included). Returns the new revision.
    pub fn set_event(&self, event: Event) -> u64 {
        if self.is_closed() {
            return self.revision();
        }
        let room = event.room.clone();
        let revision = self.modify(|s| {
            s.room = room;
            s.event = Some(event);
        });
        self.persist_room();
        revision
    }

    /// Replaces the room. Returns the new revision.
    pub fn set_room(&self, room: RoomState) -> u64 {
        if self.is_closed() {
            return self.revision();
        }
        let revision = self.modify(|s| {
            if let Some(event) = s.event.as_mut() {
                event.room = room.clone();
            }
            s.room = room;
        });
        self.persist_room();
        revision
    }

    /// Edits the room in place. Returns the new revision.
    pub fn update_room(&self, f: impl FnOnce(&mut RoomState)) -> u64 {
        let mut room = self.room();
        f(&mut room);
        self.set_room(room)
    }

    /// Replaces the room only if the cache is still at `expected_revision`.
    ///
    /// Returns `false` (and changes nothing) when another writer got there
    /// first; their state is newer and wins.
    pub fn set_room_if_current(&self, expected_revision: u64, room: RoomState) -> bool {
        if self.is_closed() {
            return false;
        }
        let replaced = self.inner.state.send_if_modified(|s| {
            if s.revision != expected_revision {
                return false;
            }
            if let Some(event) = s.event.as_mut() {
                event.room = room.clone();
            }
            s.room = room;
            s.revision = s.revision.wrapping_add(1);
            true
        });
        if replaced {
            self.persist_room();
        }
        replaced
    }

    /// Replaces the settings of the cached event. No-op without an event.
    /// Returns the new revision.
    pub fn set_settings(&self, settings: TimerState) -> u64 {
        if self.is_closed() {
            return self.revision();
        }
        self.modify(|s| {
            if let Some(event) = s.event.as_mut() {
                event.settings = settings;
            }
        })
    }

    /// Empties the cache, closes it for writes and deletes the persisted
    /// snapshot if it belongs to this event. A snapshot written by another
    /// event is left in place.
    pub fn clear(&self) {
        let event_id = self.inner.event_id;
        self.inner.closed.store(true, Ordering::SeqCst);
        self.modify(|s| {
            s.event = None;
            s.room = RoomState::default();
        });
        match read_json::<StoredRoom>(self.inner.kv.as_ref(), ROOM_STATE_KEY) {
            Some(stored) if stored.event_id != event_id => {
                tracing::debug!(%event_id, stored = %stored.event_id, "keeping room snapshot of another event");
            }
            Some(_) => {
                if let Err(e) = self.inner.kv.remove(ROOM_STATE_KEY) {
                    tracing::warn!(%event_id, error = %e, "failed to drop room snapshot");
                }
            }
            None => {}
        }
    }

    fn modify(&self, f: impl FnOnce(&mut CacheState)) -> u64 {
        let mut revision = 0;
        self.inner.state.send_modify(|s| {
            f(s);
            s.revision = s.revision.wrapping_add(1);
            revision = s.revision;
        });
        revision
    }

    fn persist_room(&self) {
        let record = StoredRoom {
            event_id: self.inner.event_id,
            room: self.room(),
        };
        if let Err(e) = write_json(self.inner.kv.as_ref(), ROOM_STATE_KEY, &record) {
            tracing::warn!(event_id = %self.inner.event_id, error = %e, "failed to persist room snapshot");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::CustomClock;
    use crate::store::kv::MemoryStore;

    fn event_with_player() -> Event {
        let mut event = Event::scheduled("c", TimerState::Custom(CustomClock::new(60)));
        event.room.push_waitlist(uuid::Uuid::new_v4(), "Ann");
        event
    }

    #[test]
    fn set_event_bumps_revision_and_mirrors_room() {
        let cache = EventCache::new(Arc::new(MemoryStore::new()), EventId::new());
        let event = event_with_player();
        let rev = cache.set_event(event.clone());
        assert_eq!(rev, 1);
        assert_eq!(cache.room(), event.room);
        assert_eq!(cache.event().map(|e| e.id), Some(event.id));
    }

    #[test]
    fn conditional_room_write_loses_to_newer_state() {
        let cache = EventCache::new(Arc::new(MemoryStore::new()), EventId::new());
        let rev = cache.set_room(RoomState::default());
        cache.update_room(|room| {
            room.push_waitlist(uuid::Uuid::new_v4(), "Bo");
        });
        assert!(!cache.set_room_if_current(rev, RoomState::default()));
        assert_eq!(cache.room().waiting_list.len(), 1);

        let current = cache.revision();
        assert!(cache.set_room_if_current(current, RoomState::default()));
        assert!(cache.room().waiting_list.is_empty());
    }

    #[test]
    fn restore_reads_persisted_snapshot() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let event = event_with_player();
        let first = EventCache::new(Arc::clone(&kv), event.id);
        first.set_event(event.clone());

        let reloaded = EventCache::restore(kv, event.id);
        assert_eq!(reloaded.room(), event.room);
        assert!(reloaded.event().is_none());
    }

    #[test]
    fn restore_survives_corrupt_snapshot() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let _ = kv.set(ROOM_STATE_KEY, "[[[");
        let cache = EventCache::restore(kv, EventId::new());
        assert_eq!(cache.room(), RoomState::default());
    }

    #[test]
    fn clear_drops_state_and_snapshot() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let event = event_with_player();
        let cache = EventCache::new(Arc::clone(&kv), event.id);
        cache.set_event(event);
        cache.clear();
        assert!(cache.event().is_none());
        assert_eq!(kv.get(ROOM_STATE_KEY).ok(), Some(None));
    }

    #[test]
    fn cleared_cache_ignores_late_writes() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let event = event_with_player();
        let cache = EventCache::new(Arc::clone(&kv), event.id);
        let rev = cache.set_event(event.clone());
        cache.clear();
        assert!(cache.is_closed());
        let revision = cache.revision();

        cache.set_room(event.room.clone());
        cache.set_event(event.clone());
        assert!(!cache.set_room_if_current(revision, event.room));
        assert!(rev < revision);
        assert_eq!(cache.revision(), revision);
        assert!(cache.event().is_none());
        assert_eq!(kv.get(ROOM_STATE_KEY).ok(), Some(None));
    }

    #[test]
    fn clear_keeps_snapshot_of_another_event() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let stale = EventCache::new(Arc::clone(&kv), EventId::new());
        let event = event_with_player();
        let current = EventCache::new(Arc::clone(&kv), event.id);
        current.set_event(event.clone());

        stale.clear();
        let reloaded = EventCache::restore(kv, event.id);
        assert_eq!(reloaded.room(), event.room);
    }
}
