//! In-memory record store with per-event fine-grained locking.
//!
//! [`EventRegistry`] backs the reference HTTP record store and also
//! implements [`RecordStore`] directly, so surfaces can run in process
//! against it without a network hop.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::event::{Event, EventPatch, EventStatus};
use super::room::{RoomState, Table, WaitlistEntry};
use super::EventId;
use crate::client::RecordStore;
use crate::error::SyncError;

/// Central store for all events.
///
/// Uses a `RwLock<HashMap<...>>` for the outer map and per-entry
/// `Arc<RwLock<Event>>` so mutations on different events do not contend.
#[derive(Debug)]
pub struct EventRegistry {
    events: RwLock<HashMap<EventId, Arc<RwLock<Event>>>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a new event.
    ///
    /// # Errors
    ///
    /// - [`SyncError::MalformedRecord`] if the event fails validation.
    /// - [`SyncError::InvalidRequest`] if the id is already taken.
    pub async fn insert(&self, event: Event) -> Result<EventId, SyncError> {
        event.validate()?;
        let event_id = event.id;
        let mut map = self.events.write().await;
        if map.contains_key(&event_id) {
            return Err(SyncError::InvalidRequest(format!(
                "event {event_id} already exists"
            )));
        }
        map.insert(event_id, Arc::new(RwLock::new(event)));
        tracing::info!(%event_id, "event created");
        Ok(event_id)
    }

    /// Returns a snapshot of an event.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EventNotFound`] if no such event exists.
    pub async fn get(&self, event_id: EventId) -> Result<Event, SyncError> {
        let entry = self.entry(event_id).await?;
        let event = entry.read().await;
        Ok(event.clone())
    }

    /// Deletes an event.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EventNotFound`] if no such event exists.
    pub async fn remove(&self, event_id: EventId) -> Result<(), SyncError> {
        let mut map = self.events.write().await;
        map.remove(&event_id)
            .ok_or(SyncError::EventNotFound(event_id))?;
        tracing::info!(%event_id, "event deleted");
        Ok(())
    }

    /// Returns snapshots of all events, optionally filtered by status.
    pub async fn list(&self, status: Option<EventStatus>) -> Vec<Event> {
        let map = self.events.read().await;
        let mut events = Vec::with_capacity(map.len());
        for entry in map.values() {
            let event = entry.read().await;
            if let Some(filter) = status
                && event.status != filter
            {
                continue;
            }
            events.push(event.clone());
        }
        events.sort_by_key(|e| e.created_at);
        events
    }

    /// Returns the number of events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns `true` if the registry holds no events.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    async fn entry(&self, event_id: EventId) -> Result<Arc<RwLock<Event>>, SyncError> {
        let map = self.events.read().await;
        map.get(&event_id)
            .cloned()
            .ok_or(SyncError::EventNotFound(event_id))
    }

    /// Runs a room mutation under the event's write lock. Ended events are
    /// archived and refuse room changes.
    async fn mutate_room<T>(
        &self,
        event_id: EventId,
        op: impl FnOnce(&mut RoomState) -> Result<(), SyncError>,
        project: impl FnOnce(&RoomState) -> T,
    ) -> Result<T, SyncError> {
        let entry = self.entry(event_id).await?;
        let mut event = entry.write().await;
        if event.status == EventStatus::Ended {
            return Err(SyncError::Conflict(format!(
                "event {event_id} has ended and is read-only"
            )));
        }
        // Work on a copy so a failed operation leaves the record untouched.
        let mut room = event.room.clone();
        op(&mut room)?;
        event.room = room;
        Ok(project(&event.room))
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RecordStore for EventRegistry {
    async fn get_event(&self, event_id: EventId) -> Result<Event, SyncError> {
        self.get(event_id).await
    }

    async fn update_event(&self, event_id: EventId, patch: EventPatch) -> Result<Event, SyncError> {
        let entry = self.entry(event_id).await?;
        let mut event = entry.write().await;
        let from = event.status;
        // Patch a copy so a record that fails validation is never stored.
        let mut patched = event.clone();
        patched.apply_patch(patch)?;
        if let Err(e) = patched.validate() {
            tracing::warn!(%event_id, error = %e, "rejecting patch");
            return Err(e);
        }
        *event = patched;
        if from != event.status {
            tracing::info!(%event_id, %from, to = %event.status, "event status changed");
        }
        Ok(event.clone())
    }

    async fn add_waitlist_entry(
        &self,
        event_id: EventId,
        entry_id: Uuid,
        name: &str,
    ) -> Result<Vec<WaitlistEntry>, SyncError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::InvalidRequest("player name is empty".to_string()));
        }
        self.mutate_room(
            event_id,
            |room| {
                if room.waiting_list.iter().any(|e| e.id == entry_id)
                    || room.seat_of(entry_id).is_some()
                {
                    return Err(SyncError::Conflict(format!(
                        "player {entry_id} is already in the room"
                    )));
                }
                room.push_waitlist(entry_id, name);
                Ok(())
            },
            |room| room.waiting_list.clone(),
        )
        .await
    }

    async fn remove_waitlist_entry(
        &self,
        event_id: EventId,
        entry_id: Uuid,
    ) -> Result<Vec<WaitlistEntry>, SyncError> {
        self.mutate_room(
            event_id,
            |room| room.remove_waitlist(entry_id).map(|_| ()),
            |room| room.waiting_list.clone(),
        )
        .await
    }

    async fn reorder_waitlist(
        &self,
        event_id: EventId,
        entry_id: Uuid,
        new_index: usize,
    ) -> Result<Vec<WaitlistEntry>, SyncError> {
        self.mutate_room(
            event_id,
            |room| room.reorder_waitlist(entry_id, new_index),
            |room| room.waiting_list.clone(),
        )
        .await
    }

    async fn create_table(&self, event_id: EventId, table_id: Uuid) -> Result<Vec<Table>, SyncError> {
        self.mutate_room(
            event_id,
            |room| {
                if room.tables.iter().any(|t| t.id == table_id) {
                    return Err(SyncError::Conflict(format!("table {table_id} exists")));
                }
                room.add_table(table_id);
                Ok(())
            },
            |room| room.tables.clone(),
        )
        .await
    }

    async fn delete_table(&self, event_id: EventId, table_id: Uuid) -> Result<Vec<Table>, SyncError> {
        self.mutate_room(
            event_id,
            |room| room.remove_table(table_id).map(|_| ()),
            |room| room.tables.clone(),
        )
        .await
    }

    async fn assign_seat(
        &self,
        event_id: EventId,
        table_id: Uuid,
        seat_index: usize,
        player_id: Uuid,
    ) -> Result<RoomState, SyncError> {
        self.mutate_room(
            event_id,
            |room| room.assign_seat(table_id, seat_index, Some(player_id)).map(|_| ()),
            RoomState::clone,
        )
        .await
    }

    async fn empty_seat(
        &self,
        event_id: EventId,
        table_id: Uuid,
        seat_index: usize,
    ) -> Result<RoomState, SyncError> {
        self.mutate_room(
            event_id,
            |room| room.empty_seat(table_id, seat_index).map(|_| ()),
            RoomState::clone,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::domain::timer::{BasketballClock, BlindLevel, CustomClock, PokerClock, TimerState};

    fn make_event() -> Event {
        Event::scheduled("countdown", TimerState::Custom(CustomClock::new(300)))
    }

    #[tokio::test]
    async fn insert_and_get() {
        let registry = EventRegistry::new();
        let event = make_event();
        let id = event.id;
        assert_eq!(registry.insert(event).await.ok(), Some(id));
        let fetched = registry.get(id).await;
        assert!(fetched.is_ok());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let registry = EventRegistry::new();
        let event = make_event();
        let _ = registry.insert(event.clone()).await;
        assert!(registry.insert(event).await.is_err());
    }

    #[tokio::test]
    async fn get_nonexistent_is_not_found() {
        let registry = EventRegistry::new();
        let id = EventId::new();
        assert_eq!(registry.get(id).await, Err(SyncError::EventNotFound(id)));
    }

    #[tokio::test]
    async fn remove_then_get_is_not_found() {
        let registry = EventRegistry::new();
        let Ok(id) = registry.insert(make_event()).await else {
            panic!("insert failed");
        };
        assert!(registry.remove(id).await.is_ok());
        assert!(registry.get_event(id).await.is_err());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let registry = EventRegistry::new();
        let Ok(id) = registry.insert(make_event()).await else {
            panic!("insert failed");
        };
        let _ = registry.insert(make_event()).await;
        let patch = EventPatch {
            status: Some(EventStatus::Active),
            ..EventPatch::default()
        };
        assert!(registry.update_event(id, patch).await.is_ok());
        assert_eq!(registry.list(None).await.len(), 2);
        assert_eq!(registry.list(Some(EventStatus::Active)).await.len(), 1);
    }

    #[tokio::test]
    async fn failed_room_mutation_leaves_record_untouched() {
        let registry = EventRegistry::new();
        let Ok(id) = registry.insert(make_event()).await else {
            panic!("insert failed");
        };
        let table_id = Uuid::new_v4();
        let _ = registry.create_table(id, table_id).await;
        let before = registry.get(id).await.ok();
        let result = registry.assign_seat(id, table_id, 0, Uuid::new_v4()).await;
        assert!(matches!(result, Err(SyncError::Conflict(_))));
        assert_eq!(registry.get(id).await.ok(), before);
    }

    #[tokio::test]
    async fn assign_seat_moves_player_out_of_waitlist() {
        let registry = EventRegistry::new();
        let Ok(id) = registry.insert(make_event()).await else {
            panic!("insert failed");
        };
        let player = Uuid::new_v4();
        let table_id = Uuid::new_v4();
        let _ = registry.add_waitlist_entry(id, player, "Ada").await;
        let _ = registry.create_table(id, table_id).await;

        let Ok(room) = registry.assign_seat(id, table_id, 3, player).await else {
            panic!("assignment failed");
        };
        assert!(room.waiting_list.is_empty());
        assert_eq!(room.seat_count(player), 1);
        assert_eq!(room.tables[0].seats[3].player_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn ended_events_are_read_only() {
        let registry = EventRegistry::new();
        let Ok(id) = registry.insert(make_event()).await else {
            panic!("insert failed");
        };
        let end = EventPatch {
            status: Some(EventStatus::Ended),
            ..EventPatch::default()
        };
        let _ = registry.update_event(id, end).await;
        let result = registry.add_waitlist_entry(id, Uuid::new_v4(), "late").await;
        assert!(matches!(result, Err(SyncError::Conflict(_))));
    }

    #[tokio::test]
    async fn out_of_range_settings_are_not_stored() {
        let registry = EventRegistry::new();
        let game = Event::scheduled("game", TimerState::Basketball(BasketballClock::new(4, 600)));
        let Ok(game_id) = registry.insert(game.clone()).await else {
            panic!("insert failed");
        };
        let mut period = BasketballClock::new(4, 600);
        period.period = 9;
        let patch = EventPatch {
            status: Some(EventStatus::Active),
            settings: Some(TimerState::Basketball(period)),
            ..EventPatch::default()
        };
        let result = registry.update_event(game_id, patch).await;
        assert!(matches!(result, Err(SyncError::MalformedRecord(_))));
        let Ok(stored) = registry.get(game_id).await else {
            panic!("event missing");
        };
        assert_eq!(stored, game);
        assert!(stored.validate().is_ok());

        let levels = vec![BlindLevel {
            id: 1,
            small_blind: 25,
            big_blind: 50,
            duration_minutes: 20,
        }];
        let Ok(poker_id) = registry
            .insert(Event::scheduled("poker", TimerState::Poker(PokerClock::new(levels.clone()))))
            .await
        else {
            panic!("insert failed");
        };
        let mut level = PokerClock::new(levels);
        level.current_level = 1;
        let patch = EventPatch {
            settings: Some(TimerState::Poker(level)),
            ..EventPatch::default()
        };
        let result = registry.update_event(poker_id, patch).await;
        assert!(matches!(result, Err(SyncError::MalformedRecord(_))));
        assert!(registry.get(poker_id).await.is_ok_and(|e| e.validate().is_ok()));
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let registry = EventRegistry::new();
        let Ok(id) = registry.insert(make_event()).await else {
            panic!("insert failed");
        };
        let result = registry.add_waitlist_entry(id, Uuid::new_v4(), "   ").await;
        assert!(matches!(result, Err(SyncError::InvalidRequest(_))));
    }
}
