//! Optimistic room mutations with server confirmation or rollback.
//!
//! Every operation follows the same four steps:
//!
//! 1. compute the new room locally and write it to the cache;
//! 2. issue the mutation to the record store;
//! 3. on success, overwrite the affected sub-tree with the server's answer;
//! 4. on failure, restore the pre-mutation room, unless a poll already
//!    replaced the optimistic state with something newer.
//!
//! Local preconditions are checked in step 1, before anything is written
//! or sent.

use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

use crate::client::RecordStore;
use crate::domain::{EventId, RoomState, Table, WaitlistEntry};
use crate::error::SyncError;
use crate::store::EventCache;

/// Optimistic waitlist, table and seat operations for one event.
#[derive(Debug, Clone)]
pub struct RoomStateManager {
    event_id: EventId,
    store: Arc<dyn RecordStore>,
    cache: EventCache,
}

impl RoomStateManager {
    /// Creates a manager writing through `cache` to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, cache: EventCache) -> Self {
        Self {
            event_id: cache.event_id(),
            store,
            cache,
        }
    }

    /// Room as currently rendered (possibly optimistic).
    #[must_use]
    pub fn room(&self) -> RoomState {
        self.cache.room()
    }

    /// Appends a player to the waitlist.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidRequest`] for a blank name; any record-store
    /// error after rollback.
    pub async fn add_to_waitlist(&self, name: &str) -> Result<WaitlistEntry, SyncError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::InvalidRequest("player name is empty".to_string()));
        }
        let before = self.cache.room();
        let mut room = before.clone();
        let entry = room.push_waitlist(Uuid::new_v4(), name);
        let remote = self.store.add_waitlist_entry(self.event_id, entry.id, name);
        let room = self
            .commit("add_to_waitlist", before, room, remote, |room, list| {
                room.waiting_list = list;
            })
            .await?;
        Ok(room
            .waiting_list
            .into_iter()
            .find(|e| e.id == entry.id)
            .unwrap_or(entry))
    }

    /// Removes a waitlist entry.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] for an unknown entry; any record-store error
    /// after rollback.
    pub async fn remove_from_waitlist(&self, entry_id: Uuid) -> Result<RoomState, SyncError> {
        let before = self.cache.room();
        let mut room = before.clone();
        room.remove_waitlist(entry_id)?;
        let remote = self.store.remove_waitlist_entry(self.event_id, entry_id);
        self.commit("remove_from_waitlist", before, room, remote, |room, list| {
            room.waiting_list = list;
        })
        .await
    }

    /// Moves an entry to `new_index` and renumbers the whole list.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] or [`SyncError::InvalidRequest`] for an
    /// unknown entry or out-of-range index; any record-store error after
    /// rollback.
    pub async fn reorder_waitlist(&self, entry_id: Uuid, new_index: usize) -> Result<RoomState, SyncError> {
        let before = self.cache.room();
        let mut room = before.clone();
        room.reorder_waitlist(entry_id, new_index)?;
        let remote = self.store.reorder_waitlist(self.event_id, entry_id, new_index);
        self.commit("reorder_waitlist", before, room, remote, |room, list| {
            room.waiting_list = list;
        })
        .await
    }

    /// Adds an empty table numbered after the existing ones.
    ///
    /// # Errors
    ///
    /// Any record-store error after rollback.
    pub async fn add_table(&self) -> Result<Table, SyncError> {
        let before = self.cache.room();
        let mut room = before.clone();
        let table = room.add_table(Uuid::new_v4());
        let remote = self.store.create_table(self.event_id, table.id);
        let room = self
            .commit("add_table", before, room, remote, |room, tables| {
                room.tables = tables;
            })
            .await?;
        Ok(room
            .tables
            .into_iter()
            .find(|t| t.id == table.id)
            .unwrap_or(table))
    }

    /// Deletes a table; the others are renumbered densely from 1.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] for an unknown table; any record-store error
    /// after rollback.
    pub async fn remove_table(&self, table_id: Uuid) -> Result<RoomState, SyncError> {
        let before = self.cache.room();
        let mut room = before.clone();
        room.remove_table(table_id)?;
        let remote = self.store.delete_table(self.event_id, table_id);
        self.commit("remove_table", before, room, remote, |room, tables| {
            room.tables = tables;
        })
        .await
    }

    /// Seats the head of the waitlist at `seat_index` (0-based) and drops
    /// them from the list in the same step.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidRequest`] if the waitlist is empty.
    /// - [`SyncError::Conflict`] if the seat is taken.
    /// - [`SyncError::NotFound`] for an unknown table or seat.
    /// - Any record-store error after rollback, including a conflict when
    ///   another surface seated the same player first.
    pub async fn assign_seat(&self, table_id: Uuid, seat_index: usize) -> Result<RoomState, SyncError> {
        let before = self.cache.room();
        let mut room = before.clone();
        let player = room.assign_seat(table_id, seat_index, None)?;
        tracing::debug!(event_id = %self.event_id, player = %player.id, %table_id, seat_index, "seating head of waitlist");
        let remote = self
            .store
            .assign_seat(self.event_id, table_id, seat_index, player.id);
        self.commit("assign_seat", before, room, remote, |room, confirmed| {
            *room = confirmed;
        })
        .await
    }

    /// Clears a seat. The player leaves the room; they are not re-queued.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] for an unknown table or seat; any
    /// record-store error after rollback.
    pub async fn empty_seat(&self, table_id: Uuid, seat_index: usize) -> Result<RoomState, SyncError> {
        let before = self.cache.room();
        let mut room = before.clone();
        room.empty_seat(table_id, seat_index)?;
        let remote = self.store.empty_seat(self.event_id, table_id, seat_index);
        self.commit("empty_seat", before, room, remote, |room, confirmed| {
            *room = confirmed;
        })
        .await
    }

    async fn commit<R>(
        &self,
        op: &'static str,
        before: RoomState,
        optimistic: RoomState,
        remote: impl Future<Output = Result<R, SyncError>>,
        confirm: impl FnOnce(&mut RoomState, R),
    ) -> Result<RoomState, SyncError> {
        let event_id = self.event_id;
        let revision = self.cache.set_room(optimistic);
        match remote.await {
            Ok(_) if self.cache.is_closed() => {
                tracing::debug!(%event_id, op, "surface torn down; confirmation dropped");
                Ok(RoomState::default())
            }
            Ok(response) => {
                // Start from whatever the cache holds now: a poll may have
                // landed while the request was in flight.
                let mut confirmed = self.cache.room();
                confirm(&mut confirmed, response);
                self.cache.set_room(confirmed.clone());
                tracing::debug!(%event_id, op, "room mutation confirmed");
                Ok(confirmed)
            }
            Err(e) => {
                if self.cache.set_room_if_current(revision, before) {
                    tracing::warn!(%event_id, op, error = %e, "room mutation failed; rolled back");
                } else {
                    tracing::warn!(%event_id, op, error = %e, "room mutation failed; newer state kept");
                }
                Err(e)
            }
        }
    }
}
