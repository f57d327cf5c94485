//! The record-store contract the synchronization engine depends on.

use std::fmt;

use uuid::Uuid;

use crate::domain::{Event, EventId, EventPatch, RoomState, Table, WaitlistEntry};
use crate::error::SyncError;

/// Canonical store of events, tables, seats and waitlists.
///
/// Every method is asynchronous and returns the authoritative state after
/// the operation, so callers can overwrite optimistic local state with it.
/// Implemented over HTTP by [`super::HttpRecordStore`] and in process by
/// [`crate::domain::EventRegistry`].
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// `GET /events/{id}`: the full aggregate.
    ///
    /// # Errors
    ///
    /// [`SyncError::EventNotFound`] if the event was deleted; transport or
    /// upstream errors otherwise.
    async fn get_event(&self, event_id: EventId) -> Result<Event, SyncError>;

    /// `PATCH /events/{id}`: status, settings, end time, summary.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidTransition`]/[`SyncError::Conflict`] for an
    /// illegal status change, plus the errors of [`Self::get_event`].
    async fn update_event(&self, event_id: EventId, patch: EventPatch) -> Result<Event, SyncError>;

    /// `POST /events/{id}/waitinglist`: appends a player.
    ///
    /// # Errors
    ///
    /// Transport, not-found or conflict errors from the store.
    async fn add_waitlist_entry(
        &self,
        event_id: EventId,
        entry_id: Uuid,
        name: &str,
    ) -> Result<Vec<WaitlistEntry>, SyncError>;

    /// `DELETE /events/{id}/waitinglist`: removes a player.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] for an unknown entry, transport errors.
    async fn remove_waitlist_entry(
        &self,
        event_id: EventId,
        entry_id: Uuid,
    ) -> Result<Vec<WaitlistEntry>, SyncError>;

    /// `PATCH /events/{id}/waitinglist`: moves a player to `new_index`.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] or [`SyncError::InvalidRequest`], transport errors.
    async fn reorder_waitlist(
        &self,
        event_id: EventId,
        entry_id: Uuid,
        new_index: usize,
    ) -> Result<Vec<WaitlistEntry>, SyncError>;

    /// `POST /events/{id}/tables`: adds an empty table.
    ///
    /// # Errors
    ///
    /// Transport, not-found or conflict errors from the store.
    async fn create_table(&self, event_id: EventId, table_id: Uuid) -> Result<Vec<Table>, SyncError>;

    /// `DELETE /events/{id}/tables/{tableId}`: removes a table and renumbers.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] for an unknown table, transport errors.
    async fn delete_table(&self, event_id: EventId, table_id: Uuid) -> Result<Vec<Table>, SyncError>;

    /// `POST /events/{id}/tables/{tableId}/seats/{seatIndex}`: seats
    /// `player_id` and drops them from the waitlist atomically.
    ///
    /// # Errors
    ///
    /// [`SyncError::Conflict`] if the seat is taken or the player is no
    /// longer waiting, transport errors.
    async fn assign_seat(
        &self,
        event_id: EventId,
        table_id: Uuid,
        seat_index: usize,
        player_id: Uuid,
    ) -> Result<RoomState, SyncError>;

    /// `DELETE /events/{id}/tables/{tableId}/seats/{seatIndex}`: empties a seat.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] for an unknown table or seat, transport errors.
    async fn empty_seat(
        &self,
        event_id: EventId,
        table_id: Uuid,
        seat_index: usize,
    ) -> Result<RoomState, SyncError>;
}
