//! Room state: tables with fixed seat arrays and the waitlist.
//!
//! The operations here are pure and shared by the optimistic client path
//! ([`crate::service::RoomStateManager`]) and the reference record store
//! ([`super::EventRegistry`]), so both sides renumber identically.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;

/// Number of seats at every table for its whole lifetime.
pub const SEATS_PER_TABLE: usize = 9;

/// Position of the first waitlist entry.
pub const WAITLIST_BASE: u32 = 1;

/// One seat at a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    /// 1-based seat position.
    pub position: u32,
    /// Seated player, if any.
    pub player_id: Option<Uuid>,
    /// Seated player's display name, if any.
    pub player_name: Option<String>,
}

impl Seat {
    /// Returns `true` if nobody sits here.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.player_id.is_none()
    }
}

/// A table with a dense 1-based number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Table identifier.
    pub id: Uuid,
    /// Dense 1-based table number.
    pub number: u32,
    /// Exactly [`SEATS_PER_TABLE`] seats in position order.
    pub seats: Vec<Seat>,
}

impl Table {
    /// Creates a table with all seats empty.
    #[must_use]
    pub fn empty(id: Uuid, number: u32) -> Self {
        let seats = (1..=SEATS_PER_TABLE as u32)
            .map(|position| Seat {
                position,
                player_id: None,
                player_name: None,
            })
            .collect();
        Self { id, number, seats }
    }
}

/// A player waiting for a seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistEntry {
    /// Player identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Dense position starting at [`WAITLIST_BASE`].
    pub position: u32,
}

/// Tables and waitlist of one event: the sub-tree surfaces cache,
/// persist locally and mutate optimistically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    /// Tables in number order.
    pub tables: Vec<Table>,
    /// Waitlist in position order.
    pub waiting_list: Vec<WaitlistEntry>,
}

/// Rewrites waitlist positions densely in list order.
pub fn renumber_waitlist(entries: &mut [WaitlistEntry]) {
    for (position, entry) in (WAITLIST_BASE..).zip(entries.iter_mut()) {
        entry.position = position;
    }
}

/// Rewrites table numbers densely from 1 in list order.
pub fn renumber_tables(tables: &mut [Table]) {
    for (number, table) in (1..).zip(tables.iter_mut()) {
        table.number = number;
    }
}

impl RoomState {
    /// Appends a player to the end of the waitlist.
    pub fn push_waitlist(&mut self, id: Uuid, name: impl Into<String>) -> WaitlistEntry {
        renumber_waitlist(&mut self.waiting_list);
        let entry = WaitlistEntry {
            id,
            name: name.into(),
            position: WAITLIST_BASE.saturating_add(self.waiting_list.len() as u32),
        };
        self.waiting_list.push(entry.clone());
        entry
    }

    /// Removes a waitlist entry and renumbers the rest.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if no entry has the given id.
    pub fn remove_waitlist(&mut self, entry_id: Uuid) -> Result<WaitlistEntry, SyncError> {
        let index = self.waitlist_index(entry_id)?;
        let removed = self.waiting_list.remove(index);
        renumber_waitlist(&mut self.waiting_list);
        Ok(removed)
    }

    /// Moves an entry to `new_index` (0-based list index) and renumbers
    /// every entry, not only the ones between the old and new index.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] for an unknown entry and
    /// [`SyncError::InvalidRequest`] if `new_index` is past the end.
    pub fn reorder_waitlist(&mut self, entry_id: Uuid, new_index: usize) -> Result<(), SyncError> {
        if new_index >= self.waiting_list.len() {
            return Err(SyncError::InvalidRequest(format!(
                "waitlist index {new_index} out of range (len {})",
                self.waiting_list.len()
            )));
        }
        let old_index = self.waitlist_index(entry_id)?;
        let moved = self.waiting_list.remove(old_index);
        self.waiting_list.insert(new_index, moved);
        renumber_waitlist(&mut self.waiting_list);
        Ok(())
    }

    /// Appends an empty table numbered after the existing ones.
    pub fn add_table(&mut self, id: Uuid) -> Table {
        renumber_tables(&mut self.tables);
        let table = Table::empty(id, (self.tables.len() as u32).saturating_add(1));
        self.tables.push(table.clone());
        table
    }

    /// Deletes a table and renumbers the remaining ones densely from 1.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if the table does not exist.
    pub fn remove_table(&mut self, table_id: Uuid) -> Result<Table, SyncError> {
        let index = self
            .tables
            .iter()
            .position(|t| t.id == table_id)
            .ok_or_else(|| SyncError::NotFound(format!("table {table_id}")))?;
        let removed = self.tables.remove(index);
        renumber_tables(&mut self.tables);
        Ok(removed)
    }

    /// Seats a waiting player and drops them from the waitlist in the same
    /// step.
    ///
    /// With `player_id == None` the head of the waitlist is taken. With a
    /// named player, that player is taken from wherever they wait; this is
    /// how the record store honours the player a surface picked.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotFound`] for an unknown table or seat index.
    /// - [`SyncError::Conflict`] if the seat is taken, the player already
    ///   sits somewhere, or the named player is no longer waiting.
    /// - [`SyncError::InvalidRequest`] if the waitlist is empty.
    pub fn assign_seat(
        &mut self,
        table_id: Uuid,
        seat_index: usize,
        player_id: Option<Uuid>,
    ) -> Result<WaitlistEntry, SyncError> {
        self.seat(table_id, seat_index).and_then(|seat| {
            if seat.is_empty() {
                Ok(())
            } else {
                Err(SyncError::Conflict(format!(
                    "seat {} at table {table_id} is occupied",
                    seat.position
                )))
            }
        })?;

        let entry_index = match player_id {
            Some(id) => self.waiting_list.iter().position(|e| e.id == id).ok_or_else(|| {
                SyncError::Conflict(format!("player {id} is no longer waiting"))
            })?,
            None if self.waiting_list.is_empty() => {
                return Err(SyncError::InvalidRequest("waitlist is empty".to_string()));
            }
            None => 0,
        };
        let Some(candidate) = self.waiting_list.get(entry_index) else {
            return Err(SyncError::Internal("waitlist index vanished".to_string()));
        };
        if self.seat_of(candidate.id).is_some() {
            return Err(SyncError::Conflict(format!(
                "player {} is already seated",
                candidate.id
            )));
        }

        let entry = self.waiting_list.remove(entry_index);
        renumber_waitlist(&mut self.waiting_list);
        let seat = self.seat_mut(table_id, seat_index)?;
        seat.player_id = Some(entry.id);
        seat.player_name = Some(entry.name.clone());
        Ok(entry)
    }

    /// Clears a seat, returning the player id that sat there.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] for an unknown table or seat index.
    pub fn empty_seat(&mut self, table_id: Uuid, seat_index: usize) -> Result<Option<Uuid>, SyncError> {
        let seat = self.seat_mut(table_id, seat_index)?;
        seat.player_name = None;
        Ok(seat.player_id.take())
    }

    /// Returns `(table number, seat position)` for a seated player.
    #[must_use]
    pub fn seat_of(&self, player_id: Uuid) -> Option<(u32, u32)> {
        self.tables.iter().find_map(|table| {
            table
                .seats
                .iter()
                .find(|s| s.player_id == Some(player_id))
                .map(|s| (table.number, s.position))
        })
    }

    /// Number of seats across all tables holding `player_id`.
    #[must_use]
    pub fn seat_count(&self, player_id: Uuid) -> usize {
        self.tables
            .iter()
            .flat_map(|t| t.seats.iter())
            .filter(|s| s.player_id == Some(player_id))
            .count()
    }

    /// Checks the dense-numbering and fixed-seat invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedRecord`] naming the first violation.
    pub fn validate(&self) -> Result<(), SyncError> {
        for (expected, table) in (1u32..).zip(&self.tables) {
            if table.number != expected {
                return Err(SyncError::MalformedRecord(format!(
                    "table numbers not dense: expected {expected}, found {}",
                    table.number
                )));
            }
            if table.seats.len() != SEATS_PER_TABLE {
                return Err(SyncError::MalformedRecord(format!(
                    "table {} has {} seats",
                    table.number,
                    table.seats.len()
                )));
            }
            if (1u32..).zip(&table.seats).any(|(p, s)| s.position != p) {
                return Err(SyncError::MalformedRecord(format!(
                    "table {} seat positions out of order",
                    table.number
                )));
            }
        }
        for (expected, entry) in (WAITLIST_BASE..).zip(&self.waiting_list) {
            if entry.position != expected {
                return Err(SyncError::MalformedRecord(format!(
                    "waitlist positions not dense: expected {expected}, found {}",
                    entry.position
                )));
            }
        }
        Ok(())
    }

    fn waitlist_index(&self, entry_id: Uuid) -> Result<usize, SyncError> {
        self.waiting_list
            .iter()
            .position(|e| e.id == entry_id)
            .ok_or_else(|| SyncError::NotFound(format!("waitlist entry {entry_id}")))
    }

    fn seat(&self, table_id: Uuid, seat_index: usize) -> Result<&Seat, SyncError> {
        self.tables
            .iter()
            .find(|t| t.id == table_id)
            .ok_or_else(|| SyncError::NotFound(format!("table {table_id}")))?
            .seats
            .get(seat_index)
            .ok_or_else(|| SyncError::NotFound(format!("seat {seat_index} at table {table_id}")))
    }

    fn seat_mut(&mut self, table_id: Uuid, seat_index: usize) -> Result<&mut Seat, SyncError> {
        self.tables
            .iter_mut()
            .find(|t| t.id == table_id)
            .ok_or_else(|| SyncError::NotFound(format!("table {table_id}")))?
            .seats
            .get_mut(seat_index)
            .ok_or_else(|| SyncError::NotFound(format!("seat {seat_index} at table {table_id}")))
    }
}
