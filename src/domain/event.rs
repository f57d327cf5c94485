//! Event aggregate: status lifecycle, settings, room and end-of-event summary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventId;
use super::room::RoomState;
use super::timer::TimerState;
use crate::error::SyncError;

/// Lifecycle status. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// Created, not yet started.
    Scheduled,
    /// Running; anchors exist and surfaces are synchronizing.
    Active,
    /// Finished and read-only.
    Ended,
}

impl EventStatus {
    /// Returns `true` if `self -> next` is a legal transition.
    ///
    /// Re-asserting the current status is allowed except out of `Ended`,
    /// which stays put.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Scheduled | Self::Active | Self::Ended)
                | (Self::Active, Self::Active | Self::Ended)
                | (Self::Ended, Self::Ended)
        )
    }

    /// Uppercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Active => "ACTIVE",
            Self::Ended => "ENDED",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of timed event. Must agree with the [`TimerState`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Poker tournament with a blind structure.
    Poker,
    /// Basketball game.
    Basketball,
    /// Generic countdown.
    Custom,
}

impl EventType {
    /// Event type implied by a settings variant.
    #[must_use]
    pub const fn of(settings: &TimerState) -> Self {
        match settings {
            TimerState::Poker(_) => Self::Poker,
            TimerState::Basketball(_) => Self::Basketball,
            TimerState::Custom(_) => Self::Custom,
        }
    }
}

/// Result of a finished basketball game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Winner {
    /// Home team won.
    Home,
    /// Away team won.
    Away,
    /// Scores level at the final buzzer.
    Tie,
}

/// Summary persisted when an event ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventSummary {
    /// Poker tournament summary.
    #[serde(rename_all = "camelCase")]
    Poker {
        /// Level in play when the event ended (0-based).
        final_level: usize,
        /// Levels fully played.
        levels_completed: usize,
        /// Seconds of play.
        total_play_time_seconds: u64,
    },
    /// Basketball final score.
    #[serde(rename_all = "camelCase")]
    Basketball {
        /// Home team score.
        home_score: u32,
        /// Away team score.
        away_score: u32,
        /// Winning side.
        winner: Winner,
    },
    /// Countdown summary.
    #[serde(rename_all = "camelCase")]
    Custom {
        /// Configured countdown length.
        duration_seconds: u64,
        /// Whether the countdown ran out.
        completed: bool,
    },
}

impl EventSummary {
    /// Summarizes a settings snapshot whose derived fields are current.
    #[must_use]
    pub fn from_settings(settings: &TimerState) -> Self {
        match settings {
            TimerState::Poker(p) => {
                let expired_last = p.is_last_level() && p.time_remaining == 0;
                Self::Poker {
                    final_level: p.current_level,
                    levels_completed: p.current_level + usize::from(expired_last),
                    total_play_time_seconds: p.total_play_time,
                }
            }
            TimerState::Basketball(b) => Self::Basketball {
                home_score: b.home_score,
                away_score: b.away_score,
                winner: match b.home_score.cmp(&b.away_score) {
                    std::cmp::Ordering::Greater => Winner::Home,
                    std::cmp::Ordering::Less => Winner::Away,
                    std::cmp::Ordering::Equal => Winner::Tie,
                },
            },
            TimerState::Custom(c) => Self::Custom {
                duration_seconds: c.duration,
                completed: c.time_remaining == 0,
            },
        }
    }
}

/// Root aggregate owned by the record store.
///
/// Surfaces hold a cached, possibly stale copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event identifier.
    pub id: EventId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Event kind.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Lifecycle status.
    pub status: EventStatus,
    /// Timer settings for the active variant.
    pub settings: TimerState,
    /// Tables and waitlist.
    #[serde(flatten)]
    pub room: RoomState,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set when the event ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Set when the event ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<EventSummary>,
}

impl Event {
    /// Creates a scheduled event with an empty room.
    #[must_use]
    pub fn scheduled(name: impl Into<String>, settings: TimerState) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            event_type: EventType::of(&settings),
            status: EventStatus::Scheduled,
            settings,
            room: RoomState::default(),
            created_at: Utc::now(),
            ended_at: None,
            summary: None,
        }
    }

    /// Checks the invariants a record must satisfy before a surface
    /// trusts it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedRecord`] naming the first violation.
    pub fn validate(&self) -> Result<(), SyncError> {
        if EventType::of(&self.settings) != self.event_type {
            return Err(SyncError::MalformedRecord(format!(
                "event type {:?} does not match {} settings",
                self.event_type,
                self.settings.kind_str()
            )));
        }
        match &self.settings {
            TimerState::Poker(p) if p.current_level >= p.levels.len() => {
                return Err(SyncError::MalformedRecord(format!(
                    "blind level {} out of range ({} levels)",
                    p.current_level,
                    p.levels.len()
                )));
            }
            TimerState::Basketball(b) if b.period == 0 || b.period > b.total_periods => {
                return Err(SyncError::MalformedRecord(format!(
                    "period {} outside 1..={}",
                    b.period, b.total_periods
                )));
            }
            _ => {}
        }
        self.room.validate()
    }

    /// Applies a partial update. Status changes must be legal transitions.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidTransition`] for an illegal status change.
    /// - [`SyncError::MalformedRecord`] if new settings change the event type.
    pub fn apply_patch(&mut self, patch: EventPatch) -> Result<(), SyncError> {
        if self.status == EventStatus::Ended {
            // Ending twice is a no-op; anything else on an ended event is refused.
            if patch.status == Some(EventStatus::Ended) {
                return Ok(());
            }
            return Err(SyncError::InvalidTransition {
                from: self.status.to_string(),
                to: patch.status.unwrap_or(self.status).to_string(),
            });
        }
        if let Some(status) = patch.status {
            if !self.status.can_transition_to(status) {
                return Err(SyncError::InvalidTransition {
                    from: self.status.to_string(),
                    to: status.to_string(),
                });
            }
        }
        if let Some(settings) = &patch.settings
            && EventType::of(settings) != self.event_type
        {
            return Err(SyncError::MalformedRecord(format!(
                "cannot switch {:?} event to {} settings",
                self.event_type,
                settings.kind_str()
            )));
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(settings) = patch.settings {
            self.settings = settings;
        }
        if patch.ended_at.is_some() {
            self.ended_at = patch.ended_at;
        }
        if patch.summary.is_some() {
            self.summary = patch.summary;
        }
        Ok(())
    }
}

/// Partial update accepted by `PATCH /events/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    /// New status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
    /// Replacement settings (same variant).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<TimerState>,
    /// End timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// End-of-event summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<EventSummary>,
}
