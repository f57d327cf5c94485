//! Signal messages exchanged between surfaces of the same profile.
//!
//! Signals are hints, not payloads: they tell a receiver which of its
//! stores to re-read. A receiver never treats a signal as authoritative
//! state, and nothing breaks if one is lost.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::EventId;
use super::timer::TimerAnchor;

/// Fixed namespace shared by every surface of the same event family.
pub const SIGNAL_TOPIC: &str = "tableclock.events";

/// Identifies the surface that published a signal, for echo suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTag(uuid::Uuid);

impl SourceTag {
    /// Creates a fresh random tag.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SourceTag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    /// The timer anchor was re-written (start, pause, edit, level change).
    TimerUpdate,
    /// A score changed.
    ScoreUpdate,
    /// A basketball period rolled over or was set.
    PeriodChange,
    /// The event ended; receivers tear down.
    EndEvent,
}

impl SignalKind {
    /// Returns the kind as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TimerUpdate => "TIMER_UPDATE",
            Self::ScoreUpdate => "SCORE_UPDATE",
            Self::PeriodChange => "PERIOD_CHANGE",
            Self::EndEvent => "END_EVENT",
        }
    }
}

/// Optional small hint carried next to the kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hint", rename_all = "snake_case")]
pub enum SignalHint {
    /// The anchor that was just persisted.
    Anchor {
        /// New anchor value.
        anchor: TimerAnchor,
    },
    /// Current scores.
    #[serde(rename_all = "camelCase")]
    Score {
        /// Home team score.
        home_score: u32,
        /// Away team score.
        away_score: u32,
    },
    /// Period now in play.
    Period {
        /// 1-based period number.
        period: u32,
    },
}

/// Envelope published on the signal channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    /// What changed.
    #[serde(rename = "type")]
    pub kind: SignalKind,
    /// Event the change belongs to.
    pub event_id: EventId,
    /// Publishing surface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tag: Option<SourceTag>,
    /// Optional hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SignalHint>,
}

impl SignalMessage {
    /// Creates an untagged message; the endpoint stamps the source tag.
    #[must_use]
    pub const fn new(kind: SignalKind, event_id: EventId) -> Self {
        Self {
            kind,
            event_id,
            source_tag: None,
            state: None,
        }
    }

    /// Attaches a hint.
    #[must_use]
    pub fn with_hint(mut self, hint: SignalHint) -> Self {
        self.state = Some(hint);
        self
    }

    /// Returns `true` if `tag` published this message.
    #[must_use]
    pub fn is_from(&self, tag: SourceTag) -> bool {
        self.source_tag == Some(tag)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_match_wire_names() {
        assert_eq!(SignalKind::TimerUpdate.as_str(), "TIMER_UPDATE");
        let json = serde_json::to_string(&SignalKind::EndEvent).unwrap_or_default();
        assert_eq!(json, "\"END_EVENT\"");
    }

    #[test]
    fn message_serializes_minimal_shape() {
        let msg = SignalMessage::new(SignalKind::ScoreUpdate, EventId::new()).with_hint(
            SignalHint::Score {
                home_score: 10,
                away_score: 8,
            },
        );
        let json = serde_json::to_value(&msg).unwrap_or_default();
        assert_eq!(json["type"], "SCORE_UPDATE");
        assert_eq!(json["state"]["hint"], "score");
        assert_eq!(json["state"]["homeScore"], 10);
        assert!(json.get("sourceTag").is_none());
    }

    #[test]
    fn is_from_matches_only_own_tag() {
        let tag = SourceTag::new();
        let mut msg = SignalMessage::new(SignalKind::TimerUpdate, EventId::new());
        assert!(!msg.is_from(tag));
        msg.source_tag = Some(tag);
        assert!(msg.is_from(tag));
        assert!(!msg.is_from(SourceTag::new()));
    }
}
