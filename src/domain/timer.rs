//! Timer settings and the anchor every surface derives its countdown from.
//!
//! [`TimerState`] is the per-event settings payload, discriminated by a
//! `type` tag so each variant has a fixed shape. [`TimerAnchor`] is the
//! small record shared between surfaces: a start timestamp plus the
//! remaining time at that instant. Live remaining time is never stored.

use serde::{Deserialize, Serialize};

/// One level of a poker blind structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlindLevel {
    /// Level identifier, stable across edits.
    pub id: u32,
    /// Small blind amount.
    pub small_blind: u64,
    /// Big blind amount.
    pub big_blind: u64,
    /// Level length in minutes.
    pub duration_minutes: u32,
}

impl BlindLevel {
    /// Level length in seconds.
    #[must_use]
    pub const fn duration_seconds(&self) -> u64 {
        self.duration_minutes as u64 * 60
    }
}

/// Poker blind clock settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PokerClock {
    /// Ordered blind structure.
    pub levels: Vec<BlindLevel>,
    /// Index of the level in play, within `[0, levels.len())`.
    pub current_level: usize,
    /// Remaining seconds in the current level at the last snapshot.
    pub time_remaining: u64,
    /// Seconds played since the first level started, at the last snapshot.
    pub total_play_time: u64,
}

impl PokerClock {
    /// Builds a clock positioned at the first level.
    #[must_use]
    pub fn new(levels: Vec<BlindLevel>) -> Self {
        let time_remaining = levels.first().map_or(0, BlindLevel::duration_seconds);
        Self {
            levels,
            current_level: 0,
            time_remaining,
            total_play_time: 0,
        }
    }

    /// Returns the level in play, if the index is valid.
    #[must_use]
    pub fn level(&self) -> Option<&BlindLevel> {
        self.levels.get(self.current_level)
    }

    /// Returns `true` if the current level is the last one.
    #[must_use]
    pub fn is_last_level(&self) -> bool {
        self.current_level.saturating_add(1) >= self.levels.len()
    }

    /// Seconds in all levels before `index`.
    #[must_use]
    pub fn elapsed_before(&self, index: usize) -> u64 {
        self.levels
            .iter()
            .take(index)
            .map(BlindLevel::duration_seconds)
            .sum()
    }
}

/// Basketball game clock settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasketballClock {
    /// Period in play, 1-based.
    pub period: u32,
    /// Number of regulation periods.
    pub total_periods: u32,
    /// Remaining seconds in the period at the last snapshot.
    pub game_time: u64,
    /// Configured length of one period in seconds.
    pub period_length_seconds: u64,
    /// Home team score.
    pub home_score: u32,
    /// Away team score.
    pub away_score: u32,
}

impl BasketballClock {
    /// Builds a clock at the start of the first period.
    #[must_use]
    pub const fn new(total_periods: u32, period_length_seconds: u64) -> Self {
        Self {
            period: 1,
            total_periods,
            game_time: period_length_seconds,
            period_length_seconds,
            home_score: 0,
            away_score: 0,
        }
    }
}

/// Generic countdown settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomClock {
    /// Full countdown length in seconds.
    pub duration: u64,
    /// Remaining seconds at the last snapshot.
    pub time_remaining: u64,
}

impl CustomClock {
    /// Builds a full-length countdown.
    #[must_use]
    pub const fn new(duration: u64) -> Self {
        Self {
            duration,
            time_remaining: duration,
        }
    }
}

/// Per-event timer settings. Exactly one variant is active per event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimerState {
    /// Poker blind timer.
    Poker(PokerClock),
    /// Basketball game clock.
    Basketball(BasketballClock),
    /// Plain countdown.
    Custom(CustomClock),
}

impl TimerState {
    /// Index stored in the anchor for this variant: the blind level for
    /// poker, the period for basketball, always 0 for custom.
    #[must_use]
    pub fn anchor_index(&self) -> usize {
        match self {
            Self::Poker(p) => p.current_level,
            Self::Basketball(b) => b.period as usize,
            Self::Custom(_) => 0,
        }
    }

    /// Full length in seconds of the current level, period or countdown.
    #[must_use]
    pub fn segment_length(&self) -> u64 {
        match self {
            Self::Poker(p) => p.level().map_or(0, BlindLevel::duration_seconds),
            Self::Basketball(b) => b.period_length_seconds,
            Self::Custom(c) => c.duration,
        }
    }

    /// Remaining seconds recorded in the settings snapshot.
    #[must_use]
    pub const fn snapshot_remaining(&self) -> u64 {
        match self {
            Self::Poker(p) => p.time_remaining,
            Self::Basketball(b) => b.game_time,
            Self::Custom(c) => c.time_remaining,
        }
    }

    /// Variant discriminator as a static string.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::Poker(_) => "poker",
            Self::Basketball(_) => "basketball",
            Self::Custom(_) => "custom",
        }
    }
}

/// Timestamp plus remaining duration from which every surface recomputes
/// the countdown on demand.
///
/// Re-anchored on every start, pause, level or period change and manual
/// edit. Two surfaces holding equal anchors always compute the same
/// remaining time for the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerAnchor {
    /// Wall-clock instant (ms since the Unix epoch) the anchor was taken.
    pub started_at_epoch_ms: i64,
    /// Remaining seconds at `started_at_epoch_ms`.
    pub initial_remaining_seconds: f64,
    /// Whether the countdown is running.
    pub is_running: bool,
    /// Blind level index or period number the anchor belongs to.
    pub level_or_period_index: usize,
}

impl TimerAnchor {
    /// Anchor for a stopped clock showing `remaining_seconds`.
    #[must_use]
    pub const fn paused(remaining_seconds: f64, index: usize, now_epoch_ms: i64) -> Self {
        Self {
            started_at_epoch_ms: now_epoch_ms,
            initial_remaining_seconds: remaining_seconds,
            is_running: false,
            level_or_period_index: index,
        }
    }

    /// Anchor for a clock counting down from `remaining_seconds` at `now`.
    #[must_use]
    pub const fn running(remaining_seconds: f64, index: usize, now_epoch_ms: i64) -> Self {
        Self {
            started_at_epoch_ms: now_epoch_ms,
            initial_remaining_seconds: remaining_seconds,
            is_running: true,
            level_or_period_index: index,
        }
    }

    /// Instant at which a running anchor reaches zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn expires_at_epoch_ms(&self) -> i64 {
        let span_ms = (self.initial_remaining_seconds.max(0.0) * 1000.0).round() as i64;
        self.started_at_epoch_ms.saturating_add(span_ms)
    }
}
