//! Anchor-based countdown and the per-variant rollover rules.
//!
//! Remaining time is always recomputed from a [`TimerAnchor`] and a wall
//! clock reading; nothing here decrements a counter. [`evaluate`] is pure
//! and may be called redundantly by every surface. [`CountdownEngine`] is
//! the control-surface side that re-anchors and persists.

use std::sync::Arc;

use crate::domain::{BlindLevel, TimerAnchor, TimerState};
use crate::error::SyncError;
use crate::store::AnchorStore;

use super::clock::Clock;

/// Remaining seconds derived from `anchor` at `now_epoch_ms`.
///
/// A paused anchor returns its stored value. A running anchor subtracts
/// the elapsed time; a clock that moved backwards counts as no time
/// elapsed, and the result never drops below zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_remaining(anchor: &TimerAnchor, now_epoch_ms: i64) -> f64 {
    let initial = anchor.initial_remaining_seconds.max(0.0);
    if !anchor.is_running {
        return initial;
    }
    let elapsed_ms = now_epoch_ms.saturating_sub(anchor.started_at_epoch_ms).max(0);
    (initial - elapsed_ms as f64 / 1000.0).max(0.0)
}

/// Whole seconds to render for `remaining`, rounded up so the display
/// only shows `0` once time is really out.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn display_seconds(remaining: f64) -> u64 {
    if remaining.is_nan() {
        return 0;
    }
    remaining.max(0.0).ceil() as u64
}

/// State change produced by a rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Poker clock moved to the next blind level.
    LevelAdvanced {
        /// Level that expired.
        from: usize,
        /// Level now in play.
        to: usize,
    },
    /// Last blind level expired; the clock stopped at zero.
    TournamentComplete,
    /// Basketball period expired and the next one is ready (clock stopped).
    PeriodAdvanced {
        /// Period that expired.
        from: u32,
        /// Period now in play.
        to: u32,
    },
    /// Final period expired.
    GameFinished,
    /// Custom countdown reached zero.
    CountdownFinished,
}

/// Result of evaluating settings against an anchor at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Settings with the index aligned to the anchor and derived fields
    /// (`timeRemaining`, `totalPlayTime`, `gameTime`) refreshed.
    pub settings: TimerState,
    /// Anchor after any rollover. Equal to the input if nothing rolled.
    pub anchor: TimerAnchor,
    /// Remaining seconds under the returned anchor.
    pub remaining_seconds: f64,
    /// Rollovers applied, oldest first.
    pub transitions: Vec<Transition>,
    /// Set when the event must be finalized automatically.
    pub finalize: bool,
}

impl Evaluation {
    /// Returns `true` if a rollover re-anchored the clock.
    #[must_use]
    pub fn rolled_over(&self) -> bool {
        !self.transitions.is_empty()
    }

    /// Remaining seconds as rendered.
    #[must_use]
    pub fn display_remaining(&self) -> u64 {
        display_seconds(self.remaining_seconds)
    }
}

/// Applies the rollover rules for `settings` under `anchor` at `now_epoch_ms`.
///
/// - Poker: each expired level re-anchors the next one at the instant the
///   previous one ran out, so a surface that was suspended catches up over
///   several levels exactly. The last level stops at zero.
/// - Basketball: an expired period advances at most one period and stops
///   the clock at a full period length. The last period stops at zero and
///   sets [`Evaluation::finalize`].
/// - Custom: stops at zero.
#[must_use]
pub fn evaluate(settings: &TimerState, anchor: &TimerAnchor, now_epoch_ms: i64) -> Evaluation {
    let mut anchor = *anchor;
    let mut transitions = Vec::new();
    let mut finalize = false;

    let settings = match settings {
        TimerState::Poker(poker) => {
            let mut clock = poker.clone();
            let last = clock.levels.len().saturating_sub(1);
            clock.current_level = anchor.level_or_period_index.min(last);
            loop {
                if !anchor.is_running || compute_remaining(&anchor, now_epoch_ms) > 0.0 {
                    break;
                }
                if clock.current_level < last {
                    let from = clock.current_level;
                    let to = from.saturating_add(1);
                    let length = clock.levels.get(to).map_or(0, BlindLevel::duration_seconds);
                    anchor = TimerAnchor::running(length as f64, to, anchor.expires_at_epoch_ms());
                    clock.current_level = to;
                    transitions.push(Transition::LevelAdvanced { from, to });
                } else {
                    anchor = TimerAnchor::paused(0.0, clock.current_level, now_epoch_ms);
                    transitions.push(Transition::TournamentComplete);
                }
            }
            let remaining = display_seconds(compute_remaining(&anchor, now_epoch_ms));
            let length = clock.level().map_or(0, BlindLevel::duration_seconds);
            clock.time_remaining = remaining;
            clock.total_play_time = clock
                .elapsed_before(clock.current_level)
                .saturating_add(length.saturating_sub(remaining));
            TimerState::Poker(clock)
        }
        TimerState::Basketball(basketball) => {
            let mut clock = basketball.clone();
            let total = clock.total_periods.max(1);
            clock.period = u32::try_from(anchor.level_or_period_index)
                .ok()
                .filter(|p| (1..=total).contains(p))
                .unwrap_or_else(|| clock.period.clamp(1, total));
            if anchor.is_running && compute_remaining(&anchor, now_epoch_ms) <= 0.0 {
                if clock.period < total {
                    let from = clock.period;
                    clock.period = from.saturating_add(1);
                    anchor = TimerAnchor::paused(
                        clock.period_length_seconds as f64,
                        clock.period as usize,
                        now_epoch_ms,
                    );
                    transitions.push(Transition::PeriodAdvanced {
                        from,
                        to: clock.period,
                    });
                } else {
                    anchor = TimerAnchor::paused(0.0, clock.period as usize, now_epoch_ms);
                    transitions.push(Transition::GameFinished);
                    finalize = true;
                }
            }
            clock.game_time = display_seconds(compute_remaining(&anchor, now_epoch_ms));
            TimerState::Basketball(clock)
        }
        TimerState::Custom(custom) => {
            let mut clock = custom.clone();
            if anchor.is_running && compute_remaining(&anchor, now_epoch_ms) <= 0.0 {
                anchor = TimerAnchor::paused(0.0, 0, now_epoch_ms);
                transitions.push(Transition::CountdownFinished);
            }
            clock.time_remaining = display_seconds(compute_remaining(&anchor, now_epoch_ms));
            TimerState::Custom(clock)
        }
    };

    Evaluation {
        remaining_seconds: compute_remaining(&anchor, now_epoch_ms),
        settings,
        anchor,
        transitions,
        finalize,
    }
}

/// Re-anchoring operations on the timer of one event.
///
/// Every operation takes the caller's settings snapshot, writes the new
/// anchor to the [`AnchorStore`] and refreshes the snapshot's derived
/// fields in place. Publishing the change to other surfaces is the
/// caller's job.
#[derive(Debug, Clone)]
pub struct CountdownEngine {
    anchors: AnchorStore,
    clock: Arc<dyn Clock>,
}

impl CountdownEngine {
    /// Creates an engine over an anchor store and a clock.
    #[must_use]
    pub fn new(anchors: AnchorStore, clock: Arc<dyn Clock>) -> Self {
        Self { anchors, clock }
    }

    /// Underlying anchor store.
    #[must_use]
    pub const fn anchors(&self) -> &AnchorStore {
        &self.anchors
    }

    /// Current wall-clock reading.
    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.now_epoch_ms()
    }

    /// Current anchor; `None` means the timer has not started.
    #[must_use]
    pub fn anchor(&self) -> Option<TimerAnchor> {
        self.anchors.get()
    }

    /// Remaining seconds now, `None` if the timer has not started.
    #[must_use]
    pub fn remaining(&self) -> Option<f64> {
        self.anchor().map(|a| compute_remaining(&a, self.now()))
    }

    /// Writes a paused anchor positioned where `settings` say the clock is.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the anchor cannot be persisted.
    pub fn initialize(&self, settings: &mut TimerState) -> Result<TimerAnchor, SyncError> {
        let anchor = TimerAnchor::paused(
            settings.snapshot_remaining() as f64,
            settings.anchor_index(),
            self.now(),
        );
        self.commit(settings, anchor)
    }

    /// Starts (or resumes) the countdown. A running clock is left as is.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the anchor cannot be persisted.
    pub fn start(&self, settings: &mut TimerState) -> Result<TimerAnchor, SyncError> {
        let now = self.now();
        let anchor = match self.anchor() {
            Some(anchor) if anchor.is_running => return Ok(anchor),
            Some(anchor) => anchor,
            None => TimerAnchor::paused(
                settings.snapshot_remaining() as f64,
                settings.anchor_index(),
                now,
            ),
        };
        let remaining = compute_remaining(&anchor, now);
        tracing::debug!(event_id = %self.anchors.event_id(), remaining, "countdown started");
        self.commit(
            settings,
            TimerAnchor::running(remaining, anchor.level_or_period_index, now),
        )
    }

    /// Freezes the countdown at the current remaining time.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the anchor cannot be persisted.
    pub fn pause(&self, settings: &mut TimerState) -> Result<TimerAnchor, SyncError> {
        let now = self.now();
        let Some(current) = self.anchor() else {
            return self.initialize(settings);
        };
        // Let an expired level roll over before freezing.
        let evaluation = evaluate(settings, &current, now);
        *settings = evaluation.settings;
        let anchor = TimerAnchor::paused(
            evaluation.remaining_seconds,
            evaluation.anchor.level_or_period_index,
            now,
        );
        tracing::debug!(event_id = %self.anchors.event_id(), remaining = anchor.initial_remaining_seconds, "countdown paused");
        self.commit(settings, anchor)
    }

    /// Jumps a poker clock to blind level `index` with its full duration.
    /// A running clock keeps running.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidRequest`] for non-poker settings or an index
    ///   outside the blind structure.
    /// - [`SyncError::Storage`] if the anchor cannot be persisted.
    pub fn set_level(&self, settings: &mut TimerState, index: usize) -> Result<TimerAnchor, SyncError> {
        let TimerState::Poker(poker) = settings else {
            return Err(SyncError::InvalidRequest(format!(
                "{} timers have no blind levels",
                settings.kind_str()
            )));
        };
        let Some(level) = poker.levels.get(index) else {
            return Err(SyncError::InvalidRequest(format!(
                "blind level {index} out of range ({} levels)",
                poker.levels.len()
            )));
        };
        let length = level.duration_seconds() as f64;
        poker.current_level = index;
        let running = self.anchor().is_some_and(|a| a.is_running);
        let now = self.now();
        let anchor = if running {
            TimerAnchor::running(length, index, now)
        } else {
            TimerAnchor::paused(length, index, now)
        };
        self.commit(settings, anchor)
    }

    /// Moves a basketball clock to `period` (1-based) with a full, stopped
    /// period clock.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidRequest`] for non-basketball settings or a
    ///   period outside `1..=totalPeriods`.
    /// - [`SyncError::Storage`] if the anchor cannot be persisted.
    pub fn set_period(&self, settings: &mut TimerState, period: u32) -> Result<TimerAnchor, SyncError> {
        let TimerState::Basketball(basketball) = settings else {
            return Err(SyncError::InvalidRequest(format!(
                "{} timers have no periods",
                settings.kind_str()
            )));
        };
        if period == 0 || period > basketball.total_periods {
            return Err(SyncError::InvalidRequest(format!(
                "period {period} outside 1..={}",
                basketball.total_periods
            )));
        }
        basketball.period = period;
        let anchor = TimerAnchor::paused(
            basketball.period_length_seconds as f64,
            period as usize,
            self.now(),
        );
        self.commit(settings, anchor)
    }

    /// Overrides the remaining time of the current level, period or
    /// countdown. The running flag is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the anchor cannot be persisted.
    pub fn edit_remaining(&self, settings: &mut TimerState, seconds: u64) -> Result<TimerAnchor, SyncError> {
        let now = self.now();
        let current = match self.anchor() {
            Some(anchor) => evaluate(settings, &anchor, now).anchor,
            None => TimerAnchor::paused(0.0, settings.anchor_index(), now),
        };
        let anchor = TimerAnchor {
            started_at_epoch_ms: now,
            initial_remaining_seconds: seconds as f64,
            ..current
        };
        tracing::debug!(event_id = %self.anchors.event_id(), seconds, "remaining time edited");
        self.commit(settings, anchor)
    }

    /// Rewinds to the first level, first period or full countdown, stopped.
    /// Basketball scores are zeroed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the anchor cannot be persisted.
    pub fn reset(&self, settings: &mut TimerState) -> Result<TimerAnchor, SyncError> {
        match settings {
            TimerState::Poker(p) => {
                p.current_level = 0;
                p.time_remaining = p.levels.first().map_or(0, BlindLevel::duration_seconds);
                p.total_play_time = 0;
            }
            TimerState::Basketball(b) => {
                b.period = 1;
                b.game_time = b.period_length_seconds;
                b.home_score = 0;
                b.away_score = 0;
            }
            TimerState::Custom(c) => c.time_remaining = c.duration,
        }
        self.initialize(settings)
    }

    /// Sets basketball scores. The anchor is untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidRequest`] for non-basketball settings.
    pub fn set_score(&self, settings: &mut TimerState, home: u32, away: u32) -> Result<(), SyncError> {
        let TimerState::Basketball(basketball) = settings else {
            return Err(SyncError::InvalidRequest(format!(
                "{} timers have no score",
                settings.kind_str()
            )));
        };
        basketball.home_score = home;
        basketball.away_score = away;
        Ok(())
    }

    /// Evaluates the current anchor and refreshes `settings`.
    ///
    /// With `persist`, a rolled-over anchor is written back (control
    /// surface). Without it, rollovers are computed locally only (display
    /// surfaces). Returns `None` when the timer has not started.
    pub fn tick(&self, settings: &mut TimerState, persist: bool) -> Option<Evaluation> {
        let anchor = self.anchor()?;
        let evaluation = evaluate(settings, &anchor, self.now());
        settings.clone_from(&evaluation.settings);
        if persist && evaluation.rolled_over() {
            tracing::info!(
                event_id = %self.anchors.event_id(),
                transitions = ?evaluation.transitions,
                "timer rolled over"
            );
            if let Err(e) = self.anchors.set(evaluation.anchor) {
                tracing::warn!(event_id = %self.anchors.event_id(), error = %e, "failed to persist rollover");
            }
        }
        Some(evaluation)
    }

    /// Discards the anchor.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Storage`] if the record cannot be removed.
    pub fn clear(&self) -> Result<(), SyncError> {
        self.anchors.clear()
    }

    fn commit(&self, settings: &mut TimerState, anchor: TimerAnchor) -> Result<TimerAnchor, SyncError> {
        let evaluation = evaluate(settings, &anchor, self.now());
        self.anchors.set(evaluation.anchor)?;
        *settings = evaluation.settings;
        Ok(evaluation.anchor)
    }
}
