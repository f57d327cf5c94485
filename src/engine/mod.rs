//! Countdown Engine: remaining-time derivation, rollover and re-anchoring.

pub mod clock;
pub mod countdown;

pub use clock::{Clock, ManualClock, SystemClock};
pub use countdown::{
    CountdownEngine, Evaluation, Transition, compute_remaining, display_seconds, evaluate,
};
