//! # tableclock
//!
//! Multi-surface synchronization engine for tournament and game clocks.
//!
//! One operator ("control") surface and any number of audience ("display")
//! surfaces follow the same event. Every surface derives the countdown from
//! a shared [`domain::TimerAnchor`] instead of ticking a shared value, wakes
//! its peers through a same-profile signal channel, and reconciles tables,
//! seats and the waiting list against a canonical record store by polling.
//!
//! ## Architecture
//!
//! ```text
//! Surface (service/)                 control | display
//!     │
//!     ├── CountdownEngine (engine/)   anchor -> remaining, rollover
//!     ├── EventCache, AnchorStore (store/)
//!     ├── SignalChannel (domain/)     same-profile hints
//!     ├── ReconciliationPuller, RoomStateManager, EventLifecycle (service/)
//!     │
//!     └── RecordStore (client/)
//!             ├── HttpRecordStore ── REST ──> api/ (reference server)
//!             └── EventRegistry (in process)
//! ```

pub mod api;
pub mod app_state;
pub mod client;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod service;
pub mod store;
