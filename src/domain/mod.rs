//! Domain layer: events, timer settings, room state and the signal system.
//!
//! This module holds the data model shared by every surface and by the
//! reference record store: event identity and lifecycle, the tagged timer
//! settings and anchors, tables/seats/waitlist with their pure operations,
//! the signal taxonomy and channel, and the in-memory event registry.

pub mod event;
pub mod event_id;
pub mod event_registry;
pub mod room;
pub mod signal;
pub mod signal_bus;
pub mod timer;

pub use event::{Event, EventPatch, EventStatus, EventSummary, EventType, Winner};
pub use event_id::EventId;
pub use event_registry::EventRegistry;
pub use room::{RoomState, SEATS_PER_TABLE, Seat, Table, WAITLIST_BASE, WaitlistEntry};
pub use signal::{SIGNAL_TOPIC, SignalHint, SignalKind, SignalMessage, SourceTag};
pub use signal_bus::{SignalChannel, SignalEndpoint, SignalSubscription};
pub use timer::{BasketballClock, BlindLevel, CustomClock, PokerClock, TimerAnchor, TimerState};
