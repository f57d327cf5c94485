//! Service layer: per-surface orchestration.
//!
//! A [`Surface`] wires the countdown engine, the [`EventCache`], the
//! [`ReconciliationPuller`], the [`RoomStateManager`] and the
//! [`EventLifecycle`] together for one event, and tears them down through a
//! shared [`Teardown`] when the event ends.
//!
//! [`EventCache`]: crate::store::EventCache

pub mod lifecycle;
pub mod reconciler;
pub mod room_service;
pub mod surface;
pub mod teardown;

pub use lifecycle::{EventLifecycle, active_event};
pub use reconciler::{
    EventDiff, ObserveFn, PollOutcome, PullMode, PullerHandle, ReconciliationPuller, Reconciler,
};
pub use room_service::RoomStateManager;
pub use surface::{ClockView, Surface, SurfaceContext, SurfaceOptions, SurfaceRole};
pub use teardown::{EndReason, SurfaceStatus, Teardown};
