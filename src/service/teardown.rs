//! End-of-event teardown for one surface.
//!
//! Clearing caches and anchors, dropping the active-event marker and
//! cancelling every background task of the surface happens exactly once,
//! however many paths (operator, poll, signal, rollover) race to trigger it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::domain::EventId;
use crate::store::kv::read_json;
use crate::store::{ACTIVE_EVENT_KEY, AnchorStore, EventCache, KeyValueStore};

/// Why a surface stopped following its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The operator ended the event on this surface.
    Manual,
    /// The last basketball period expired.
    Finalized,
    /// Another surface or the record store reported the event as ended.
    EndedRemotely,
    /// The record store no longer has the event.
    Deleted,
    /// The surface was closed; the event itself may still be running.
    Closed,
}

impl EndReason {
    /// Short lowercase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Finalized => "finalized",
            Self::EndedRemotely => "ended_remotely",
            Self::Deleted => "deleted",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a surface as seen by whatever renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// Following the event.
    Active,
    /// Torn down; the renderer should leave the event view.
    Ended {
        /// First reason that triggered teardown.
        reason: EndReason,
    },
}

#[derive(Debug)]
struct Inner {
    done: AtomicBool,
    event_id: EventId,
    cache: EventCache,
    anchors: AnchorStore,
    kv: Arc<dyn KeyValueStore>,
    cancel: CancellationToken,
    status: watch::Sender<SurfaceStatus>,
}

/// Idempotent teardown shared by every task of a surface.
#[derive(Debug, Clone)]
pub struct Teardown {
    inner: Arc<Inner>,
}

impl Teardown {
    /// Creates the teardown for a surface. `cancel` is the surface's root
    /// token; background tasks should run on child tokens of it.
    #[must_use]
    pub fn new(
        cache: EventCache,
        anchors: AnchorStore,
        kv: Arc<dyn KeyValueStore>,
        cancel: CancellationToken,
    ) -> Self {
        let (status, _) = watch::channel(SurfaceStatus::Active);
        Self {
            inner: Arc::new(Inner {
                done: AtomicBool::new(false),
                event_id: cache.event_id(),
                cache,
                anchors,
                kv,
                cancel,
                status,
            }),
        }
    }

    /// Runs the teardown. Returns `true` for the call that did the work;
    /// every later call is a no-op returning `false`.
    ///
    /// [`EndReason::Closed`] only stops the surface's tasks: the cache
    /// snapshot, the anchor and the active-event marker are shared with
    /// other surfaces of a running event and stay in place.
    pub fn run(&self, reason: EndReason) -> bool {
        if self.inner.done.swap(true, Ordering::SeqCst) {
            tracing::debug!(event_id = %self.inner.event_id, %reason, "teardown already done");
            return false;
        }
        let event_id = self.inner.event_id;
        self.inner.cancel.cancel();
        if reason != EndReason::Closed {
            self.inner.cache.clear();
            if let Err(e) = self.inner.anchors.clear() {
                tracing::warn!(%event_id, error = %e, "failed to clear timer anchor");
            }
            let active: Option<EventId> = read_json(self.inner.kv.as_ref(), ACTIVE_EVENT_KEY);
            if active == Some(event_id)
                && let Err(e) = self.inner.kv.remove(ACTIVE_EVENT_KEY)
            {
                tracing::warn!(%event_id, error = %e, "failed to clear active event");
            }
        }
        self.inner.status.send_replace(SurfaceStatus::Ended { reason });
        tracing::info!(%event_id, %reason, "surface torn down");
        true
    }

    /// Returns `true` once teardown has run.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::SeqCst)
    }

    /// Root token cancelled by teardown.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SurfaceStatus {
        *self.inner.status.borrow()
    }

    /// Receiver notified when the surface ends.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SurfaceStatus> {
        self.inner.status.subscribe()
    }
}
