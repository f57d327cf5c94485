//! `SCHEDULED -> ACTIVE -> ENDED` driven from the control surface.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use super::teardown::{EndReason, Teardown};
use crate::client::RecordStore;
use crate::domain::{
    Event, EventId, EventPatch, EventStatus, EventSummary, SignalEndpoint, SignalHint, SignalKind,
};
use crate::engine::CountdownEngine;
use crate::error::SyncError;
use crate::store::kv::{read_json, write_json};
use crate::store::{ACTIVE_EVENT_KEY, EventCache, KeyValueStore};

/// Event id recorded by the last activation on this profile, if any.
///
/// Display surfaces use it to find the event to follow.
#[must_use]
pub fn active_event(kv: &dyn KeyValueStore) -> Option<EventId> {
    read_json(kv, ACTIVE_EVENT_KEY)
}

/// Activation and ending of one event.
#[derive(Debug, Clone)]
pub struct EventLifecycle {
    event_id: EventId,
    store: Arc<dyn RecordStore>,
    engine: CountdownEngine,
    cache: EventCache,
    signals: SignalEndpoint,
    kv: Arc<dyn KeyValueStore>,
    teardown: Teardown,
    ending: Arc<AtomicBool>,
}

impl EventLifecycle {
    /// Creates the lifecycle for the cache's event.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        engine: CountdownEngine,
        cache: EventCache,
        signals: SignalEndpoint,
        kv: Arc<dyn KeyValueStore>,
        teardown: Teardown,
    ) -> Self {
        Self {
            event_id: cache.event_id(),
            store,
            engine,
            cache,
            signals,
            kv,
            teardown,
            ending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `SCHEDULED -> ACTIVE`.
    ///
    /// Marks the event active in the record store, writes the initial
    /// (paused) anchor, records the event as this profile's active event
    /// and wakes the other surfaces. Re-activating an active event keeps
    /// an existing anchor, so a reloaded control surface resumes where it
    /// was.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidTransition`] if the event has ended.
    /// - Record-store errors from the status update.
    /// - [`SyncError::Storage`] if the anchor or marker cannot be written.
    pub async fn activate(&self) -> Result<Event, SyncError> {
        let event_id = self.event_id;
        if self.teardown.is_done() {
            return Err(SyncError::InvalidTransition {
                from: EventStatus::Ended.to_string(),
                to: EventStatus::Active.to_string(),
            });
        }
        let patch = EventPatch {
            status: Some(EventStatus::Active),
            ..EventPatch::default()
        };
        let mut event = self.store.update_event(event_id, patch).await?;
        if event.status != EventStatus::Active {
            return Err(SyncError::InvalidTransition {
                from: event.status.to_string(),
                to: EventStatus::Active.to_string(),
            });
        }

        let anchor = match self.engine.anchor() {
            Some(anchor) => anchor,
            None => self.engine.initialize(&mut event.settings)?,
        };
        write_json(self.kv.as_ref(), ACTIVE_EVENT_KEY, &event_id)?;
        self.cache.set_event(event.clone());
        self.signals.notify(
            SignalKind::TimerUpdate,
            event_id,
            Some(SignalHint::Anchor { anchor }),
        );
        tracing::info!(%event_id, kind = event.settings.kind_str(), "event activated");
        Ok(event)
    }

    /// `ACTIVE -> ENDED` on operator request.
    ///
    /// Returns the persisted summary, or `None` if the surface was already
    /// torn down.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EventNotFound`] only if there is no cached
    /// record and the record store no longer has the event.
    pub async fn end(&self) -> Result<Option<EventSummary>, SyncError> {
        self.finish(EndReason::Manual).await
    }

    /// `ACTIVE -> ENDED` after the final basketball period expired.
    ///
    /// # Errors
    ///
    /// Same as [`Self::end`].
    pub async fn finalize(&self) -> Result<Option<EventSummary>, SyncError> {
        self.finish(EndReason::Finalized).await
    }

    async fn finish(&self, reason: EndReason) -> Result<Option<EventSummary>, SyncError> {
        let event_id = self.event_id;
        // Only the first caller ends the event; a racing end or finalize
        // sees the claim and returns.
        if self.teardown.is_done() || self.ending.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        let mut settings = match self.cache.settings() {
            Some(settings) => settings,
            None => match self.store.get_event(event_id).await {
                Ok(event) => event.settings,
                Err(e) => {
                    self.ending.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            },
        };
        if let Err(e) = self.engine.pause(&mut settings) {
            tracing::warn!(%event_id, error = %e, "failed to stop timer before ending");
        }
        let summary = EventSummary::from_settings(&settings);
        let ended_at = DateTime::from_timestamp_millis(self.engine.now()).unwrap_or_else(Utc::now);
        let patch = EventPatch {
            status: Some(EventStatus::Ended),
            settings: Some(settings),
            ended_at: Some(ended_at),
            summary: Some(summary.clone()),
        };
        // The local surface ends regardless; the next poll or operator
        // action reconciles the record store.
        if let Err(e) = self.store.update_event(event_id, patch).await {
            tracing::warn!(%event_id, error = %e, "failed to persist end of event");
        }
        self.signals.notify(SignalKind::EndEvent, event_id, None);
        if self.teardown.run(reason) {
            tracing::info!(%event_id, %reason, ?summary, "event ended");
        }
        Ok(Some(summary))
    }
}
