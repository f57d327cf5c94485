//! Runtime composition of a control or display surface.
//!
//! A [`Surface`] owns three background tasks, all bound to the surface's
//! cancellation token:
//!
//! - a fine tick that re-derives the clock from the anchor and publishes a
//!   [`ClockView`];
//! - the [`ReconciliationPuller`];
//! - a signal listener that re-reads the anchor store or triggers an early
//!   poll when another surface announces a change.
//!
//! The control surface persists rollovers and drives the lifecycle. Display
//! surfaces evaluate rollovers locally without writing and observe the
//! canonical record instead of applying it wholesale.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::lifecycle::EventLifecycle;
use super::reconciler::{ObserveFn, PullMode, PullerHandle, ReconciliationPuller, Reconciler};
use super::room_service::RoomStateManager;
use super::teardown::{EndReason, SurfaceStatus, Teardown};
use crate::client::RecordStore;
use crate::domain::{
    Event, EventId, EventPatch, EventSummary, SignalChannel, SignalEndpoint, SignalHint,
    SignalKind, SignalSubscription, TimerAnchor, TimerState,
};
use crate::engine::{Clock, CountdownEngine, Evaluation, Transition};
use crate::error::SyncError;
use crate::store::{AnchorStore, EventCache, KeyValueStore};

/// Which side of the room a surface serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRole {
    /// Operator view: owns timer writes and the lifecycle.
    Control,
    /// Audience view: read-only.
    Display,
}

/// Timer cadences of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceOptions {
    /// Clock re-derivation interval.
    pub tick_interval: Duration,
    /// Reconciliation poll interval.
    pub poll_interval: Duration,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            poll_interval: Duration::from_millis(3000),
        }
    }
}

/// Collaborators shared by every surface of one profile.
#[derive(Debug, Clone)]
pub struct SurfaceContext {
    /// Canonical record store.
    pub store: Arc<dyn RecordStore>,
    /// Local persisted key-value store.
    pub kv: Arc<dyn KeyValueStore>,
    /// Same-profile signal channel.
    pub signals: SignalChannel,
    /// Wall clock.
    pub clock: Arc<dyn Clock>,
    /// Tick and poll cadences.
    pub options: SurfaceOptions,
}

/// What a surface renders on each tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClockView {
    /// `false` until an anchor exists ("timer not started").
    pub started: bool,
    /// Whether the countdown is running.
    pub running: bool,
    /// Whole seconds left in the current level, period or countdown.
    pub remaining_seconds: u64,
    /// Settings with derived fields current for this tick.
    pub settings: Option<TimerState>,
}

/// A running control or display surface for one event.
///
/// Must be opened inside a tokio runtime. Dropping the surface cancels its
/// tasks; [`Surface::shutdown`] additionally waits for them.
#[derive(Debug)]
pub struct Surface {
    role: SurfaceRole,
    event_id: EventId,
    store: Arc<dyn RecordStore>,
    cache: EventCache,
    engine: CountdownEngine,
    rooms: RoomStateManager,
    lifecycle: EventLifecycle,
    signals: SignalEndpoint,
    teardown: Teardown,
    view: watch::Receiver<ClockView>,
    puller: Arc<PullerHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Surface {
    /// Opens a surface on `event_id` and starts its background tasks.
    ///
    /// The cache is seeded from the persisted room snapshot, so something
    /// renders before the first poll completes.
    #[must_use]
    pub fn open(role: SurfaceRole, event_id: EventId, ctx: &SurfaceContext) -> Self {
        let cache = EventCache::restore(Arc::clone(&ctx.kv), event_id);
        let anchors = AnchorStore::open(Arc::clone(&ctx.kv), event_id);
        let engine = CountdownEngine::new(anchors.clone(), Arc::clone(&ctx.clock));
        let cancel = CancellationToken::new();
        let teardown = Teardown::new(cache.clone(), anchors, Arc::clone(&ctx.kv), cancel.clone());
        let signals = ctx.signals.endpoint();
        let lifecycle = EventLifecycle::new(
            Arc::clone(&ctx.store),
            engine.clone(),
            cache.clone(),
            signals.clone(),
            Arc::clone(&ctx.kv),
            teardown.clone(),
        );
        let rooms = RoomStateManager::new(Arc::clone(&ctx.store), cache.clone());

        let mode = match role {
            SurfaceRole::Control => PullMode::Apply,
            SurfaceRole::Display => PullMode::Observe(merge_displayed(cache.clone())),
        };
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&ctx.store),
            cache.clone(),
            mode,
            teardown.clone(),
        ));
        let puller = Arc::new(ReconciliationPuller::spawn(
            reconciler,
            ctx.options.poll_interval,
            cancel.clone(),
        ));

        let (view_tx, view) = watch::channel(ClockView::default());
        let ticker = Ticker {
            role,
            event_id,
            store: Arc::clone(&ctx.store),
            cache: cache.clone(),
            engine: engine.clone(),
            lifecycle: lifecycle.clone(),
            signals: signals.clone(),
            view: view_tx,
            reload_every: reload_every(ctx.options),
        };
        let tick_task = tokio::spawn(ticker.run(ctx.options.tick_interval, cancel.child_token()));
        let listen_task = tokio::spawn(listen(
            signals.subscribe(Some(event_id)),
            engine.clone(),
            teardown.clone(),
            Arc::clone(&puller),
            cancel.child_token(),
        ));

        tracing::info!(%event_id, ?role, "surface opened");
        Self {
            role,
            event_id,
            store: Arc::clone(&ctx.store),
            cache,
            engine,
            rooms,
            lifecycle,
            signals,
            teardown,
            view,
            puller,
            tasks: vec![tick_task, listen_task],
        }
    }

    /// Surface role.
    #[must_use]
    pub const fn role(&self) -> SurfaceRole {
        self.role
    }

    /// Event followed by this surface.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Surface-local cache.
    #[must_use]
    pub const fn cache(&self) -> &EventCache {
        &self.cache
    }

    /// Countdown engine over this surface's anchor store.
    #[must_use]
    pub const fn engine(&self) -> &CountdownEngine {
        &self.engine
    }

    /// Room manager; `None` on display surfaces.
    #[must_use]
    pub fn rooms(&self) -> Option<&RoomStateManager> {
        match self.role {
            SurfaceRole::Control => Some(&self.rooms),
            SurfaceRole::Display => None,
        }
    }

    /// Receiver of per-tick clock views.
    #[must_use]
    pub fn view(&self) -> watch::Receiver<ClockView> {
        self.view.clone()
    }

    /// Receiver notified when the surface ends.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<SurfaceStatus> {
        self.teardown.subscribe()
    }

    /// Returns `true` once the surface has been torn down.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.teardown.is_done()
    }

    /// Requests an immediate reconciliation poll.
    pub fn refresh(&self) {
        self.puller.poll_now();
    }

    /// Activates the event. Control surfaces only.
    ///
    /// # Errors
    ///
    /// See [`EventLifecycle::activate`]; [`SyncError::InvalidRequest`] on a
    /// display surface.
    pub async fn activate(&self) -> Result<Event, SyncError> {
        self.ensure_control()?;
        self.lifecycle.activate().await
    }

    /// Ends the event. Control surfaces only.
    ///
    /// # Errors
    ///
    /// See [`EventLifecycle::end`]; [`SyncError::InvalidRequest`] on a
    /// display surface.
    pub async fn end(&self) -> Result<Option<EventSummary>, SyncError> {
        self.ensure_control()?;
        self.lifecycle.end().await
    }

    /// Starts or resumes the countdown.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidRequest`] on a display surface or before the
    /// event is loaded; [`SyncError::Storage`] if the anchor cannot be
    /// written.
    pub async fn start(&self) -> Result<TimerAnchor, SyncError> {
        self.operate(SignalKind::TimerUpdate, CountdownEngine::start).await
    }

    /// Pauses the countdown.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start`].
    pub async fn pause(&self) -> Result<TimerAnchor, SyncError> {
        self.operate(SignalKind::TimerUpdate, CountdownEngine::pause).await
    }

    /// Jumps to blind level `index`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start`], plus [`CountdownEngine::set_level`] errors.
    pub async fn set_level(&self, index: usize) -> Result<TimerAnchor, SyncError> {
        self.operate(SignalKind::TimerUpdate, |engine, settings| {
            engine.set_level(settings, index)
        })
        .await
    }

    /// Moves to basketball `period`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start`], plus [`CountdownEngine::set_period`] errors.
    pub async fn set_period(&self, period: u32) -> Result<TimerAnchor, SyncError> {
        self.operate(SignalKind::PeriodChange, |engine, settings| {
            engine.set_period(settings, period)
        })
        .await
    }

    /// Overrides the remaining time.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start`].
    pub async fn edit_remaining(&self, seconds: u64) -> Result<TimerAnchor, SyncError> {
        self.operate(SignalKind::TimerUpdate, |engine, settings| {
            engine.edit_remaining(settings, seconds)
        })
        .await
    }

    /// Rewinds the timer to its start.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start`].
    pub async fn reset(&self) -> Result<TimerAnchor, SyncError> {
        self.operate(SignalKind::TimerUpdate, CountdownEngine::reset).await
    }

    /// Sets basketball scores.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start`], plus [`CountdownEngine::set_score`] errors.
    pub async fn set_score(&self, home: u32, away: u32) -> Result<(), SyncError> {
        self.operate(SignalKind::ScoreUpdate, |engine, settings| {
            engine.set_score(settings, home, away)
        })
        .await
    }

    /// Stops all tasks and waits for them. The event itself is untouched.
    pub async fn shutdown(mut self) {
        self.teardown.run(EndReason::Closed);
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::warn!(event_id = %self.event_id, error = %e, "surface task failed");
            }
        }
    }

    fn ensure_control(&self) -> Result<(), SyncError> {
        match self.role {
            SurfaceRole::Control => Ok(()),
            SurfaceRole::Display => Err(SyncError::InvalidRequest(
                "display surfaces are read-only".to_string(),
            )),
        }
    }

    /// Runs a timer operation on the cached settings, then announces and
    /// persists the result.
    async fn operate<T>(
        &self,
        kind: SignalKind,
        op: impl FnOnce(&CountdownEngine, &mut TimerState) -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        self.ensure_control()?;
        if self.teardown.is_done() {
            return Err(SyncError::Conflict("surface has ended".to_string()));
        }
        let mut settings = self
            .cache
            .settings()
            .ok_or_else(|| SyncError::InvalidRequest("event not loaded yet".to_string()))?;
        let output = op(&self.engine, &mut settings)?;
        self.cache.set_settings(settings.clone());
        let hint = hint_for(kind, &settings, self.engine.anchor());
        self.signals.notify(kind, self.event_id, hint);
        push_settings(self.store.as_ref(), self.event_id, settings).await;
        Ok(output)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.teardown.cancel_token().cancel();
    }
}

fn hint_for(
    kind: SignalKind,
    settings: &TimerState,
    anchor: Option<TimerAnchor>,
) -> Option<SignalHint> {
    match (kind, settings) {
        (SignalKind::ScoreUpdate, TimerState::Basketball(b)) => Some(SignalHint::Score {
            home_score: b.home_score,
            away_score: b.away_score,
        }),
        (SignalKind::PeriodChange, TimerState::Basketball(b)) => {
            Some(SignalHint::Period { period: b.period })
        }
        _ => anchor.map(|anchor| SignalHint::Anchor { anchor }),
    }
}

/// Patches the record store with new settings. Failures are logged; the
/// next poll reconciles.
async fn push_settings(store: &dyn RecordStore, event_id: EventId, settings: TimerState) {
    let patch = EventPatch {
        settings: Some(settings),
        ..EventPatch::default()
    };
    if let Err(e) = store.update_event(event_id, patch).await {
        tracing::warn!(%event_id, error = %e, "failed to persist timer settings");
    }
}

/// Number of ticks between anchor re-reads on display surfaces, so a
/// dropped signal is caught up within one poll interval.
fn reload_every(options: SurfaceOptions) -> u64 {
    let tick = options.tick_interval.as_millis().max(1);
    let ratio = options.poll_interval.as_millis() / tick;
    u64::try_from(ratio).unwrap_or(u64::MAX).max(1)
}

/// Observer used by display surfaces: merges only the settings and room
/// sub-trees into the cache.
fn merge_displayed(cache: EventCache) -> ObserveFn {
    Arc::new(move |event: &Event| {
        let Some(current) = cache.event() else {
            cache.set_event(event.clone());
            return;
        };
        if current.room != event.room {
            cache.set_room(event.room.clone());
        }
        if current.settings != event.settings {
            cache.set_settings(event.settings.clone());
        }
    })
}

struct Ticker {
    role: SurfaceRole,
    event_id: EventId,
    store: Arc<dyn RecordStore>,
    cache: EventCache,
    engine: CountdownEngine,
    lifecycle: EventLifecycle,
    signals: SignalEndpoint,
    view: watch::Sender<ClockView>,
    reload_every: u64,
}

impl Ticker {
    async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            ticks = ticks.wrapping_add(1);
            if self.role == SurfaceRole::Display && ticks % self.reload_every == 0 {
                self.engine.anchors().reload();
            }
            self.tick().await;
        }
        tracing::debug!(event_id = %self.event_id, "tick loop stopped");
    }

    async fn tick(&self) {
        let Some(mut settings) = self.cache.settings() else {
            self.view.send_if_modified(|view| {
                let idle = ClockView::default();
                if *view == idle {
                    false
                } else {
                    *view = idle;
                    true
                }
            });
            return;
        };
        let persist = self.role == SurfaceRole::Control;
        let Some(evaluation) = self.engine.tick(&mut settings, persist) else {
            self.view.send_replace(ClockView {
                started: false,
                running: false,
                remaining_seconds: settings.snapshot_remaining(),
                settings: Some(settings),
            });
            return;
        };
        tracing::trace!(event_id = %self.event_id, remaining = evaluation.remaining_seconds, "tick");
        self.view.send_replace(ClockView {
            started: true,
            running: evaluation.anchor.is_running,
            remaining_seconds: evaluation.display_remaining(),
            settings: Some(settings.clone()),
        });
        if persist && evaluation.rolled_over() {
            self.announce_rollover(&evaluation, settings).await;
        }
    }

    async fn announce_rollover(&self, evaluation: &Evaluation, settings: TimerState) {
        let event_id = self.event_id;
        self.cache.set_settings(settings.clone());
        self.signals.notify(
            SignalKind::TimerUpdate,
            event_id,
            Some(SignalHint::Anchor {
                anchor: evaluation.anchor,
            }),
        );
        for transition in &evaluation.transitions {
            if let Transition::PeriodAdvanced { to, .. } = transition {
                self.signals.notify(
                    SignalKind::PeriodChange,
                    event_id,
                    Some(SignalHint::Period { period: *to }),
                );
            }
        }
        if evaluation.finalize {
            if let Err(e) = self.lifecycle.finalize().await {
                tracing::warn!(%event_id, error = %e, "automatic finalization failed");
            }
            return;
        }
        push_settings(self.store.as_ref(), event_id, settings).await;
    }
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("role", &self.role)
            .field("event_id", &self.event_id)
            .finish_non_exhaustive()
    }
}

async fn listen(
    mut subscription: SignalSubscription,
    engine: CountdownEngine,
    teardown: Teardown,
    puller: Arc<PullerHandle>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break,
            message = subscription.recv() => message,
        };
        let Some(message) = message else {
            break;
        };
        tracing::trace!(event_id = %message.event_id, kind = message.kind.as_str(), "signal received");
        match message.kind {
            SignalKind::TimerUpdate => {
                engine.anchors().reload();
            }
            SignalKind::PeriodChange => {
                engine.anchors().reload();
                puller.poll_now();
            }
            SignalKind::ScoreUpdate => puller.poll_now(),
            SignalKind::EndEvent => {
                teardown.run(EndReason::EndedRemotely);
                break;
            }
        }
    }
}
