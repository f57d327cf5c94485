//! Reconciliation against the canonical record.
//!
//! [`Reconciler::poll_once`] fetches the event, decides what changed and
//! either applies it to the surface cache or hands it to an observer.
//! [`ReconciliationPuller`] runs it on a fixed interval and on demand.
//! The poll is the durable path: signals only make it happen sooner.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::teardown::{EndReason, Teardown};
use crate::client::RecordStore;
use crate::domain::{Event, EventId, EventStatus, TimerState};
use crate::error::SyncError;
use crate::store::EventCache;

/// Which parts of an event differ between two copies.
///
/// Compared by value. Settings are compared on their configuration only:
/// the countdown snapshot fields (`timeRemaining`, `totalPlayTime`,
/// `gameTime`) move on every tick and are derived from the anchor anyway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventDiff {
    /// `tables` (including seats) differ.
    pub tables: bool,
    /// `waitingList` differs.
    pub waiting_list: bool,
    /// Settings configuration differs.
    pub settings: bool,
    /// Status differs.
    pub status: bool,
}

impl EventDiff {
    /// Diffs `fetched` against the last applied copy. With no previous
    /// copy everything counts as changed.
    #[must_use]
    pub fn between(previous: Option<&Event>, fetched: &Event) -> Self {
        let Some(previous) = previous else {
            return Self {
                tables: true,
                waiting_list: true,
                settings: true,
                status: true,
            };
        };
        Self {
            tables: previous.room.tables != fetched.room.tables,
            waiting_list: previous.room.waiting_list != fetched.room.waiting_list,
            settings: configuration(&previous.settings) != configuration(&fetched.settings),
            status: previous.status != fetched.status,
        }
    }

    /// Returns `true` if nothing differs.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !(self.tables || self.waiting_list || self.settings || self.status)
    }

    /// Returns `true` if the room sub-tree differs.
    #[must_use]
    pub const fn room_changed(&self) -> bool {
        self.tables || self.waiting_list
    }
}

/// Settings with the countdown snapshot fields zeroed.
fn configuration(settings: &TimerState) -> TimerState {
    let mut settings = settings.clone();
    match &mut settings {
        TimerState::Poker(p) => {
            p.time_remaining = 0;
            p.total_play_time = 0;
        }
        TimerState::Basketball(b) => b.game_time = 0,
        TimerState::Custom(c) => c.time_remaining = 0,
    }
    settings
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Fetched content equals what the surface already has.
    Unchanged,
    /// The cache was updated.
    Applied(EventDiff),
    /// The record was handed to the observer callback.
    Observed(EventDiff),
    /// The event has ended; teardown ran.
    Ended,
    /// The event no longer exists; teardown ran.
    Deleted,
    /// The fetch failed or returned a malformed record; retried next tick.
    Failed(SyncError),
}

impl PollOutcome {
    /// Returns `true` if polling should stop.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Deleted)
    }
}

/// Callback receiving raw fetched records in [`PullMode::Observe`].
pub type ObserveFn = Arc<dyn Fn(&Event) + Send + Sync>;

/// How fetched records reach the surface.
#[derive(Clone)]
pub enum PullMode {
    /// Replace the cached event whenever content changed.
    Apply,
    /// Leave the cache alone and call back with the raw record.
    Observe(ObserveFn),
}

impl fmt::Debug for PullMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => f.write_str("Apply"),
            Self::Observe(_) => f.write_str("Observe(..)"),
        }
    }
}

/// One-shot reconciliation of a surface against the record store.
#[derive(Debug)]
pub struct Reconciler {
    event_id: EventId,
    store: Arc<dyn RecordStore>,
    cache: EventCache,
    mode: PullMode,
    teardown: Teardown,
    last_observed: Mutex<Option<Event>>,
}

impl Reconciler {
    /// Creates a reconciler for the cache's event.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: EventCache,
        mode: PullMode,
        teardown: Teardown,
    ) -> Self {
        Self {
            event_id: cache.event_id(),
            store,
            cache,
            mode,
            teardown,
            last_observed: Mutex::new(None),
        }
    }

    /// Event being reconciled.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Fetches the canonical event once and acts on it.
    ///
    /// Not-found and `ENDED` run teardown immediately. Other failures are
    /// logged and reported; the cache is left untouched.
    pub async fn poll_once(&self) -> PollOutcome {
        let event_id = self.event_id;
        if self.teardown.is_done() {
            return PollOutcome::Ended;
        }
        let event = match self.store.get_event(event_id).await {
            Ok(event) => event,
            Err(e) if e.is_not_found() => {
                tracing::info!(%event_id, "event deleted from record store");
                self.teardown.run(EndReason::Deleted);
                return PollOutcome::Deleted;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!(%event_id, error = %e, "poll failed; retrying next tick");
                } else {
                    tracing::warn!(%event_id, error = %e, "poll returned unusable record; ignoring");
                }
                return PollOutcome::Failed(e);
            }
        };
        if event.status == EventStatus::Ended {
            self.teardown.run(EndReason::EndedRemotely);
            return PollOutcome::Ended;
        }

        match &self.mode {
            PullMode::Apply => {
                let diff = EventDiff::between(self.cache.event().as_ref(), &event);
                if diff.is_empty() {
                    tracing::trace!(%event_id, "poll unchanged");
                    return PollOutcome::Unchanged;
                }
                tracing::debug!(%event_id, ?diff, "applying canonical event");
                self.cache.set_event(event);
                PollOutcome::Applied(diff)
            }
            PullMode::Observe(callback) => {
                let diff = {
                    let mut last = self.last_observed.lock();
                    let diff = EventDiff::between(last.as_ref(), &event);
                    if !diff.is_empty() {
                        *last = Some(event.clone());
                    }
                    diff
                };
                if diff.is_empty() {
                    return PollOutcome::Unchanged;
                }
                callback(&event);
                PollOutcome::Observed(diff)
            }
        }
    }
}

/// Background task running a [`Reconciler`] on an interval.
#[derive(Debug)]
pub struct ReconciliationPuller;

impl ReconciliationPuller {
    /// Spawns the poll loop.
    ///
    /// The first poll runs immediately. Missed ticks are delayed rather
    /// than burst. The loop exits when `cancel` fires, when a poll is
    /// terminal, or when the returned handle is dropped.
    #[must_use]
    pub fn spawn(
        reconciler: Arc<Reconciler>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> PullerHandle {
        let trigger = Arc::new(Notify::new());
        let cancel = cancel.child_token();
        let task = tokio::spawn(run(
            reconciler,
            interval,
            Arc::clone(&trigger),
            cancel.clone(),
        ));
        PullerHandle {
            trigger,
            cancel,
            task,
        }
    }
}

async fn run(
    reconciler: Arc<Reconciler>,
    interval: Duration,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
) {
    let event_id = reconciler.event_id();
    tracing::debug!(%event_id, interval_ms = interval.as_millis(), "reconciliation puller started");
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            () = trigger.notified() => {}
        }
        let outcome = tokio::select! {
            () = cancel.cancelled() => break,
            outcome = reconciler.poll_once() => outcome,
        };
        if outcome.is_terminal() {
            break;
        }
    }

    tracing::debug!(%event_id, "reconciliation puller stopped");
}

/// Handle on a running [`ReconciliationPuller`]. Dropping it stops the loop.
#[derive(Debug)]
pub struct PullerHandle {
    trigger: Arc<Notify>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PullerHandle {
    /// Requests a poll now instead of waiting for the next tick.
    pub fn poll_now(&self) {
        self.trigger.notify_one();
    }

    /// Stops the loop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "reconciliation puller task failed");
        }
    }
}

impl Drop for PullerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::{CustomClock, EventPatch, EventRegistry};
    use crate::store::{AnchorStore, KeyValueStore, MemoryStore};

    struct Fixture {
        registry: Arc<EventRegistry>,
        cache: EventCache,
        teardown: Teardown,
        event_id: EventId,
    }

    async fn fixture() -> Fixture {
        let registry = Arc::new(EventRegistry::new());
        let event = Event::scheduled("c", TimerState::Custom(CustomClock::new(60)));
        let event_id = event.id;
        let _ = registry.insert(event).await;
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let cache = EventCache::new(Arc::clone(&kv), event_id);
        let anchors = AnchorStore::open(Arc::clone(&kv), event_id);
        let teardown = Teardown::new(cache.clone(), anchors, kv, CancellationToken::new());
        Fixture {
            registry,
            cache,
            teardown,
            event_id,
        }
    }

    fn reconciler(f: &Fixture, mode: PullMode) -> Reconciler {
        Reconciler::new(
            Arc::clone(&f.registry) as Arc<dyn RecordStore>,
            f.cache.clone(),
            mode,
            f.teardown.clone(),
        )
    }

    #[test]
    fn diff_ignores_countdown_snapshot() {
        let event = Event::scheduled("c", TimerState::Custom(CustomClock::new(60)));
        let mut ticked = event.clone();
        ticked.settings = TimerState::Custom(CustomClock {
            duration: 60,
            time_remaining: 12,
        });
        assert!(EventDiff::between(Some(&event), &ticked).is_empty());

        let mut edited = event.clone();
        edited.settings = TimerState::Custom(CustomClock::new(90));
        let diff = EventDiff::between(Some(&event), &edited);
        assert!(diff.settings);
        assert!(!diff.room_changed());
    }

    #[tokio::test]
    async fn same_record_twice_is_a_no_op() {
        let f = fixture().await;
        let r = reconciler(&f, PullMode::Apply);
        assert!(matches!(r.poll_once().await, PollOutcome::Applied(_)));
        let revision = f.cache.revision();
        assert_eq!(r.poll_once().await, PollOutcome::Unchanged);
        assert_eq!(f.cache.revision(), revision);
    }

    #[tokio::test]
    async fn room_change_is_applied_with_diff() {
        let f = fixture().await;
        let r = reconciler(&f, PullMode::Apply);
        let _ = r.poll_once().await;
        let _ = f
            .registry
            .add_waitlist_entry(f.event_id, uuid::Uuid::new_v4(), "Cy")
            .await;
        let PollOutcome::Applied(diff) = r.poll_once().await else {
            panic!("expected applied outcome");
        };
        assert!(diff.waiting_list);
        assert!(!diff.tables);
        assert_eq!(f.cache.room().waiting_list.len(), 1);
    }

    #[tokio::test]
    async fn deleted_event_tears_down() {
        let f = fixture().await;
        let r = reconciler(&f, PullMode::Apply);
        let _ = r.poll_once().await;
        let _ = f.registry.remove(f.event_id).await;
        assert_eq!(r.poll_once().await, PollOutcome::Deleted);
        assert!(f.teardown.is_done());
        assert!(f.cache.event().is_none());
    }

    #[tokio::test]
    async fn ended_event_tears_down() {
        let f = fixture().await;
        let r = reconciler(&f, PullMode::Apply);
        let patch = EventPatch {
            status: Some(EventStatus::Ended),
            ..EventPatch::default()
        };
        let _ = f.registry.update_event(f.event_id, patch).await;
        assert_eq!(r.poll_once().await, PollOutcome::Ended);
        assert!(f.teardown.is_done());
        assert_eq!(r.poll_once().await, PollOutcome::Ended);
    }

    #[tokio::test]
    async fn observe_mode_leaves_cache_alone() {
        let f = fixture().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let r = reconciler(
            &f,
            PullMode::Observe(Arc::new(move |_event: &Event| {
                seen.fetch_add(1, Ordering::SeqCst);
            })),
        );
        assert!(matches!(r.poll_once().await, PollOutcome::Observed(_)));
        assert_eq!(r.poll_once().await, PollOutcome::Unchanged);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(f.cache.event().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn puller_polls_on_interval_and_stops_on_teardown() {
        let f = fixture().await;
        let r = Arc::new(reconciler(&f, PullMode::Apply));
        let handle = ReconciliationPuller::spawn(
            Arc::clone(&r),
            Duration::from_millis(3000),
            f.teardown.cancel_token(),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(f.cache.event().is_some());

        let _ = f
            .registry
            .add_waitlist_entry(f.event_id, uuid::Uuid::new_v4(), "Di")
            .await;
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(f.cache.room().waiting_list.len(), 1);

        f.teardown.run(EndReason::Manual);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_now_skips_the_wait() {
        let f = fixture().await;
        let r = Arc::new(reconciler(&f, PullMode::Apply));
        let handle = ReconciliationPuller::spawn(
            Arc::clone(&r),
            Duration::from_secs(60),
            CancellationToken::new(),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = f
            .registry
            .add_waitlist_entry(f.event_id, uuid::Uuid::new_v4(), "Ed")
            .await;
        handle.poll_now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.cache.room().waiting_list.len(), 1);
        handle.shutdown().await;
    }
}
