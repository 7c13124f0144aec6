//! Debounced, single-flight auto-save for one editing session.
//!
//! A session turns a rapid stream of snapshot updates into a serialized
//! sequence of persistence calls:
//!
//! - **Debounce**: every [`update`] re-arms a quiet-period deadline; only
//!   the snapshot current when the deadline elapses is considered.
//! - **Change detection**: a snapshot equal to the last saved one is
//!   skipped without calling the persister.
//! - **Single flight**: at most one persistence call is outstanding. A save
//!   requested meanwhile is queued as one catch-up run that uses whatever
//!   snapshot is latest when the outstanding call settles.
//!
//! # Architecture
//!
//! [`AutoSaveSession`] is a handle. The state lives in an actor task that
//! owns every field and reacts to four events in one `select!` loop:
//! commands from the handle, the debounce deadline, settlement of the
//! in-flight persistence task, and the display-window deadline. Scheduler
//! logic never runs concurrently with itself, so no locks are involved.
//!
//! The loop is biased towards commands: an `update` or `discard` already
//! queued is always applied before an expired deadline is acted on, so a
//! superseded or discarded snapshot is never dispatched.
//!
//! The persistence call runs on its own task. Settlement re-enters the
//! scheduling step from the loop, keeping stack depth constant no matter
//! how many catch-up runs chain.
//!
//! Dropping the handle (or calling [`discard`]) cancels pending timers. A
//! persistence call already in flight still runs to completion and is
//! reported to the aggregator, but no longer touches the session status.
//!
//! [`update`]: AutoSaveSession::update
//! [`discard`]: AutoSaveSession::discard

use std::sync::Arc;
use std::time::Duration;

use autosave_types::{SaveState, SessionId, SessionStatus};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregator::StatusAggregator;
use crate::change::should_save;
use crate::config::AutoSaveConfig;
use crate::persist::{PersistError, Persister};

/// Errors returned to callers that explicitly asked for a save.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaveError {
    /// The persistence function rejected the snapshot.
    #[error("save failed: {source}")]
    Persist {
        /// The underlying persistence error.
        #[from]
        source: PersistError,
    },

    /// The session was discarded before the save could run.
    #[error("session {session} was discarded")]
    Discarded {
        /// The discarded session.
        session: SessionId,
    },
}

/// Result of a save the caller waited for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome<S> {
    /// The snapshot was persisted.
    Saved {
        /// The entity as returned by the persister.
        entity: S,
        /// When the save completed.
        saved_at: DateTime<Utc>,
    },
    /// Nothing differed from the last saved snapshot; no call was made.
    Unchanged,
}

/// Values the engine can schedule saves for.
///
/// Blanket-implemented for every cloneable, comparable, thread-safe type.
pub trait Snapshot: Clone + PartialEq + Send + Sync + 'static {}

impl<T> Snapshot for T where T: Clone + PartialEq + Send + Sync + 'static {}

type SaveResult<S> = Result<SaveOutcome<S>, SaveError>;
type Waiter<S> = oneshot::Sender<SaveResult<S>>;
type Settlement<S> = Result<Result<S, PersistError>, JoinError>;

enum Command<S> {
    Update(S),
    ForceSave(Waiter<S>),
    SetEnabled(bool),
    Discard,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to one editing session.
///
/// All methods are cheap and non-blocking except [`force_save`], which
/// waits for the save it triggers.
///
/// [`force_save`]: Self::force_save
#[derive(Debug)]
pub struct AutoSaveSession<S> {
    id: SessionId,
    commands: mpsc::UnboundedSender<Command<S>>,
    status: watch::Receiver<SessionStatus>,
}

impl<S: Snapshot> AutoSaveSession<S> {
    /// Start building a session that saves through `persister` and
    /// reports into `aggregator`.
    pub fn builder<P: Persister<S>>(
        persister: P,
        aggregator: StatusAggregator,
    ) -> SessionBuilder<S, P> {
        SessionBuilder {
            persister,
            aggregator,
            config: AutoSaveConfig::default(),
            label: None,
            baseline: None,
        }
    }

    /// The session identifier used in aggregator reports and logs.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Record `snapshot` as the latest state and re-arm the debounce timer.
    ///
    /// Never persists by itself. When the session is disabled the snapshot
    /// is recorded without scheduling.
    pub fn update(&self, snapshot: S) {
        self.send(Command::Update(snapshot));
    }

    /// Enable or disable scheduling.
    ///
    /// Disabling cancels a pending debounce timer. Enabling re-arms it when
    /// the latest snapshot has not been saved yet.
    pub fn set_enabled(&self, enabled: bool) {
        self.send(Command::SetEnabled(enabled));
    }

    /// Cancel the debounce timer and save the latest snapshot now.
    ///
    /// If a save is already in flight this request joins the catch-up run
    /// that follows it and resolves with that run's outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SaveError::Persist`] if the persistence call fails (the
    /// failure is also reflected in the session status), or
    /// [`SaveError::Discarded`] if the session shut down first.
    pub async fn force_save(&self) -> Result<SaveOutcome<S>, SaveError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::ForceSave(reply));
        response
            .await
            .unwrap_or(Err(SaveError::Discarded { session: self.id }))
    }

    /// Current status of this session.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status transitions.
    ///
    /// The channel closes once the session has shut down.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Stop the session.
    ///
    /// Pending timers are cancelled and no further saves start. A save
    /// already in flight completes in the background.
    pub fn discard(self) {
        self.send(Command::Discard);
    }

    fn send(&self, command: Command<S>) {
        if self.commands.send(command).is_err() {
            debug!(session = %self.id, "session actor already stopped, command dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`AutoSaveSession`].
#[derive(Debug)]
pub struct SessionBuilder<S, P> {
    persister: P,
    aggregator: StatusAggregator,
    config: AutoSaveConfig,
    label: Option<String>,
    baseline: Option<S>,
}

impl<S: Snapshot, P: Persister<S>> SessionBuilder<S, P> {
    /// Use `config` for debounce and display windows and the enabled flag.
    #[must_use]
    pub fn config(mut self, config: AutoSaveConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a human-readable label (for example `"parish:12/risks"`).
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Treat `snapshot` as already persisted, typically the entity as it
    /// was loaded. Until an update differs from it nothing is saved.
    #[must_use]
    pub fn baseline(mut self, snapshot: S) -> Self {
        self.baseline = Some(snapshot);
        self
    }

    /// Spawn the session actor on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(self) -> AutoSaveSession<S> {
        let id = SessionId::new();
        let label = self.label.unwrap_or_else(|| id.to_string());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());

        debug!(
            session = %id,
            label = %label,
            debounce_ms = self.config.debounce_ms,
            enabled = self.config.enabled,
            has_baseline = self.baseline.is_some(),
            "Session opened"
        );

        let actor = SessionActor {
            id,
            label,
            persister: Arc::new(self.persister),
            aggregator: self.aggregator,
            config: self.config,
            enabled: self.config.enabled,
            current: None,
            last_saved: self.baseline,
            debounce_deadline: None,
            reset_deadline: None,
            in_flight: None,
            pending_rerun: false,
            rerun_waiters: Vec::new(),
            status: status_tx,
            commands: commands_rx,
        };
        tokio::spawn(actor.run());

        AutoSaveSession {
            id,
            commands: commands_tx,
            status: status_rx,
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct InFlight<S> {
    snapshot: S,
    task: JoinHandle<Result<S, PersistError>>,
    waiters: Vec<Waiter<S>>,
}

enum Event<S> {
    Command(Option<Command<S>>),
    DebounceElapsed,
    Settled(Settlement<S>),
    DisplayWindowElapsed,
}

struct SessionActor<S, P> {
    id: SessionId,
    label: String,
    persister: Arc<P>,
    aggregator: StatusAggregator,
    config: AutoSaveConfig,
    enabled: bool,
    current: Option<S>,
    last_saved: Option<S>,
    debounce_deadline: Option<Instant>,
    reset_deadline: Option<Instant>,
    in_flight: Option<InFlight<S>>,
    pending_rerun: bool,
    rerun_waiters: Vec<Waiter<S>>,
    status: watch::Sender<SessionStatus>,
    commands: mpsc::UnboundedReceiver<Command<S>>,
}

impl<S: Snapshot, P: Persister<S>> SessionActor<S, P> {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                biased;

                command = self.commands.recv() => Event::Command(command),
                () = sleep_until(self.debounce_deadline) => Event::DebounceElapsed,
                settled = settle(self.in_flight.as_mut()) => Event::Settled(settled),
                () = sleep_until(self.reset_deadline) => Event::DisplayWindowElapsed,
            };

            match event {
                Event::Command(Some(Command::Update(snapshot))) => self.update(snapshot),
                Event::Command(Some(Command::ForceSave(reply))) => {
                    self.debounce_deadline = None;
                    self.attempt_save(vec![reply]);
                }
                Event::Command(Some(Command::SetEnabled(enabled))) => self.set_enabled(enabled),
                Event::Command(Some(Command::Discard) | None) => break,
                Event::DebounceElapsed => {
                    self.debounce_deadline = None;
                    self.attempt_save(Vec::new());
                }
                Event::Settled(settlement) => self.settle(settlement),
                Event::DisplayWindowElapsed => self.return_to_idle(),
            }
        }

        self.shutdown().await;
    }

    fn update(&mut self, snapshot: S) {
        self.current = Some(snapshot);
        self.refresh_unsaved();

        if !self.enabled {
            debug!(session = %self.id, label = %self.label, "Auto-save disabled, update recorded");
            return;
        }
        self.arm_debounce();
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.debounce_deadline = None;
        } else if self.has_unsaved_changes() {
            self.arm_debounce();
        }
        debug!(session = %self.id, label = %self.label, enabled, "Auto-save toggled");
    }

    fn arm_debounce(&mut self) {
        self.debounce_deadline = Some(deadline_after(self.config.debounce()));
        debug!(
            session = %self.id,
            label = %self.label,
            delay_ms = self.config.debounce_ms,
            "Debounce timer armed"
        );
    }

    /// One scheduling step: queue, skip, or dispatch.
    fn attempt_save(&mut self, waiters: Vec<Waiter<S>>) {
        if self.in_flight.is_some() {
            self.pending_rerun = true;
            self.rerun_waiters.extend(waiters);
            debug!(session = %self.id, label = %self.label, "Save in flight, catch-up run queued");
            return;
        }

        let Some(candidate) = self.current.clone() else {
            reply_all(self.id, waiters, &Ok(SaveOutcome::Unchanged));
            return;
        };

        if !should_save(&candidate, self.last_saved.as_ref()) {
            debug!(session = %self.id, label = %self.label, "Snapshot unchanged, save skipped");
            self.return_to_idle();
            reply_all(self.id, waiters, &Ok(SaveOutcome::Unchanged));
            return;
        }

        self.reset_deadline = None;
        self.status.send_modify(|status| status.state = SaveState::Saving);
        self.aggregator.report_saving_started(self.id);
        debug!(session = %self.id, label = %self.label, "Save dispatched");

        let persister = Arc::clone(&self.persister);
        let outgoing = candidate.clone();
        let task = tokio::spawn(async move { persister.persist(outgoing).await });

        self.in_flight = Some(InFlight {
            snapshot: candidate,
            task,
            waiters,
        });
    }

    fn settle(&mut self, settlement: Settlement<S>) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };

        let result = match flatten(settlement) {
            Ok(entity) => {
                let saved_at = Utc::now();
                self.last_saved = Some(in_flight.snapshot);
                self.reset_deadline = Some(deadline_after(self.config.saved_display()));
                let unsaved = self.has_unsaved_changes();
                self.status.send_modify(|status| {
                    status.state = SaveState::Saved;
                    status.last_saved_at = Some(saved_at);
                    status.last_error = None;
                    status.has_unsaved_changes = unsaved;
                });
                self.aggregator.report_saved(self.id, saved_at);
                info!(session = %self.id, label = %self.label, %saved_at, "Saved");
                Ok(SaveOutcome::Saved { entity, saved_at })
            }
            Err(err) => {
                self.reset_deadline = Some(deadline_after(self.config.error_display()));
                self.status.send_modify(|status| {
                    status.state = SaveState::Error;
                    status.last_error = Some(err.message.clone());
                });
                self.aggregator.report_saving_ended(self.id);
                warn!(session = %self.id, label = %self.label, error = %err, "Save failed");
                Err(SaveError::Persist { source: err })
            }
        };
        reply_all(self.id, in_flight.waiters, &result);

        if self.pending_rerun {
            self.pending_rerun = false;
            let waiters = std::mem::take(&mut self.rerun_waiters);
            self.attempt_save(waiters);
        }
    }

    /// Drop a `Saved`/`Error` indication and its pending reset.
    fn return_to_idle(&mut self) {
        self.reset_deadline = None;
        self.status.send_if_modified(|status| {
            if matches!(status.state, SaveState::Saved | SaveState::Error) {
                status.state = SaveState::Idle;
                status.last_error = None;
                true
            } else {
                false
            }
        });
    }

    fn has_unsaved_changes(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| should_save(current, self.last_saved.as_ref()))
    }

    fn refresh_unsaved(&self) {
        let unsaved = self.has_unsaved_changes();
        self.status.send_if_modified(|status| {
            let changed = status.has_unsaved_changes != unsaved;
            status.has_unsaved_changes = unsaved;
            changed
        });
    }

    async fn shutdown(mut self) {
        self.debounce_deadline = None;
        self.reset_deadline = None;
        self.pending_rerun = false;
        reply_all(
            self.id,
            std::mem::take(&mut self.rerun_waiters),
            &Err(SaveError::Discarded { session: self.id }),
        );

        let Some(in_flight) = self.in_flight.take() else {
            debug!(session = %self.id, label = %self.label, "Session discarded");
            return;
        };

        debug!(
            session = %self.id,
            label = %self.label,
            "Session discarded with a save in flight, awaiting completion"
        );
        let result = match flatten(in_flight.task.await) {
            Ok(entity) => {
                let saved_at = Utc::now();
                self.aggregator.report_saved(self.id, saved_at);
                Ok(SaveOutcome::Saved { entity, saved_at })
            }
            Err(err) => {
                self.aggregator.report_saving_ended(self.id);
                Err(SaveError::Persist { source: err })
            }
        };
        reply_all(self.id, in_flight.waiters, &result);
    }
}

fn flatten<S>(settlement: Settlement<S>) -> Result<S, PersistError> {
    match settlement {
        Ok(result) => result,
        Err(join) => Err(PersistError::new(format!("persistence task failed: {join}"))),
    }
}

fn reply_all<S: Clone>(session: SessionId, waiters: Vec<Waiter<S>>, result: &SaveResult<S>) {
    for waiter in waiters {
        if waiter.send(result.clone()).is_err() {
            debug!(session = %session, "caller stopped waiting, save outcome dropped");
        }
    }
}

fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or(now)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn settle<S>(in_flight: Option<&mut InFlight<S>>) -> Settlement<S> {
    match in_flight {
        Some(in_flight) => (&mut in_flight.task).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::persist::persist_fn;

    fn quick_config() -> AutoSaveConfig {
        AutoSaveConfig {
            debounce_ms: 100,
            saved_display_ms: 300,
            error_display_ms: 500,
            enabled: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn force_save_without_snapshot_is_unchanged() {
        let persister = persist_fn(|snapshot: u32| async move { Ok::<_, PersistError>(snapshot) });
        let session = AutoSaveSession::<u32>::builder(persister, StatusAggregator::new())
            .config(quick_config())
            .spawn();

        assert_eq!(session.force_save().await.unwrap(), SaveOutcome::Unchanged);
        assert_eq!(session.status().state, SaveState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn discard_closes_status_channel() {
        let persister = persist_fn(|snapshot: u32| async move { Ok::<_, PersistError>(snapshot) });
        let session = AutoSaveSession::<u32>::builder(persister, StatusAggregator::new())
            .config(quick_config())
            .spawn();
        let mut observer = session.subscribe();
        session.discard();

        assert!(observer.changed().await.is_err());
    }

    #[test]
    fn discarded_error_names_session() {
        let session = SessionId::new();
        let err = SaveError::Discarded { session };
        assert_eq!(err.to_string(), format!("session {session} was discarded"));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_persister_becomes_error_status() {
        let persister = persist_fn(|snapshot: u32| async move {
            if snapshot == 7 {
                panic!("store exploded");
            }
            Ok::<_, PersistError>(snapshot)
        });
        let session = AutoSaveSession::<u32>::builder(persister, StatusAggregator::new())
            .config(quick_config())
            .spawn();

        session.update(7);
        let err = session.force_save().await.unwrap_err();
        assert!(matches!(err, SaveError::Persist { .. }));
        let status = session.status();
        assert_eq!(status.state, SaveState::Error);
        assert!(status.last_error.unwrap().contains("persistence task failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_force_save_does_not_disturb_session() {
        let persister = persist_fn(|snapshot: u32| async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, PersistError>(snapshot)
        });
        let session = AutoSaveSession::<u32>::builder(persister, StatusAggregator::new())
            .config(quick_config())
            .spawn();

        session.update(4);
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), session.force_save()).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(session.status().state, SaveState::Saved);
        assert_eq!(session.force_save().await.unwrap(), SaveOutcome::Unchanged);
    }

    #[tokio::test(start_paused = true)]
    async fn unsaved_flag_tracks_snapshot() {
        let persister = persist_fn(|snapshot: u32| async move { Ok::<_, PersistError>(snapshot) });
        let session = AutoSaveSession::<u32>::builder(persister, StatusAggregator::new())
            .config(quick_config())
            .baseline(1)
            .spawn();

        session.update(2);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(session.status().has_unsaved_changes);

        session.update(1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!session.status().has_unsaved_changes);

        session.update(3);
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = session.status();
        assert_eq!(status.state, SaveState::Saved);
        assert!(!status.has_unsaved_changes);
    }
}
