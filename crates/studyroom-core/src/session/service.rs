//! Session service: one queue, one reducer.
//!
//! Clock ticks, presence readings, fullscreen reports and user actions
//! all land on a single unbounded queue and are reduced one at a time, in
//! arrival order. The reaction to an event is complete before the next
//! event is taken, so there is no interleaving that could produce two
//! live clocks or an ambiguous pause.
//!
//! Raw signals are normalized on the same queue: presence readings pass
//! through the [`PresenceDebouncer`], fullscreen reports through the
//! [`FullscreenGuard`], and only the resulting stable transitions reach
//! the controller.

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};

use super::config::SessionConfig;
use super::controller::{SessionController, SessionEvent, SessionState};
use crate::error::CoreError;
use crate::events::Event;
use crate::fullscreen::{FullscreenGuard, FullscreenTransition};
use crate::presence::{PresenceDebouncer, PresenceSignal};
use crate::storage::{Database, SessionOutcome, Snapshot, SnapshotStore};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Cloneable front door for UI layers and signal sources.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
    state_rx: watch::Receiver<SessionState>,
    events_tx: broadcast::Sender<Event>,
}

impl SessionHandle {
    /// The study material is ready; start (or re-enter) the session.
    pub fn load_material(&self) {
        self.send(SessionEvent::MaterialLoaded);
    }

    pub fn request_pause(&self) {
        self.send(SessionEvent::ManualPause);
    }

    pub fn request_resume(&self) {
        self.send(SessionEvent::Resume);
    }

    /// Snapshot the session for reload recovery and terminate it.
    pub fn request_exit(&self) {
        self.send(SessionEvent::ExitRequested);
    }

    /// Feed one raw presence reading. Any cadence from 0.5 Hz up works;
    /// the debouncer absorbs flicker.
    pub fn report_presence(&self, present: bool, confidence: f32) {
        self.send(SessionEvent::RawPresence(PresenceSignal::new(
            present, confidence,
        )));
    }

    /// The presence source cannot deliver readings (e.g. camera
    /// permission denied). Absence pausing is disabled for the session;
    /// manual and fullscreen pausing keep working.
    pub fn report_presence_unavailable(&self) {
        self.send(SessionEvent::PresenceUnavailable);
    }

    pub fn report_fullscreen_changed(&self, active: bool) {
        self.send(SessionEvent::RawFullscreen { active });
    }

    pub fn page_read(&self, page: u32) {
        self.send(SessionEvent::PageRead { page });
    }

    /// Latest published state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch channel updated after every processed event.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    fn send(&self, event: SessionEvent) {
        // A send can only fail after the session terminated; late inputs
        // are dropped just like any other post-terminal event.
        let _ = self.tx.send(event);
    }
}

/// Owns the queue, the controller and the collaborators it feeds.
pub struct SessionService {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    controller: SessionController,
    debouncer: PresenceDebouncer,
    guard: FullscreenGuard,
    state_tx: watch::Sender<SessionState>,
    events_tx: broadcast::Sender<Event>,
    store: Option<SnapshotStore>,
    database: Option<Database>,
    restored_elapsed: Option<u64>,
    started_at: Option<DateTime<Utc>>,
}

impl SessionService {
    /// Service for a fresh session.
    ///
    /// # Errors
    /// Rejects an invalid session configuration.
    pub fn new(config: SessionConfig) -> Result<(Self, SessionHandle), CoreError> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = SessionController::new(config, tx.clone());
        Ok(Self::assemble(rx, tx, controller, None))
    }

    /// Service recovered from a snapshot (already consumed from the
    /// store). The session waits in Idle until the material is
    /// re-supplied.
    pub fn restore(snapshot: &Snapshot) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = SessionController::restore(snapshot, tx.clone());
        Self::assemble(rx, tx, controller, Some(snapshot.elapsed_seconds))
    }

    fn assemble(
        rx: mpsc::UnboundedReceiver<SessionEvent>,
        tx: mpsc::UnboundedSender<SessionEvent>,
        controller: SessionController,
        restored_elapsed: Option<u64>,
    ) -> (Self, SessionHandle) {
        let (state_tx, state_rx) = watch::channel(controller.state());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let service = Self {
            rx,
            controller,
            debouncer: PresenceDebouncer::new(),
            guard: FullscreenGuard::new(),
            state_tx,
            events_tx: events_tx.clone(),
            store: None,
            database: None,
            restored_elapsed,
            started_at: None,
        };
        let handle = SessionHandle {
            tx,
            state_rx,
            events_tx,
        };
        (service, handle)
    }

    /// Persist exit snapshots to this store.
    pub fn with_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Record finished sessions to this database.
    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    /// Override the presence debouncer (custom confidence floor).
    pub fn with_debouncer(mut self, debouncer: PresenceDebouncer) -> Self {
        self.debouncer = debouncer;
        self
    }

    /// Override the absence grace period.
    pub fn with_grace_period(mut self, grace: std::time::Duration) -> Self {
        self.controller = self.controller.with_grace_period(grace);
        self
    }

    /// Process events until the session reaches a terminal phase.
    pub async fn run(mut self) {
        if let Some(elapsed_secs) = self.restored_elapsed.take() {
            let _ = self.events_tx.send(Event::SessionRestored {
                elapsed_secs,
                at: Utc::now(),
            });
        }
        self.publish_state();

        while let Some(event) = self.rx.recv().await {
            let outputs = self.dispatch(event);
            for event in outputs {
                self.react(&event);
                let _ = self.events_tx.send(event);
            }
            self.publish_state();
            if self.controller.phase().is_terminal() {
                break;
            }
        }
    }

    fn dispatch(&mut self, event: SessionEvent) -> Vec<Event> {
        match event {
            SessionEvent::RawPresence(signal) => match self.debouncer.observe(&signal) {
                Some(present) => self
                    .controller
                    .handle(SessionEvent::PresenceChanged { present }),
                None => Vec::new(),
            },
            SessionEvent::RawFullscreen { active } => match self.guard.observe(active) {
                Some(FullscreenTransition::Entered) => {
                    self.controller.handle(SessionEvent::FullscreenEntered)
                }
                Some(FullscreenTransition::Exited) => {
                    self.controller.handle(SessionEvent::FullscreenExited)
                }
                None => Vec::new(),
            },
            other => self.controller.handle(other),
        }
    }

    /// Side effects of output events: snapshot persistence and history
    /// recording. Failures are logged and never terminate the session.
    fn react(&mut self, event: &Event) {
        match event {
            Event::SessionStarted { .. } => {
                self.started_at = Some(Utc::now());
            }
            Event::SessionEnded { elapsed_secs, .. } => {
                self.record_outcome(SessionOutcome::Completed, *elapsed_secs);
            }
            Event::SessionExited { snapshot, .. } => {
                if let Some(store) = &self.store {
                    if let Err(err) = store.save(snapshot) {
                        tracing::warn!(error = %err, "failed to persist exit snapshot");
                    }
                }
                self.record_outcome(SessionOutcome::Exited, snapshot.elapsed_seconds);
            }
            _ => {}
        }
    }

    fn record_outcome(&self, outcome: SessionOutcome, elapsed_secs: u64) {
        let Some(db) = &self.database else {
            return;
        };
        let ended_at = Utc::now();
        let started_at = self.started_at.unwrap_or(ended_at);
        let state = self.controller.state();
        if let Err(err) = db.record_session(
            outcome,
            self.controller.config().study_seconds,
            elapsed_secs,
            state.pages_read,
            started_at,
            ended_at,
        ) {
            tracing::warn!(error = %err, "failed to record session history");
        }
    }

    fn publish_state(&self) {
        let state = self.controller.state();
        self.state_tx.send_replace(state);
        let _ = self.events_tx.send(Event::StateChanged {
            state,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{PauseReason, Phase};
    use std::time::Duration;

    async fn wait_for<F>(handle: &SessionHandle, mut cond: F) -> SessionState
    where
        F: FnMut(&SessionState) -> bool,
    {
        let mut rx = handle.subscribe_state();
        tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                {
                    let state = rx.borrow();
                    if cond(&state) {
                        return *state;
                    }
                }
                rx.changed().await.expect("service dropped");
            }
        })
        .await
        .expect("condition not reached in time")
    }

    #[tokio::test(start_paused = true)]
    async fn session_runs_to_completion_on_real_ticks() {
        let (service, handle) = SessionService::new(SessionConfig::new(3, 0, 0)).unwrap();
        let task = tokio::spawn(service.run());

        handle.load_material();
        let state = wait_for(&handle, |s| s.phase == Phase::Ended).await;
        assert_eq!(state.elapsed_seconds, 3);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn noisy_presence_readings_do_not_pause() {
        let (service, handle) = SessionService::new(SessionConfig::new(600, 0, 0)).unwrap();
        tokio::spawn(service.run());

        handle.load_material();
        handle.report_fullscreen_changed(true);
        // Alternating readings never build a confirming streak.
        for i in 0..10 {
            handle.report_presence(i % 2 == 0, 0.9);
        }
        let state = wait_for(&handle, |s| s.elapsed_seconds >= 2).await;
        assert_eq!(state.phase, Phase::Running);
        assert_eq!(state.pause_reason, PauseReason::None);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_absence_pauses_after_grace() {
        let (service, handle) = SessionService::new(SessionConfig::new(600, 0, 0)).unwrap();
        tokio::spawn(service.run());

        handle.load_material();
        handle.report_fullscreen_changed(true);
        // The debouncer starts absent; confirm presence before walking away.
        handle.report_presence(true, 0.9);
        handle.report_presence(true, 0.9);
        handle.report_presence(false, 0.9);
        handle.report_presence(false, 0.9);

        let state = wait_for(&handle, |s| s.phase == Phase::Paused).await;
        assert_eq!(state.pause_reason, PauseReason::PresenceLost);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_persists_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::at_path(dir.path().join("session.json"));
        let (service, handle) = SessionService::new(SessionConfig::new(600, 0, 0)).unwrap();
        let task = tokio::spawn(service.with_store(store).run());

        handle.load_material();
        wait_for(&handle, |s| s.elapsed_seconds >= 2).await;
        handle.request_exit();
        task.await.unwrap();

        let store = SnapshotStore::at_path(dir.path().join("session.json"));
        let snapshot = store.load().expect("snapshot persisted");
        assert!(snapshot.elapsed_seconds >= 2);
        assert_eq!(snapshot.study_seconds, 600);
    }

    #[tokio::test(start_paused = true)]
    async fn restored_session_continues_from_snapshot() {
        let snapshot = Snapshot {
            study_seconds: 600,
            break_interval_seconds: 0,
            break_duration_seconds: 0,
            elapsed_seconds: 598,
            phase: Phase::Running,
            pause_reason: PauseReason::None,
        };
        let (service, handle) = SessionService::restore(&snapshot);
        let task = tokio::spawn(service.run());

        handle.load_material();
        let state = wait_for(&handle, |s| s.phase == Phase::Ended).await;
        assert_eq!(state.elapsed_seconds, 600);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn completion_is_recorded_to_history() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("studyroom.db");
        let db = Database::open_at(db_path.clone()).unwrap();
        let (service, handle) = SessionService::new(SessionConfig::new(2, 0, 0)).unwrap();
        let task = tokio::spawn(service.with_database(db).run());

        handle.load_material();
        handle.page_read(4);
        wait_for(&handle, |s| s.phase == Phase::Ended).await;
        task.await.unwrap();

        let db = Database::open_at(db_path).unwrap();
        let recent = db.recent_sessions(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].outcome, "completed");
        assert_eq!(recent[0].elapsed_secs, 2);
        assert_eq!(recent[0].pages_read, 4);
    }
}
