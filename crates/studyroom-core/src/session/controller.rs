//! Session controller implementation.
//!
//! The controller is the single authority over session state. Every input
//! -- clock ticks, debounced presence flips, fullscreen transitions, user
//! actions -- arrives as a [`SessionEvent`] and is reduced synchronously
//! against one [`SessionState`]. There are no shared flags between
//! handlers: pause arbitration lives entirely in the `pause_reason` field
//! and the transitions below.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Break -> Ended
//!           |          |
//!           +- Paused -+   (resumes to the phase it suspended)
//! ```
//!
//! Pause precedence: a Manual or FullscreenExit pause is never overridden
//! by presence events; presence monitoring is informational-only until an
//! explicit resume clears the pause.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use super::clock::{Clock, GraceTimer};
use super::config::SessionConfig;
use super::policy::{self, PolicyDecision};
use crate::events::Event;
use crate::presence::PresenceSignal;
use crate::storage::Snapshot;

/// Seconds between a confirmed absence and the automatic pause.
pub const DEFAULT_GRACE_SECS: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Running,
    Break,
    Paused,
    Ended,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        self == Phase::Ended
    }
}

/// Which trigger caused the current pause. `None` outside of Paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    None,
    Manual,
    FullscreenExit,
    PresenceLost,
}

/// The session state owned exclusively by the controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: Phase,
    /// Whole study seconds completed. Monotonic for the session lifetime;
    /// frozen during breaks and pauses.
    pub elapsed_seconds: u64,
    /// Seconds left in the current countdown (study target while Running,
    /// break while Break). Always derived, never counted down on its own.
    pub remaining_seconds: u64,
    pub pause_reason: PauseReason,
    pub fullscreen_active: bool,
    /// Highest material page reached this session.
    pub pages_read: u32,
}

impl SessionState {
    fn idle(config: &SessionConfig) -> Self {
        Self {
            phase: Phase::Idle,
            elapsed_seconds: 0,
            remaining_seconds: config.study_seconds,
            pause_reason: PauseReason::None,
            fullscreen_active: false,
            pages_read: 0,
        }
    }
}

/// Inputs to the controller. All of them -- including the controller's own
/// timers -- travel through one queue and are processed strictly in
/// arrival order.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Study material is ready; begin (or re-enter a restored) session.
    MaterialLoaded,
    /// One second of wall-clock time while the clock runs.
    Tick,
    /// User asked to pause.
    ManualPause,
    /// User asked to resume from any pause, or to end a break.
    Resume,
    FullscreenEntered,
    FullscreenExited,
    /// Debounced presence flip.
    PresenceChanged { present: bool },
    /// The presence source cannot be acquired for this session.
    PresenceUnavailable,
    /// The absence grace period ran out.
    GraceElapsed,
    /// The reader moved to a material page.
    PageRead { page: u32 },
    /// User asked to exit mid-session; snapshot and terminate.
    ExitRequested,
    /// Raw presence reading; normalized by the service before it reaches
    /// the controller.
    RawPresence(PresenceSignal),
    /// Raw fullscreen report; deduplicated by the service.
    RawFullscreen { active: bool },
}

/// The session state machine.
///
/// Owns the [`Clock`] and [`GraceTimer`] handles; no other component may
/// start or stop them. Reduction is synchronous: the reaction to an event
/// is complete before the next event is handled.
#[derive(Debug)]
pub struct SessionController {
    config: SessionConfig,
    state: SessionState,
    /// Phase a pause will resume to (Running or Break).
    prior_phase: Phase,
    /// Seconds left in the current break.
    break_remaining: u64,
    /// Phase to re-enter when material arrives for a restored session.
    resume_phase: Option<Phase>,
    /// False once the presence source reported itself unavailable.
    presence_enabled: bool,
    presence_notice_sent: bool,
    /// Last debounced presence value seen.
    last_present: bool,
    /// Wall-clock time of the previous tick, for drift observation.
    last_tick_at: Option<DateTime<Utc>>,
    grace_period: Duration,
    clock: Clock,
    grace: GraceTimer,
    tx: UnboundedSender<SessionEvent>,
}

impl SessionController {
    /// Controller for a fresh session in `Idle`, waiting for material.
    pub fn new(config: SessionConfig, tx: UnboundedSender<SessionEvent>) -> Self {
        Self {
            state: SessionState::idle(&config),
            config,
            prior_phase: Phase::Running,
            break_remaining: 0,
            resume_phase: None,
            presence_enabled: true,
            presence_notice_sent: false,
            last_present: false,
            last_tick_at: None,
            grace_period: Duration::from_secs(DEFAULT_GRACE_SECS),
            clock: Clock::new(),
            grace: GraceTimer::new(),
            tx,
        }
    }

    /// Controller recovered from a snapshot. Sits in `Idle` until the
    /// material is re-supplied (`MaterialLoaded`), then re-enters the
    /// snapshot's phase. A snapshot taken while paused resumes running;
    /// a snapshot taken in a break restarts the break countdown.
    pub fn restore(snapshot: &Snapshot, tx: UnboundedSender<SessionEvent>) -> Self {
        let config = snapshot.config();
        let mut controller = Self::new(config, tx);
        controller.state.elapsed_seconds = snapshot.elapsed_seconds.min(config.study_seconds);
        controller.state.remaining_seconds =
            config.study_seconds - controller.state.elapsed_seconds;
        controller.resume_phase = Some(match snapshot.phase {
            Phase::Break => Phase::Break,
            _ => Phase::Running,
        });
        controller
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Flat record for reload recovery. The material itself is never
    /// part of the snapshot; restore re-prompts for it.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            study_seconds: self.config.study_seconds,
            break_interval_seconds: self.config.break_interval_seconds,
            break_duration_seconds: self.config.break_duration_seconds,
            elapsed_seconds: self.state.elapsed_seconds,
            phase: self.state.phase,
            pause_reason: self.state.pause_reason,
        }
    }

    // ── Reduction ────────────────────────────────────────────────────

    /// Apply one event. Returns the events it produced; inputs whose
    /// preconditions do not hold are rejected as no-ops and return
    /// nothing, never partially mutating state.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Event> {
        if self.state.phase.is_terminal() {
            return Vec::new();
        }
        match event {
            SessionEvent::MaterialLoaded => self.on_material_loaded(),
            SessionEvent::Tick => self.on_tick(),
            SessionEvent::ManualPause => self.on_pause(PauseReason::Manual),
            SessionEvent::Resume => self.on_resume(),
            SessionEvent::FullscreenEntered => self.on_fullscreen(true),
            SessionEvent::FullscreenExited => self.on_fullscreen(false),
            SessionEvent::PresenceChanged { present } => self.on_presence(present),
            SessionEvent::PresenceUnavailable => self.on_presence_unavailable(),
            SessionEvent::GraceElapsed => self.on_grace_elapsed(),
            SessionEvent::PageRead { page } => self.on_page_read(page),
            SessionEvent::ExitRequested => self.on_exit(),
            // Raw inputs are normalized by the service layer; a raw event
            // reaching the reducer is dropped rather than guessed at.
            SessionEvent::RawPresence(_) | SessionEvent::RawFullscreen { .. } => Vec::new(),
        }
    }

    fn on_material_loaded(&mut self) -> Vec<Event> {
        if self.state.phase != Phase::Idle {
            return Vec::new();
        }
        // A fresh session may not start while a prior clock or grace
        // timer is live.
        self.clock.stop();
        self.grace.cancel();

        let restored = self.resume_phase.take();
        match restored {
            Some(Phase::Break) => {
                self.state.phase = Phase::Break;
                self.break_remaining = self.config.break_duration_seconds;
                self.state.remaining_seconds = self.break_remaining;
            }
            Some(_) | None => {
                if restored.is_none() {
                    self.state.elapsed_seconds = 0;
                }
                self.state.phase = Phase::Running;
                self.state.remaining_seconds = self
                    .config
                    .study_seconds
                    .saturating_sub(self.state.elapsed_seconds);
            }
        }
        self.state.pause_reason = PauseReason::None;
        self.clock.start(&self.tx);
        vec![Event::SessionStarted {
            config: self.config,
            at: Utc::now(),
        }]
    }

    fn on_tick(&mut self) -> Vec<Event> {
        // A tick already queued when the session paused must not count.
        if !matches!(self.state.phase, Phase::Running | Phase::Break) {
            return Vec::new();
        }
        self.observe_tick_gap();

        match self.state.phase {
            Phase::Running => {
                self.state.elapsed_seconds += 1;
                self.state.remaining_seconds = self
                    .config
                    .study_seconds
                    .saturating_sub(self.state.elapsed_seconds);
            }
            Phase::Break => {
                self.break_remaining = self.break_remaining.saturating_sub(1);
                self.state.remaining_seconds = self.break_remaining;
            }
            _ => unreachable!(),
        }

        match policy::next_phase(
            self.state.phase,
            self.state.elapsed_seconds,
            self.break_remaining,
            &self.config,
        ) {
            PolicyDecision::Continue => Vec::new(),
            PolicyDecision::End => {
                self.state.phase = Phase::Ended;
                self.state.pause_reason = PauseReason::None;
                self.state.remaining_seconds = 0;
                self.clock.stop();
                self.grace.cancel();
                vec![Event::SessionEnded {
                    elapsed_secs: self.state.elapsed_seconds,
                    at: Utc::now(),
                }]
            }
            PolicyDecision::StartBreak { duration_secs } => {
                self.state.phase = Phase::Break;
                self.break_remaining = duration_secs;
                self.state.remaining_seconds = duration_secs;
                vec![Event::BreakStarted {
                    duration_secs,
                    at: Utc::now(),
                }]
            }
            PolicyDecision::FinishBreak => {
                // The clock doubles as the notification latch: a finished
                // break stops it, so a straggling tick cannot re-announce.
                if self.clock.is_running() {
                    self.clock.stop();
                    vec![Event::BreakFinished { at: Utc::now() }]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn on_pause(&mut self, reason: PauseReason) -> Vec<Event> {
        if !matches!(self.state.phase, Phase::Running | Phase::Break) {
            return Vec::new();
        }
        // Any pause preempts a pending absence countdown.
        self.grace.cancel();
        self.prior_phase = self.state.phase;
        self.state.phase = Phase::Paused;
        self.state.pause_reason = reason;
        self.clock.stop();
        vec![Event::SessionPaused {
            reason,
            elapsed_secs: self.state.elapsed_seconds,
            remaining_secs: self.state.remaining_seconds,
            at: Utc::now(),
        }]
    }

    fn on_resume(&mut self) -> Vec<Event> {
        match self.state.phase {
            Phase::Paused => {
                self.state.phase = self.prior_phase;
                self.state.pause_reason = PauseReason::None;
                self.recompute_remaining();
                self.clock.start(&self.tx);
                vec![Event::SessionResumed {
                    elapsed_secs: self.state.elapsed_seconds,
                    remaining_secs: self.state.remaining_seconds,
                    at: Utc::now(),
                }]
            }
            // Ending a break (or skipping the rest of one) is an explicit
            // user action; the break never resumes on its own.
            Phase::Break => {
                self.state.phase = Phase::Running;
                self.break_remaining = 0;
                self.recompute_remaining();
                self.clock.start(&self.tx);
                vec![Event::SessionResumed {
                    elapsed_secs: self.state.elapsed_seconds,
                    remaining_secs: self.state.remaining_seconds,
                    at: Utc::now(),
                }]
            }
            _ => Vec::new(),
        }
    }

    fn on_fullscreen(&mut self, active: bool) -> Vec<Event> {
        self.state.fullscreen_active = active;
        let mut events = vec![Event::FullscreenChanged {
            active,
            at: Utc::now(),
        }];
        if !active
            && matches!(self.state.phase, Phase::Running | Phase::Break)
            && self.state.pause_reason == PauseReason::None
        {
            events.extend(self.on_pause(PauseReason::FullscreenExit));
        }
        events
    }

    fn on_presence(&mut self, present: bool) -> Vec<Event> {
        self.last_present = present;

        if present {
            // Cancel an absence countdown outright; the user came back
            // inside the grace window.
            self.grace.cancel();
            if self.state.pause_reason == PauseReason::PresenceLost {
                // Surface the resume affordance. Resuming stays explicit.
                return vec![Event::PresenceRestored { at: Utc::now() }];
            }
            return Vec::new();
        }

        // Absence while manually or fullscreen-paused is informational
        // only; the existing pause holds until an explicit resume.
        if !self.presence_enabled || self.state.pause_reason != PauseReason::None {
            return Vec::new();
        }
        if matches!(self.state.phase, Phase::Running | Phase::Break)
            && self.state.fullscreen_active
        {
            tracing::debug!(grace_secs = self.grace_period.as_secs(), "absence countdown armed");
            self.grace.arm(&self.tx, self.grace_period);
        }
        Vec::new()
    }

    fn on_grace_elapsed(&mut self) -> Vec<Event> {
        // The countdown only converts to a pause if nothing intervened:
        // the user is still gone, no other pause took precedence, and the
        // session is still in a tickable phase.
        if self.last_present
            || !self.presence_enabled
            || self.state.pause_reason != PauseReason::None
            || !matches!(self.state.phase, Phase::Running | Phase::Break)
        {
            return Vec::new();
        }
        self.on_pause(PauseReason::PresenceLost)
    }

    fn on_presence_unavailable(&mut self) -> Vec<Event> {
        self.presence_enabled = false;
        self.grace.cancel();
        if self.presence_notice_sent {
            return Vec::new();
        }
        self.presence_notice_sent = true;
        tracing::warn!("presence source unavailable; absence pausing disabled for this session");
        vec![Event::PresenceMonitoringDisabled { at: Utc::now() }]
    }

    fn on_page_read(&mut self, page: u32) -> Vec<Event> {
        if self.state.phase == Phase::Idle || page <= self.state.pages_read {
            return Vec::new();
        }
        self.state.pages_read = page;
        vec![Event::PageRead {
            page,
            pages_read: self.state.pages_read,
            page_goal: self.config.page_goal,
            at: Utc::now(),
        }]
    }

    fn on_exit(&mut self) -> Vec<Event> {
        let snapshot = self.snapshot();
        self.clock.stop();
        self.grace.cancel();
        self.state.phase = Phase::Ended;
        self.state.pause_reason = PauseReason::None;
        vec![Event::SessionExited {
            snapshot,
            at: Utc::now(),
        }]
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Remaining time is always recomputed from elapsed, so a missed
    /// completion tick self-corrects on the next tick or resume.
    fn recompute_remaining(&mut self) {
        self.state.remaining_seconds = match self.state.phase {
            Phase::Break => self.break_remaining,
            _ => self
                .config
                .study_seconds
                .saturating_sub(self.state.elapsed_seconds),
        };
    }

    fn observe_tick_gap(&mut self) {
        let now = Utc::now();
        if let Some(last) = self.last_tick_at {
            let gap = (now - last).num_seconds();
            if gap > 2 {
                tracing::debug!(gap_secs = gap, "coalesced ticks after a stall");
            }
        }
        self.last_tick_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn controller(config: SessionConfig) -> SessionController {
        let (tx, _rx) = mpsc::unbounded_channel();
        // The receiver is dropped: clock sends fail silently, which is
        // fine because these tests drive ticks by hand.
        SessionController::new(config, tx)
    }

    fn started(config: SessionConfig) -> SessionController {
        let mut c = controller(config);
        c.handle(SessionEvent::MaterialLoaded);
        c
    }

    fn invariant_holds(state: &SessionState) -> bool {
        (state.pause_reason != PauseReason::None) == (state.phase == Phase::Paused)
    }

    #[tokio::test]
    async fn material_load_starts_running() {
        let mut c = controller(SessionConfig::default());
        assert_eq!(c.phase(), Phase::Idle);

        let events = c.handle(SessionEvent::MaterialLoaded);
        assert!(matches!(events[0], Event::SessionStarted { .. }));
        assert_eq!(c.phase(), Phase::Running);
        assert_eq!(c.state().elapsed_seconds, 0);
        assert_eq!(c.state().remaining_seconds, 1500);
    }

    #[tokio::test]
    async fn material_load_twice_is_a_noop() {
        let mut c = started(SessionConfig::default());
        c.handle(SessionEvent::Tick);
        assert!(c.handle(SessionEvent::MaterialLoaded).is_empty());
        assert_eq!(c.state().elapsed_seconds, 1);
    }

    #[tokio::test]
    async fn ticks_advance_elapsed_and_derive_remaining() {
        let mut c = started(SessionConfig::new(10, 0, 0));
        for _ in 0..4 {
            c.handle(SessionEvent::Tick);
        }
        assert_eq!(c.state().elapsed_seconds, 4);
        assert_eq!(c.state().remaining_seconds, 6);
    }

    #[tokio::test]
    async fn session_ends_at_study_target() {
        let mut c = started(SessionConfig::new(3, 0, 0));
        c.handle(SessionEvent::Tick);
        c.handle(SessionEvent::Tick);
        let events = c.handle(SessionEvent::Tick);
        assert!(matches!(events[0], Event::SessionEnded { elapsed_secs: 3, .. }));
        assert_eq!(c.phase(), Phase::Ended);

        // Terminal: further ticks are ignored.
        assert!(c.handle(SessionEvent::Tick).is_empty());
        assert_eq!(c.state().elapsed_seconds, 3);
    }

    #[tokio::test]
    async fn break_interval_suspends_study_countdown() {
        let mut c = started(SessionConfig::new(10, 4, 2));
        for _ in 0..4 {
            c.handle(SessionEvent::Tick);
        }
        assert_eq!(c.phase(), Phase::Break);
        assert_eq!(c.state().remaining_seconds, 2);

        // Break ticks freeze elapsed and count the break down.
        c.handle(SessionEvent::Tick);
        assert_eq!(c.state().elapsed_seconds, 4);
        assert_eq!(c.state().remaining_seconds, 1);

        let events = c.handle(SessionEvent::Tick);
        assert!(matches!(events[0], Event::BreakFinished { .. }));
        assert_eq!(c.phase(), Phase::Break);

        // A straggling queued tick does not re-announce the finish.
        assert!(c.handle(SessionEvent::Tick).is_empty());

        // Only an explicit resume returns to Running.
        let events = c.handle(SessionEvent::Resume);
        assert!(matches!(events[0], Event::SessionResumed { .. }));
        assert_eq!(c.phase(), Phase::Running);
        assert_eq!(c.state().remaining_seconds, 6);
    }

    #[tokio::test]
    async fn end_check_beats_break_check() {
        // Interval equals study length: ends without a final break.
        let mut c = started(SessionConfig::new(6, 6, 2));
        let mut ended = 0;
        for _ in 0..6 {
            for e in c.handle(SessionEvent::Tick) {
                match e {
                    Event::SessionEnded { .. } => ended += 1,
                    Event::BreakStarted { .. } => panic!("entered a break at the end"),
                    _ => {}
                }
            }
        }
        assert_eq!(ended, 1);
        assert_eq!(c.phase(), Phase::Ended);
    }

    #[tokio::test]
    async fn manual_pause_and_resume_round_trip() {
        let mut c = started(SessionConfig::new(10, 0, 0));
        c.handle(SessionEvent::Tick);

        let events = c.handle(SessionEvent::ManualPause);
        assert!(matches!(
            events[0],
            Event::SessionPaused { reason: PauseReason::Manual, .. }
        ));
        assert_eq!(c.phase(), Phase::Paused);
        assert!(invariant_holds(&c.state()));

        // Ticks queued before the pause landed must not count.
        assert!(c.handle(SessionEvent::Tick).is_empty());
        assert_eq!(c.state().elapsed_seconds, 1);

        c.handle(SessionEvent::Resume);
        assert_eq!(c.phase(), Phase::Running);
        assert_eq!(c.state().pause_reason, PauseReason::None);
        assert!(invariant_holds(&c.state()));
    }

    #[tokio::test]
    async fn pause_during_break_resumes_to_break() {
        let mut c = started(SessionConfig::new(10, 2, 5));
        c.handle(SessionEvent::Tick);
        c.handle(SessionEvent::Tick);
        assert_eq!(c.phase(), Phase::Break);
        c.handle(SessionEvent::Tick);
        assert_eq!(c.state().remaining_seconds, 4);

        c.handle(SessionEvent::ManualPause);
        assert_eq!(c.phase(), Phase::Paused);

        c.handle(SessionEvent::Resume);
        assert_eq!(c.phase(), Phase::Break);
        assert_eq!(c.state().remaining_seconds, 4);
    }

    #[tokio::test]
    async fn resume_without_pause_is_rejected() {
        let mut c = started(SessionConfig::new(10, 0, 0));
        assert!(c.handle(SessionEvent::Resume).is_empty());
        assert_eq!(c.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn fullscreen_exit_pauses_until_explicit_resume() {
        let mut c = started(SessionConfig::new(10, 0, 0));
        c.handle(SessionEvent::FullscreenEntered);
        let events = c.handle(SessionEvent::FullscreenExited);
        assert!(matches!(events[0], Event::FullscreenChanged { active: false, .. }));
        assert!(matches!(
            events[1],
            Event::SessionPaused { reason: PauseReason::FullscreenExit, .. }
        ));
        assert_eq!(c.phase(), Phase::Paused);

        // Re-entering fullscreen does not resume by itself.
        c.handle(SessionEvent::FullscreenEntered);
        assert_eq!(c.phase(), Phase::Paused);

        c.handle(SessionEvent::Resume);
        assert_eq!(c.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn fullscreen_exit_while_paused_keeps_existing_reason() {
        let mut c = started(SessionConfig::new(10, 0, 0));
        c.handle(SessionEvent::FullscreenEntered);
        c.handle(SessionEvent::ManualPause);

        let events = c.handle(SessionEvent::FullscreenExited);
        assert_eq!(events.len(), 1); // only the fullscreen change
        assert_eq!(c.state().pause_reason, PauseReason::Manual);
    }

    #[tokio::test]
    async fn absence_arms_grace_only_in_fullscreen() {
        let mut c = started(SessionConfig::new(10, 0, 0));
        c.handle(SessionEvent::PresenceChanged { present: false });
        assert!(!c.grace.is_armed());

        c.handle(SessionEvent::FullscreenEntered);
        c.handle(SessionEvent::PresenceChanged { present: false });
        assert!(c.grace.is_armed());
    }

    #[tokio::test]
    async fn grace_expiry_pauses_for_presence_loss() {
        let mut c = started(SessionConfig::new(10, 0, 0));
        c.handle(SessionEvent::FullscreenEntered);
        c.handle(SessionEvent::PresenceChanged { present: false });

        let events = c.handle(SessionEvent::GraceElapsed);
        assert!(matches!(
            events[0],
            Event::SessionPaused { reason: PauseReason::PresenceLost, .. }
        ));
        assert!(invariant_holds(&c.state()));
    }

    #[tokio::test]
    async fn return_within_grace_cancels_the_pause() {
        let mut c = started(SessionConfig::new(10, 0, 0));
        c.handle(SessionEvent::FullscreenEntered);
        c.handle(SessionEvent::PresenceChanged { present: false });
        c.handle(SessionEvent::PresenceChanged { present: true });
        assert!(!c.grace.is_armed());

        // A grace expiry that lost the race to the queue is discarded.
        assert!(c.handle(SessionEvent::GraceElapsed).is_empty());
        assert_eq!(c.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn manual_pause_takes_precedence_over_presence() {
        let mut c = started(SessionConfig::new(10, 0, 0));
        c.handle(SessionEvent::FullscreenEntered);
        c.handle(SessionEvent::ManualPause);

        for _ in 0..5 {
            c.handle(SessionEvent::PresenceChanged { present: false });
            c.handle(SessionEvent::GraceElapsed);
            c.handle(SessionEvent::PresenceChanged { present: true });
        }
        assert_eq!(c.phase(), Phase::Paused);
        assert_eq!(c.state().pause_reason, PauseReason::Manual);

        c.handle(SessionEvent::Resume);
        assert_eq!(c.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn presence_return_surfaces_resume_affordance() {
        let mut c = started(SessionConfig::new(10, 0, 0));
        c.handle(SessionEvent::FullscreenEntered);
        c.handle(SessionEvent::PresenceChanged { present: false });
        c.handle(SessionEvent::GraceElapsed);
        assert_eq!(c.state().pause_reason, PauseReason::PresenceLost);

        let events = c.handle(SessionEvent::PresenceChanged { present: true });
        assert!(matches!(events[0], Event::PresenceRestored { .. }));
        // Still paused: resuming is explicit.
        assert_eq!(c.phase(), Phase::Paused);
    }

    #[tokio::test]
    async fn presence_unavailable_disables_absence_pausing() {
        let mut c = started(SessionConfig::new(10, 0, 0));
        c.handle(SessionEvent::FullscreenEntered);

        let events = c.handle(SessionEvent::PresenceUnavailable);
        assert!(matches!(events[0], Event::PresenceMonitoringDisabled { .. }));
        // Surfaced once only.
        assert!(c.handle(SessionEvent::PresenceUnavailable).is_empty());

        c.handle(SessionEvent::PresenceChanged { present: false });
        assert!(!c.grace.is_armed());
        assert!(c.handle(SessionEvent::GraceElapsed).is_empty());

        // Manual and fullscreen pausing keep working.
        c.handle(SessionEvent::ManualPause);
        assert_eq!(c.phase(), Phase::Paused);
    }

    #[tokio::test]
    async fn exit_snapshots_current_state() {
        let mut c = started(SessionConfig::new(100, 0, 0));
        for _ in 0..7 {
            c.handle(SessionEvent::Tick);
        }
        c.handle(SessionEvent::ManualPause);

        let events = c.handle(SessionEvent::ExitRequested);
        match &events[0] {
            Event::SessionExited { snapshot, .. } => {
                assert_eq!(snapshot.elapsed_seconds, 7);
                assert_eq!(snapshot.phase, Phase::Paused);
                assert_eq!(snapshot.pause_reason, PauseReason::Manual);
            }
            other => panic!("expected SessionExited, got {other:?}"),
        }
        assert!(c.phase().is_terminal());
        assert!(c.handle(SessionEvent::Tick).is_empty());
    }

    #[tokio::test]
    async fn restore_resumes_from_snapshot_elapsed() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let snapshot = Snapshot {
            study_seconds: 100,
            break_interval_seconds: 0,
            break_duration_seconds: 0,
            elapsed_seconds: 40,
            phase: Phase::Paused,
            pause_reason: PauseReason::Manual,
        };
        let mut c = SessionController::restore(&snapshot, tx);
        assert_eq!(c.phase(), Phase::Idle);

        c.handle(SessionEvent::MaterialLoaded);
        assert_eq!(c.phase(), Phase::Running);
        assert_eq!(c.state().elapsed_seconds, 40);
        assert_eq!(c.state().remaining_seconds, 60);
        assert_eq!(c.state().pause_reason, PauseReason::None);
    }

    #[tokio::test]
    async fn restore_into_break_restarts_break_countdown() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let snapshot = Snapshot {
            study_seconds: 100,
            break_interval_seconds: 50,
            break_duration_seconds: 10,
            elapsed_seconds: 50,
            phase: Phase::Break,
            pause_reason: PauseReason::None,
        };
        let mut c = SessionController::restore(&snapshot, tx);
        c.handle(SessionEvent::MaterialLoaded);
        assert_eq!(c.phase(), Phase::Break);
        assert_eq!(c.state().remaining_seconds, 10);
        assert_eq!(c.state().elapsed_seconds, 50);
    }

    #[tokio::test]
    async fn pages_track_the_highest_page_reached() {
        let mut c = started(SessionConfig::new(100, 0, 0).with_page_goal(5));
        let events = c.handle(SessionEvent::PageRead { page: 3 });
        assert!(matches!(
            events[0],
            Event::PageRead { page: 3, pages_read: 3, page_goal: 5, .. }
        ));
        // Paging backwards does not lose progress.
        assert!(c.handle(SessionEvent::PageRead { page: 2 }).is_empty());
        assert_eq!(c.state().pages_read, 3);
    }

    #[tokio::test]
    async fn pause_reason_invariant_holds_across_a_noisy_run() {
        let mut c = started(SessionConfig::new(50, 10, 3));
        c.handle(SessionEvent::FullscreenEntered);
        let script = [
            SessionEvent::Tick,
            SessionEvent::PresenceChanged { present: false },
            SessionEvent::Tick,
            SessionEvent::GraceElapsed,
            SessionEvent::PresenceChanged { present: true },
            SessionEvent::Resume,
            SessionEvent::ManualPause,
            SessionEvent::PresenceChanged { present: false },
            SessionEvent::GraceElapsed,
            SessionEvent::Resume,
            SessionEvent::FullscreenExited,
            SessionEvent::FullscreenEntered,
            SessionEvent::Resume,
            SessionEvent::Tick,
        ];
        let mut last_elapsed = 0;
        for event in script {
            c.handle(event);
            let state = c.state();
            assert!(invariant_holds(&state), "invariant broken at {state:?}");
            assert!(state.elapsed_seconds >= last_elapsed, "elapsed went backwards");
            assert!(state.elapsed_seconds <= 50);
            last_elapsed = state.elapsed_seconds;
        }
    }
}
