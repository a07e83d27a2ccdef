//! Tick source and absence grace timer.
//!
//! Both handles are owned exclusively by the session controller; nothing
//! else may start or stop them. They emit into the controller's event
//! queue, so timer expiry is serialized with every other input and can
//! never race a user action.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::controller::SessionEvent;

/// Monotonic 1 Hz tick source.
///
/// `start` is idempotent: starting while a clock task is live is a no-op,
/// so there is never more than one ticking task per controller. Ticks
/// missed across a machine suspend are coalesced rather than replayed;
/// elapsed time advances one second per delivered tick and never moves
/// backwards.
#[derive(Debug, Default)]
pub struct Clock {
    task: Option<JoinHandle<()>>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Begin emitting [`SessionEvent::Tick`] once per second. No-op if a
    /// clock task is already live.
    pub fn start(&mut self, tx: &UnboundedSender<SessionEvent>) {
        if self.is_running() {
            return;
        }
        let tx = tx.clone();
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; the session counts whole
            // seconds, so swallow it.
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(SessionEvent::Tick).is_err() {
                    break;
                }
            }
        }));
    }

    /// Stop ticking. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One-shot timer between a confirmed absence and the actual pause.
///
/// At most one grace period is outstanding; arming again replaces the
/// previous one, and `cancel` aborts the pending expiry outright rather
/// than leaving it to be ignored on arrival.
#[derive(Debug, Default)]
pub struct GraceTimer {
    task: Option<JoinHandle<()>>,
}

impl GraceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Arm the timer; after `grace` elapses uninterrupted, a
    /// [`SessionEvent::GraceElapsed`] lands on the queue.
    pub fn arm(&mut self, tx: &UnboundedSender<SessionEvent>, grace: Duration) {
        self.cancel();
        let tx = tx.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(SessionEvent::GraceElapsed);
        }));
    }

    /// Abort any pending expiry. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for GraceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
