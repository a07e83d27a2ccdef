//! Fullscreen transition tracking.
//!
//! The environment integration layer reports the current fullscreen state
//! whenever it changes. Browsers fire the change event once per vendor
//! prefix, so the guard keeps the last-known boolean and suppresses
//! duplicate reports; it holds no other state.

/// A deduplicated fullscreen transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenTransition {
    Entered,
    Exited,
}

#[derive(Debug, Clone, Default)]
pub struct FullscreenGuard {
    last_active: Option<bool>,
}

impl FullscreenGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the reported fullscreen state. Returns a transition only when
    /// the state actually changed since the last report.
    pub fn observe(&mut self, active: bool) -> Option<FullscreenTransition> {
        if self.last_active == Some(active) {
            return None;
        }
        self.last_active = Some(active);
        Some(if active {
            FullscreenTransition::Entered
        } else {
            FullscreenTransition::Exited
        })
    }
}
