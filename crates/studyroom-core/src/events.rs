use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{PauseReason, SessionConfig, SessionState};
use crate::storage::Snapshot;

/// Every state change in the session produces an Event.
/// The UI layer subscribes to these for timer text, dialogs and alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Material was loaded and the session began ticking.
    SessionStarted {
        config: SessionConfig,
        at: DateTime<Utc>,
    },
    /// The session was suspended. `reason` tells which trigger fired.
    SessionPaused {
        reason: PauseReason,
        elapsed_secs: u64,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    /// The session returned to its prior running/break phase.
    SessionResumed {
        elapsed_secs: u64,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    /// The break interval was reached; the study countdown is frozen.
    BreakStarted {
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// The break countdown reached zero. The session stays in Break
    /// until an explicit resume -- it never auto-resumes.
    BreakFinished {
        at: DateTime<Utc>,
    },
    /// The user returned after a presence-loss pause. Surfaces the
    /// resume affordance; resuming still requires an explicit action.
    PresenceRestored {
        at: DateTime<Utc>,
    },
    /// The presence source cannot be acquired; presence-based pausing
    /// is disabled for the rest of the session. Emitted once.
    PresenceMonitoringDisabled {
        at: DateTime<Utc>,
    },
    FullscreenChanged {
        active: bool,
        at: DateTime<Utc>,
    },
    /// A page of the material was read (goal tracking).
    PageRead {
        page: u32,
        pages_read: u32,
        page_goal: u32,
        at: DateTime<Utc>,
    },
    /// The study target was reached. Terminal.
    SessionEnded {
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    /// The user exited mid-session; the snapshot is handed to the
    /// store for reload recovery. Terminal.
    SessionExited {
        snapshot: Snapshot,
        at: DateTime<Utc>,
    },
    /// A prior session was recovered from a snapshot.
    SessionRestored {
        elapsed_secs: u64,
        at: DateTime<Utc>,
    },
    /// Full state snapshot, published after every processed event.
    StateChanged {
        state: SessionState,
        at: DateTime<Utc>,
    },
}
