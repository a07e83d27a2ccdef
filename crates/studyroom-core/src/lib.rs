//! # Studyroom Core Library
//!
//! This library provides the core business logic for Studyroom, a timed
//! study-session tool that pauses itself when the user steps away or
//! leaves distraction-free fullscreen, and recovers a session across a
//! reload. The CLI binary is a thin layer over this library.
//!
//! ## Architecture
//!
//! - **Session Controller**: a state machine fed by one serialized event
//!   queue -- clock ticks, debounced presence flips, fullscreen
//!   transitions and user actions are reduced one at a time against a
//!   single [`SessionState`]
//! - **Presence Debouncer**: hysteresis over noisy boolean-with-confidence
//!   readings from the presence detector
//! - **Storage**: JSON snapshot store for reload recovery, SQLite session
//!   history, and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`SessionController`]: the session state machine
//! - [`SessionService`] / [`SessionHandle`]: the event queue and the
//!   interface handed to UI layers and signal sources
//! - [`PresenceDebouncer`]: raw-signal stabilization
//! - [`SnapshotStore`]: at-most-once reload recovery
//! - [`Database`]: session history and statistics

pub mod error;
pub mod events;
pub mod fullscreen;
pub mod presence;
pub mod session;
pub mod storage;

pub use error::{ConfigError, CoreError, DatabaseError, SnapshotError, ValidationError};
pub use events::Event;
pub use fullscreen::{FullscreenGuard, FullscreenTransition};
pub use presence::{PresenceDebouncer, PresenceSignal};
pub use session::{
    PauseReason, Phase, SessionConfig, SessionController, SessionEvent, SessionHandle,
    SessionService, SessionState,
};
pub use storage::{Config, Database, Snapshot, SnapshotStore};
