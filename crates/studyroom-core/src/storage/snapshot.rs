//! Reload-recovery snapshot storage.
//!
//! A single JSON file in the data directory holds at most one snapshot
//! per session identity. The snapshot is a flat record of the session
//! config and clock position; the study material itself is deliberately
//! excluded (the storage medium is small, and restore re-prompts for the
//! material instead).
//!
//! `load` consumes: a successfully read snapshot is deleted on the way
//! out, so a crash loop can never restore the same session twice.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::SnapshotError;
use crate::session::{PauseReason, Phase, SessionConfig};

const SNAPSHOT_FILE: &str = "session.json";

/// Serialized session state for reload recovery. Every field is
/// required; a record missing any of them is malformed and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub study_seconds: u64,
    pub break_interval_seconds: u64,
    pub break_duration_seconds: u64,
    pub elapsed_seconds: u64,
    pub phase: Phase,
    pub pause_reason: PauseReason,
}

impl Snapshot {
    /// The session configuration this snapshot was taken under. The page
    /// goal is not part of the snapshot record and comes back as the
    /// default.
    pub fn config(&self) -> SessionConfig {
        SessionConfig::new(
            self.study_seconds,
            self.break_interval_seconds,
            self.break_duration_seconds,
        )
    }
}

/// File-backed snapshot store.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store at `~/.config/studyroom/session.json`.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            path: data_dir()?.join(SNAPSHOT_FILE),
        })
    }

    /// Store at an explicit path (tests, alternate profiles).
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Whether a snapshot file is present, without consuming it.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the snapshot, overwriting any prior one.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&self.path, json).map_err(|source| SnapshotError::WriteFailed {
            path: self.path.clone(),
            source,
        })
    }

    /// Read and consume the snapshot.
    ///
    /// Returns `None` when no snapshot exists. A malformed or partial
    /// record is logged, discarded and reported as `None` -- corruption
    /// is never fatal and never survives to a second load.
    pub fn load(&self) -> Option<Snapshot> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        // Consume before parsing: whatever happens next, this file must
        // not be offered again on the following launch.
        if let Err(err) = self.clear() {
            tracing::warn!(error = %err, "failed to consume snapshot file");
        }
        match serde_json::from_str::<Snapshot>(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed session snapshot");
                None
            }
        }
    }

    /// Delete any stored snapshot. Idempotent.
    pub fn clear(&self) -> Result<(), SnapshotError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SnapshotError::ClearFailed {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
