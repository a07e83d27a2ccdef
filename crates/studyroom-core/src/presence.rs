//! Presence debouncing.
//!
//! The presence detector delivers raw boolean-with-confidence readings at
//! its own cadence (~2-3 Hz, anything down to 0.5 Hz is tolerated). Single
//! readings are noisy; a lone flicker must not toggle the session timer.
//! The debouncer tracks separate streaks for the "present" and "absent"
//! hypotheses and only flips its stable output after CONFIRM_THRESHOLD
//! consecutive identical readings, staying responsive within about two
//! sample periods.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consecutive identical readings required before the stable value flips.
pub const CONFIRM_THRESHOLD: u32 = 2;

/// Readings below this confidence count as absent.
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.5;

/// A single raw reading from the presence detector. Ephemeral -- never
/// persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PresenceSignal {
    pub present: bool,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
    pub at: DateTime<Utc>,
}

impl PresenceSignal {
    pub fn new(present: bool, confidence: f32) -> Self {
        Self {
            present,
            confidence: confidence.clamp(0.0, 1.0),
            at: Utc::now(),
        }
    }
}

/// Converts noisy raw presence readings into a stable boolean with
/// hysteresis.
#[derive(Debug, Clone)]
pub struct PresenceDebouncer {
    confidence_floor: f32,
    present_streak: u32,
    absent_streak: u32,
    last_stable: bool,
}

impl PresenceDebouncer {
    /// Debouncer with the default confidence floor. The session starts
    /// with the user treated as absent until the detector confirms them.
    pub fn new() -> Self {
        Self::with_confidence_floor(DEFAULT_CONFIDENCE_FLOOR)
    }

    pub fn with_confidence_floor(confidence_floor: f32) -> Self {
        Self {
            confidence_floor,
            present_streak: 0,
            absent_streak: 0,
            last_stable: false,
        }
    }

    /// Current stable value.
    pub fn stable(&self) -> bool {
        self.last_stable
    }

    /// Feed a raw reading. Returns `Some(new_stable)` only when the
    /// stable value flips; `None` while a streak is still building or
    /// the reading agrees with the stable value.
    pub fn observe(&mut self, signal: &PresenceSignal) -> Option<bool> {
        // Low-confidence detections count as absent.
        let present = signal.present && signal.confidence >= self.confidence_floor;

        if present {
            self.present_streak += 1;
            self.absent_streak = 0;
            if !self.last_stable && self.present_streak >= CONFIRM_THRESHOLD {
                self.last_stable = true;
                return Some(true);
            }
        } else {
            self.absent_streak += 1;
            self.present_streak = 0;
            if self.last_stable && self.absent_streak >= CONFIRM_THRESHOLD {
                self.last_stable = false;
                return Some(false);
            }
        }
        None
    }
}

impl Default for PresenceDebouncer {
    fn default() -> Self {
        Self::new()
    }
}
