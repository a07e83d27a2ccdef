use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Per-session configuration. Immutable once the session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Total study target in seconds.
    pub study_seconds: u64,
    /// Seconds of study between breaks. 0 disables breaks.
    pub break_interval_seconds: u64,
    /// Length of each break in seconds.
    pub break_duration_seconds: u64,
    /// Pages the user aims to read this session.
    pub page_goal: u32,
}

impl SessionConfig {
    pub fn new(
        study_seconds: u64,
        break_interval_seconds: u64,
        break_duration_seconds: u64,
    ) -> Self {
        Self {
            study_seconds,
            break_interval_seconds,
            break_duration_seconds,
            page_goal: default_page_goal(),
        }
    }

    pub fn with_page_goal(mut self, page_goal: u32) -> Self {
        self.page_goal = page_goal;
        self
    }

    /// Whether periodic breaks are enabled.
    pub fn breaks_enabled(&self) -> bool {
        self.break_interval_seconds > 0
    }

    /// A zero-length study target can never run.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.study_seconds == 0 {
            return Err(ValidationError::InvalidValue {
                field: "study_seconds".into(),
                message: "study duration must be at least one second".into(),
            });
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    /// 25 minutes of study, a 5-minute break every 25 minutes, 10 pages.
    fn default() -> Self {
        Self {
            study_seconds: 25 * 60,
            break_interval_seconds: 25 * 60,
            break_duration_seconds: 5 * 60,
            page_goal: default_page_goal(),
        }
    }
}

fn default_page_goal() -> u32 {
    10
}
