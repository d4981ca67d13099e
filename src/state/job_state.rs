//! Lifecycle states of a crawl job
//!
//! `idle → running → {paused, stopped, completed, failed, crashed}` and
//! `paused → {running, stopped}`. Transitions are the only way status changes.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// No job has been started on this orchestrator
    Idle,

    /// Workers are draining the frontier
    Running,

    /// Workers are parked; frontier and results are intact
    Paused,

    // ===== Terminal States =====
    /// Stopped by the caller
    Stopped,

    /// Frontier exhausted
    Completed,

    /// Unrecoverable error, or swept at startup after a crash
    Failed,

    /// A worker died unexpectedly
    Crashed,
}

impl JobStatus {
    /// Returns true if no further transitions are possible without a new job
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Stopped | Self::Completed | Self::Failed | Self::Crashed
        )
    }

    /// Returns true if the job still holds resumable in-memory state
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Whether the state machine permits moving from `self` to `next`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Idle, Running) => true,
            (Running, Paused | Stopped | Completed | Failed | Crashed) => true,
            (Paused, Running | Stopped) => true,
            // A new job may start once the previous one has ended
            (Stopped | Completed | Failed | Crashed, Running) => true,
            _ => false,
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Crashed => "crashed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "stopped" => Some(Self::Stopped),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "crashed" => Some(Self::Crashed),
            _ => None,
        }
    }

    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::Running,
            Self::Paused,
            Self::Stopped,
            Self::Completed,
            Self::Failed,
            Self::Crashed,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
