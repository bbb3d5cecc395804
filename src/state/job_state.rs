/// Job state definitions for tracking analysis progress
///
/// This module defines every state a job can be in between submission and
/// its final outcome.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a job in the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    // ===== Active States =====
    /// Job is waiting for a worker (first attempt or a retry in backoff)
    Queued,

    /// Job is held by a worker
    Running,

    // ===== Terminal States =====
    /// Analysis completed and the result was persisted
    Succeeded,

    /// Analysis failed terminally or exhausted its attempts
    Failed,

    /// Job was cancelled before it finished
    Cancelled,

    /// Analysis completed but the result store rejected every write
    Unpersisted,
}

impl JobState {
    /// Returns true if this is a terminal state (no further transitions)
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if the job still occupies tenant quota
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Converts the job state to its storage string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unpersisted => "unpersisted",
        }
    }

    /// Parses a job state from its storage string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "unpersisted" => Some(Self::Unpersisted),
            _ => None,
        }
    }

    /// Returns all possible job states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Queued,
            Self::Running,
            Self::Succeeded,
            Self::Failed,
            Self::Cancelled,
            Self::Unpersisted,
        ]
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
