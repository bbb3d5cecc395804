use crate::state::JobState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use url::Url;
use uuid::Uuid;

/// Opaque identifier of an analysis job
pub type JobId = Uuid;

/// Per-request analysis options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Redirect hops followed before the fetch fails
    pub max_redirects: u32,

    /// Total fetch budget, redirects and robots.txt included (milliseconds)
    pub fetch_timeout_ms: u64,

    /// Subset of registered check ids to run; `None` runs all of them
    pub checks: Option<BTreeSet<String>>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_redirects: 5,
            fetch_timeout_ms: 10_000,
            checks: None,
        }
    }
}

/// Coarse classification of a failure for API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Rejected synchronously; nothing was enqueued
    InvalidInput,
    /// Retried automatically
    Transient,
    /// Will not succeed without a change on the client's side
    Terminal,
    /// A check crashed; contained in its result
    Internal,
}

/// What went wrong on a job's most recent failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    Network,
    Timeout,
    HttpStatus,
    TooManyRedirects,
    DeadlineExceeded,
    WorkerLost,
    EngineFatal,
    Cancelled,
    StoreUnavailable,
}

impl ErrorKind {
    /// Maps the kind onto the client-facing failure class
    ///
    /// `HttpStatus` depends on the code, so callers with a status should use
    /// [`JobError::is_transient`].
    pub fn class(&self) -> FailureClass {
        match self {
            Self::InvalidUrl => FailureClass::InvalidInput,
            Self::Network | Self::Timeout | Self::WorkerLost => FailureClass::Transient,
            Self::HttpStatus
            | Self::TooManyRedirects
            | Self::DeadlineExceeded
            | Self::EngineFatal
            | Self::Cancelled
            | Self::StoreUnavailable => FailureClass::Terminal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::TooManyRedirects => "too_many_redirects",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::WorkerLost => "worker_lost",
            Self::EngineFatal => "engine_fatal",
            Self::Cancelled => "cancelled",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true for HTTP statuses worth retrying later
pub fn is_retryable_status(code: u16) -> bool {
    code >= 500 || code == 408 || code == 429
}

/// Failure record attached to a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
    pub status_code: Option<u16>,

    /// Whether the failure was eligible for retry
    pub transient: bool,
}

impl JobError {
    /// Builds an error, deriving `transient` from the kind and status
    pub fn new(kind: ErrorKind, message: impl Into<String>, status_code: Option<u16>) -> Self {
        let transient = match (kind, status_code) {
            (ErrorKind::HttpStatus, Some(code)) => is_retryable_status(code),
            _ => kind.class() == FailureClass::Transient,
        };
        Self {
            kind,
            message: message.into(),
            status_code,
            transient,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn class(&self) -> FailureClass {
        if self.transient {
            FailureClass::Transient
        } else {
            match self.kind.class() {
                FailureClass::Transient => FailureClass::Terminal,
                other => other,
            }
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} ({}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Snapshot of one analysis job as tracked by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: String,
    pub url: Url,
    pub options: AnalysisOptions,
    pub state: JobState,

    /// Attempts started so far; the running attempt is included
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<JobError>,
}

impl Job {
    pub fn new(tenant_id: String, url: Url, options: AnalysisOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            url,
            options,
            state: JobState::Queued,
            attempts: 0,
            created_at: now,
            updated_at: now,
            last_error: None,
        }
    }

    /// Moves the job to `state`, ignoring transitions out of terminal states
    ///
    /// Returns true if the state changed.
    pub fn transition(&mut self, state: JobState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = state;
        self.updated_at = Utc::now();
        true
    }
}
