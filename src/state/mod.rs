//! State module for tracking analysis jobs
//!
//! # Components
//!
//! - `JobState`: The lifecycle state of a job (queued, running, terminal outcomes)
//! - `Job`: A job snapshot with its options, attempt counter and last error
//! - `TenantLane`: Per-tenant queue and running counter used for quota enforcement

mod job;
mod job_state;
mod tenant_state;

// Re-export main types
pub use job::{is_retryable_status, AnalysisOptions, ErrorKind, FailureClass, Job, JobError, JobId};
pub use job_state::JobState;
pub use tenant_state::{QueuedJob, TenantLane};
