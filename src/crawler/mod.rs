//! Crawler module: getting pages analyzed
//!
//! This module contains the job pipeline, including:
//! - HTTP fetching with redirect tracking and a body size cap
//! - HTML parsing into the facts checks evaluate
//! - Tenant-fair job scheduling with retries and leases
//! - The coordinator and its worker pool

mod coordinator;
mod fetcher;
mod page;
mod parser;
mod scheduler;

pub use coordinator::{Coordinator, WorkerPool};
pub use fetcher::{build_http_client, FetchError, FetchErrorKind, Fetcher};
pub use page::{Page, RedirectHop};
pub use parser::{parse_html, Heading, Image, Link, LinkTarget, ParsedPage};
pub use scheduler::{
    backoff_delay, Assignment, Dispatch, FailOutcome, Scheduler, SchedulerStats,
};
