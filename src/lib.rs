//! AutoSEO: a multi-tenant SEO crawl-and-score pipeline
//!
//! This crate turns a submitted `(tenant, url, options)` request into a
//! scored [`AnalysisResult`](checks::AnalysisResult). Pages are fetched
//! asynchronously by a bounded worker pool, evaluated by an ordered registry
//! of independent checks, scored deterministically, and written to a
//! pluggable result store.

pub mod checks;
pub mod config;
pub mod crawler;
pub mod robots;
pub mod scoring;
pub mod state;
pub mod storage;
pub mod tenant;
pub mod url;

use thiserror::Error;

/// Main error type for AutoSEO operations
#[derive(Debug, Error)]
pub enum SeoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StoreError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Check registry error: {0}")]
    Registry(#[from] checks::RegistryError),

    #[error("Submission rejected: {0}")]
    Submit(#[from] SubmitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Reasons an analysis request is rejected at submission time
///
/// Every variant is an `InvalidInput` failure: nothing was enqueued.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error("Unknown tenant: {0}")]
    UnknownTenant(String),

    #[error("Tenant {tenant_id} already has {in_flight} queued or running jobs (limit {max_queue_depth})")]
    QuotaExceeded {
        tenant_id: String,
        in_flight: u32,
        max_queue_depth: u32,
    },

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Scheduler is shutting down")]
    ShuttingDown,
}

/// Errors returned by job cancellation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CancelError {
    #[error("Job not found: {0}")]
    NotFound(state::JobId),
}

/// Result type alias for AutoSEO operations
pub type Result<T> = std::result::Result<T, SeoError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use checks::{AnalysisResult, AnalysisStatus, CheckResult, Issue, RiskLevel, Severity};
pub use config::Config;
pub use crawler::{Coordinator, Fetcher, Page, WorkerPool};
pub use state::{AnalysisOptions, ErrorKind, Job, JobError, JobId, JobState};
pub use tenant::{QuotaProvider, TenantQuota};
