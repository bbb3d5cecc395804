//! Result store trait and error types
//!
//! The pipeline only ever talks to a [`ResultStore`]; SQLite and in-memory
//! implementations live beside it and embedders may bring their own.

use crate::checks::AnalysisResult;
use crate::state::JobId;
use crate::storage::StoreStats;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// What a persist call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The result was written
    Inserted,
    /// A result with this job id already exists; nothing was written
    Duplicate,
}

/// Sink for finished analyses
///
/// Writes are at-least-once from the pipeline's side, so `persist` must be
/// idempotent per `job_id`: the first write wins and later ones report
/// [`PersistOutcome::Duplicate`].
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn persist(&self, result: &AnalysisResult) -> StoreResult<PersistOutcome>;

    async fn get(&self, job_id: JobId) -> StoreResult<Option<AnalysisResult>>;

    /// Most recent results for a tenant, newest first
    async fn list_for_tenant(&self, tenant_id: &str, limit: usize) -> StoreResult<Vec<AnalysisResult>>;

    /// Number of stored results
    async fn count(&self) -> StoreResult<u64>;

    /// Aggregate figures over everything stored
    async fn stats(&self) -> StoreResult<StoreStats>;
}
