//! Storage module for persisting analysis results
//!
//! This module handles the result store that finished jobs are written to:
//! - SQLite database initialization and schema management
//! - Idempotent, per-job result persistence
//! - Per-tenant listing and aggregate statistics
//! - An in-memory store for tests and dry runs

mod memory;
pub mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryResultStore;
pub use sqlite::SqliteResultStore;
pub use traits::{PersistOutcome, ResultStore, StoreError, StoreResult};

use crate::checks::Severity;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Opens or creates a SQLite result store
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_store(path: &Path) -> StoreResult<SqliteResultStore> {
    SqliteResultStore::new(path)
}

/// Aggregate figures over a result store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub results: u64,
    pub succeeded: u64,
    pub failed: u64,

    /// Mean overall score of succeeded results
    pub average_score: Option<f64>,

    /// Stored issues per severity
    pub issues: BTreeMap<Severity, u64>,
}

impl StoreStats {
    pub fn issue_count(&self, severity: Severity) -> u64 {
        self.issues.get(&severity).copied().unwrap_or(0)
    }
}
