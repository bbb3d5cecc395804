//! SQLite result store
//!
//! A single connection guarded by a mutex; every call runs on tokio's
//! blocking pool so the async workers never wait on disk I/O.

use crate::checks::{AnalysisResult, AnalysisStatus, CheckResult, Severity};
use crate::state::{JobError, JobId};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{PersistOutcome, ResultStore, StoreError, StoreResult};
use crate::storage::StoreStats;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

const RESULT_COLUMNS: &str = "job_id, tenant_id, url, overall_score, status, attempts, error, \
                              check_results, completed_at";

/// SQLite-backed [`ResultStore`]
#[derive(Debug, Clone)]
pub struct SqliteResultStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteResultStore {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }
}

fn insert_result(conn: &mut Connection, result: &AnalysisResult) -> StoreResult<PersistOutcome> {
    let check_results = serde_json::to_string(&result.check_results)?;
    let error = result.error.as_ref().map(serde_json::to_string).transpose()?;
    let job_id = result.job_id.to_string();

    let tx = conn.transaction()?;
    let inserted = tx.execute(
        "INSERT INTO analysis_results
            (job_id, tenant_id, url, overall_score, status, attempts, error,
             check_results, completed_at, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(job_id) DO NOTHING",
        params![
            job_id,
            result.tenant_id,
            result.url,
            result.overall_score,
            result.status.as_str(),
            result.attempts,
            error,
            check_results,
            result.completed_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
        ],
    )?;

    if inserted == 0 {
        return Ok(PersistOutcome::Duplicate);
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO issues (job_id, check_id, severity, message, locator)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for issue in result.issues() {
            stmt.execute(params![
                job_id,
                issue.check_id,
                issue.severity.as_str(),
                issue.message,
                issue.locator,
            ])?;
        }
    }

    tx.commit()?;
    Ok(PersistOutcome::Inserted)
}

/// Raw column values; decoded outside the rusqlite row callback
struct ResultRow {
    job_id: String,
    tenant_id: String,
    url: String,
    overall_score: u8,
    status: String,
    attempts: u32,
    error: Option<String>,
    check_results: String,
    completed_at: String,
}

impl ResultRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            job_id: row.get(0)?,
            tenant_id: row.get(1)?,
            url: row.get(2)?,
            overall_score: row.get(3)?,
            status: row.get(4)?,
            attempts: row.get(5)?,
            error: row.get(6)?,
            check_results: row.get(7)?,
            completed_at: row.get(8)?,
        })
    }

    fn decode(self) -> StoreResult<AnalysisResult> {
        let job_id = JobId::parse_str(&self.job_id)
            .map_err(|e| StoreError::Serialization(format!("bad job id {}: {}", self.job_id, e)))?;
        let status = AnalysisStatus::from_db_string(&self.status)
            .ok_or_else(|| StoreError::Serialization(format!("unknown status {}", self.status)))?;
        let completed_at = DateTime::parse_from_rfc3339(&self.completed_at)
            .map_err(|e| StoreError::Serialization(e.to_string()))?
            .with_timezone(&Utc);
        let check_results: Vec<CheckResult> = serde_json::from_str(&self.check_results)?;
        let error: Option<JobError> = self
            .error
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(AnalysisResult {
            job_id,
            tenant_id: self.tenant_id,
            url: self.url,
            overall_score: self.overall_score,
            check_results,
            completed_at,
            status,
            attempts: self.attempts,
            error,
        })
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn persist(&self, result: &AnalysisResult) -> StoreResult<PersistOutcome> {
        let result = result.clone();
        self.with_conn(move |conn| insert_result(conn, &result)).await
    }

    async fn get(&self, job_id: JobId) -> StoreResult<Option<AnalysisResult>> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM analysis_results WHERE job_id = ?1", RESULT_COLUMNS),
                    params![job_id.to_string()],
                    ResultRow::from_row,
                )
                .optional()?;
            row.map(ResultRow::decode).transpose()
        })
        .await
    }

    async fn list_for_tenant(&self, tenant_id: &str, limit: usize) -> StoreResult<Vec<AnalysisResult>> {
        let tenant_id = tenant_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM analysis_results WHERE tenant_id = ?1
                 ORDER BY completed_at DESC, rowid DESC LIMIT ?2",
                RESULT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![tenant_id, limit as i64], ResultRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(ResultRow::decode).collect()
        })
        .await
    }

    async fn count(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM analysis_results", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        self.with_conn(|conn| {
            let mut stats = StoreStats::default();

            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*), AVG(overall_score) FROM analysis_results GROUP BY status",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                let average: Option<f64> = row.get(2)?;
                stats.results += count as u64;
                match AnalysisStatus::from_db_string(&status) {
                    Some(AnalysisStatus::Succeeded) => {
                        stats.succeeded = count as u64;
                        stats.average_score = average;
                    }
                    Some(AnalysisStatus::Failed) => stats.failed = count as u64,
                    None => {}
                }
            }

            let mut stmt = conn.prepare("SELECT severity, COUNT(*) FROM issues GROUP BY severity")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let severity: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                if let Some(severity) = Severity::from_db_string(&severity) {
                    stats.issues.insert(severity, count as u64);
                }
            }

            Ok(stats)
        })
        .await
    }
}
