//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the AutoSEO result database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per finished job; job_id makes persistence idempotent
CREATE TABLE IF NOT EXISTS analysis_results (
    job_id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    url TEXT NOT NULL,
    overall_score INTEGER NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    error TEXT,
    check_results TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    stored_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_results_tenant ON analysis_results(tenant_id, completed_at);
CREATE INDEX IF NOT EXISTS idx_results_status ON analysis_results(status);

-- Issues flattened out of check_results for reporting queries
CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL REFERENCES analysis_results(job_id),
    check_id TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    locator TEXT
);

CREATE INDEX IF NOT EXISTS idx_issues_job ON issues(job_id);
CREATE INDEX IF NOT EXISTS idx_issues_severity ON issues(severity);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", get_schema_version())?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}
