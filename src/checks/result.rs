use crate::state::{Job, JobError, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How much an issue matters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse risk rating of a page, from the number of actionable issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
}

impl RiskLevel {
    /// Warnings and criticals at or above this count make a page `Medium`
    pub const MEDIUM_THRESHOLD: usize = 3;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single problem reported by a check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub check_id: String,
    pub severity: Severity,
    pub message: String,

    /// Where in the page the problem is (an element, URL or header)
    pub locator: Option<String>,
}

/// Outcome of one check on one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: String,

    /// 0 to 100
    pub sub_score: u8,

    pub issues: Vec<Issue>,

    /// Named counters the check measured (link counts, byte sizes, ...)
    #[serde(default)]
    pub metrics: BTreeMap<String, u64>,

    pub duration_ms: u64,
}

impl CheckResult {
    /// Result recorded when a check errored, panicked or timed out
    pub fn failed(check_id: &str, reason: &str, duration_ms: u64) -> Self {
        Self {
            check_id: check_id.to_string(),
            sub_score: 0,
            issues: vec![Issue {
                check_id: check_id.to_string(),
                severity: Severity::Critical,
                message: format!("check failed: {}", reason),
                locator: None,
            }],
            metrics: BTreeMap::new(),
            duration_ms,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Succeeded,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// The record handed to the result store once a job finishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub job_id: JobId,
    pub tenant_id: String,
    pub url: String,
    pub overall_score: u8,

    /// One entry per check that ran, in registration order
    pub check_results: Vec<CheckResult>,
    pub completed_at: DateTime<Utc>,
    pub status: AnalysisStatus,

    /// Attempt that produced this record
    pub attempts: u32,

    /// Why the analysis failed; `None` on success
    pub error: Option<JobError>,
}

impl AnalysisResult {
    /// Record for a job that ended without analyzing the page
    pub fn failed(job: &Job, error: JobError) -> Self {
        Self {
            job_id: job.id,
            tenant_id: job.tenant_id.clone(),
            url: job.url.to_string(),
            overall_score: 0,
            check_results: Vec::new(),
            completed_at: Utc::now(),
            status: AnalysisStatus::Failed,
            attempts: job.attempts,
            error: Some(error),
        }
    }

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.check_results.iter().flat_map(|r| r.issues.iter())
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.check_results.iter().map(|r| r.count(severity)).sum()
    }

    pub fn check(&self, check_id: &str) -> Option<&CheckResult> {
        self.check_results.iter().find(|r| r.check_id == check_id)
    }

    /// All issues, most severe first
    ///
    /// Issues of equal severity keep registration order, so the view is
    /// the same for the same page every time.
    pub fn prioritized_issues(&self) -> Vec<&Issue> {
        let mut issues: Vec<&Issue> = self.issues().collect();
        issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        issues
    }

    pub fn risk_level(&self) -> RiskLevel {
        let actionable = self.issues().filter(|i| i.severity > Severity::Info).count();
        if actionable < RiskLevel::MEDIUM_THRESHOLD {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        }
    }
}
