//! SEO checks and the engine that runs them
//!
//! A check is a pure function from a fetched page (plus its parsed markup)
//! to a sub-score and a list of issues. Checks live in an ordered
//! [`CheckRegistry`]; the [`CheckEngine`] runs the selected ones
//! concurrently and returns their results in registration order.

pub mod content;
mod engine;
pub mod links;
pub mod media;
mod registry;
mod result;
pub mod technical;

pub use engine::{CheckEngine, EngineError};
pub use registry::{CheckRegistry, Registration, RegistryError};
pub use result::{AnalysisResult, AnalysisStatus, CheckResult, Issue, RiskLevel, Severity};

use crate::crawler::{Page, ParsedPage};
use std::collections::BTreeMap;
use thiserror::Error;

/// Everything a check may look at
#[derive(Debug)]
pub struct CheckInput {
    pub page: Page,
    pub parsed: ParsedPage,
}

/// A finding before the engine attributes it to a check id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
    pub locator: Option<String>,
}

/// What a check returns on success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub sub_score: u8,
    pub findings: Vec<Finding>,
    pub metrics: BTreeMap<String, u64>,
}

impl CheckOutcome {
    /// A full score with nothing to report
    pub fn perfect() -> Self {
        Self {
            sub_score: 100,
            findings: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// Lowers the sub-score to at most `ceiling`
    pub fn limit(&mut self, ceiling: u8) {
        self.sub_score = self.sub_score.min(ceiling);
    }

    /// Subtracts `points`, stopping at zero
    pub fn deduct(&mut self, points: u8) {
        self.sub_score = self.sub_score.saturating_sub(points);
    }

    pub fn report(&mut self, severity: Severity, message: impl Into<String>, locator: Option<String>) {
        self.findings.push(Finding {
            severity,
            message: message.into(),
            locator,
        });
    }

    pub fn critical(&mut self, message: impl Into<String>) {
        self.report(Severity::Critical, message, None);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.report(Severity::Warning, message, None);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.report(Severity::Info, message, None);
    }

    pub fn metric(&mut self, name: &str, value: usize) {
        self.metrics.insert(name.to_string(), value as u64);
    }
}

/// Error a check may return instead of an outcome
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// An independent SEO rule
///
/// Implementations must not depend on other checks' results and must be
/// safe to run on any thread.
pub trait Check: Send + Sync {
    /// Stable identifier, unique within a registry
    fn id(&self) -> &str;

    fn evaluate(&self, input: &CheckInput) -> Result<CheckOutcome, CheckError>;
}
