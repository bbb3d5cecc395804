use crate::checks::{CheckInput, CheckRegistry, CheckResult, Issue, Registration};
use crate::crawler::{parse_html, Page};
use futures::future::join_all;
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Failure of the engine itself, as opposed to a single check
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("markup parsing crashed: {0}")]
    Parse(String),
}

/// Runs registered checks against a page
#[derive(Debug, Clone)]
pub struct CheckEngine {
    registry: Arc<CheckRegistry>,
    check_timeout: Duration,
}

impl CheckEngine {
    pub fn new(registry: Arc<CheckRegistry>, check_timeout: Duration) -> Self {
        Self {
            registry,
            check_timeout,
        }
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    /// Parses the page once and runs the selected checks over it
    ///
    /// `selected = None` runs every registered check. Results come back in
    /// registration order whatever order the checks finish in.
    pub async fn analyze(
        &self,
        page: Page,
        selected: Option<&BTreeSet<String>>,
    ) -> Result<Vec<CheckResult>, EngineError> {
        let input = tokio::task::spawn_blocking(move || {
            let parsed = parse_html(&page.body, &page.url);
            CheckInput { page, parsed }
        })
        .await
        .map_err(|e| EngineError::Parse(join_error_reason(e)))?;

        Ok(self.run(Arc::new(input), selected).await)
    }

    /// Runs the selected checks over an already parsed input
    pub async fn run(
        &self,
        input: Arc<CheckInput>,
        selected: Option<&BTreeSet<String>>,
    ) -> Vec<CheckResult> {
        let tasks = self
            .registry
            .iter()
            .filter(|r| selected.map_or(true, |ids| ids.contains(r.id())))
            .map(|registration| self.run_one(registration.clone(), Arc::clone(&input)));

        // join_all yields outputs in the order the futures were supplied
        join_all(tasks).await
    }

    async fn run_one(&self, registration: Registration, input: Arc<CheckInput>) -> CheckResult {
        let check_id = registration.id().to_string();
        let started = Instant::now();
        let check = Arc::clone(&registration.check);
        let handle = tokio::task::spawn_blocking(move || check.evaluate(&input));

        let outcome = match tokio::time::timeout(self.check_timeout, handle).await {
            Ok(Ok(Ok(outcome))) => Ok(outcome),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(e)) => Err(join_error_reason(e)),
            Err(_) => Err(format!(
                "timed out after {}ms",
                self.check_timeout.as_millis()
            )),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(outcome) => {
                debug!(
                    "Check {} scored {} with {} issues",
                    check_id,
                    outcome.sub_score,
                    outcome.findings.len()
                );
                CheckResult {
                    issues: outcome
                        .findings
                        .into_iter()
                        .map(|f| Issue {
                            check_id: check_id.clone(),
                            severity: f.severity,
                            message: f.message,
                            locator: f.locator,
                        })
                        .collect(),
                    sub_score: outcome.sub_score.min(100),
                    metrics: outcome.metrics,
                    duration_ms,
                    check_id,
                }
            }
            Err(reason) => {
                warn!("Check {} failed: {}", check_id, reason);
                CheckResult::failed(&check_id, &reason, duration_ms)
            }
        }
    }
}

fn join_error_reason(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task cancelled".to_string();
    }
    panic_message(err.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{Check, CheckError, CheckOutcome, Severity};
    use url::Url;

    struct Slow(&'static str, u64);

    impl Check for Slow {
        fn id(&self) -> &str {
            self.0
        }

        fn evaluate(&self, _input: &CheckInput) -> Result<CheckOutcome, CheckError> {
            std::thread::sleep(Duration::from_millis(self.1));
            let mut outcome = CheckOutcome::perfect();
            outcome.limit(90);
            Ok(outcome)
        }
    }

    struct Panics;

    impl Check for Panics {
        fn id(&self) -> &str {
            "panics"
        }

        fn evaluate(&self, _input: &CheckInput) -> Result<CheckOutcome, CheckError> {
            panic!("deliberate");
        }
    }

    struct Errors;

    impl Check for Errors {
        fn id(&self) -> &str {
            "errors"
        }

        fn evaluate(&self, _input: &CheckInput) -> Result<CheckOutcome, CheckError> {
            Err(CheckError::Failed("no can do".to_string()))
        }
    }

    fn page() -> Page {
        Page::from_html(
            Url::parse("https://example.com/").unwrap(),
            "<html><head><title>t</title></head><body></body></html>",
        )
    }

    fn engine(registry: CheckRegistry, timeout_ms: u64) -> CheckEngine {
        CheckEngine::new(Arc::new(registry), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn test_results_follow_registration_order() {
        let mut registry = CheckRegistry::new();
        registry.register(Slow("first", 80), 1).unwrap();
        registry.register(Slow("second", 0), 1).unwrap();
        registry.register(Slow("third", 30), 1).unwrap();

        let results = engine(registry, 2_000).analyze(page(), None).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.check_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        assert!(results.iter().all(|r| r.sub_score == 90));
    }

    #[tokio::test]
    async fn test_failures_are_contained() {
        let mut registry = CheckRegistry::new();
        registry.register(Slow("ok", 0), 1).unwrap();
        registry.register(Panics, 1).unwrap();
        registry.register(Errors, 1).unwrap();
        registry.register(Slow("slow", 500), 1).unwrap();

        let results = engine(registry, 100).analyze(page(), None).await.unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].sub_score, 90);

        for failed in &results[1..] {
            assert_eq!(failed.sub_score, 0);
            assert_eq!(failed.issues.len(), 1);
            assert_eq!(failed.issues[0].severity, Severity::Critical);
            assert!(failed.issues[0].message.starts_with("check failed: "));
        }
        assert!(results[1].issues[0].message.contains("deliberate"));
        assert!(results[2].issues[0].message.contains("no can do"));
        assert!(results[3].issues[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_selected_subset() {
        let mut registry = CheckRegistry::new();
        registry.register(Slow("a", 0), 1).unwrap();
        registry.register(Slow("b", 0), 1).unwrap();
        registry.register(Slow("c", 0), 1).unwrap();

        let selected: BTreeSet<String> = ["c", "a"].iter().map(|s| s.to_string()).collect();
        let results = engine(registry, 1_000)
            .analyze(page(), Some(&selected))
            .await
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.check_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_issues_carry_check_id() {
        let registry = CheckRegistry::with_defaults(&crate::config::ChecksConfig::default());
        let results = engine(registry, 2_000).analyze(page(), None).await.unwrap();
        assert_eq!(results.len(), 11);
        for result in &results {
            assert!(result.issues.iter().all(|i| i.check_id == result.check_id));
        }
    }
}
