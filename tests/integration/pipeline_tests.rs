//! End-to-end job tests: submit, fetch, check, score, store

use crate::common::{create_test_config, eventually, good_page, html, mount_robots, poor_page};
use async_trait::async_trait;
use autoseo::checks::{
    AnalysisStatus, Check, CheckError, CheckInput, CheckOutcome, CheckRegistry, Severity,
};
use autoseo::config::Config;
use autoseo::crawler::Coordinator;
use autoseo::storage::{
    MemoryResultStore, PersistOutcome, ResultStore, SqliteResultStore, StoreError, StoreResult,
    StoreStats,
};
use autoseo::tenant::StaticQuotas;
use autoseo::{AnalysisOptions, AnalysisResult, ErrorKind, JobId, JobState, SubmitError};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(20);

fn coordinator_with_store(config: Config, store: Arc<dyn ResultStore>) -> Coordinator {
    let quotas = Arc::new(StaticQuotas::from_entries(&config.tenants));
    Coordinator::new(config, quotas, store).expect("Failed to build coordinator")
}

fn memory_coordinator(workers: usize) -> (Coordinator, Arc<MemoryResultStore>) {
    let store = Arc::new(MemoryResultStore::new());
    let config = create_test_config(workers, "./unused.db", "");
    (coordinator_with_store(config, store.clone()), store)
}

async fn wait_for(coordinator: &Coordinator, job_id: JobId) -> autoseo::Job {
    tokio::time::timeout(WAIT, coordinator.wait(job_id))
        .await
        .expect("job did not finish in time")
        .expect("job disappeared")
}

#[tokio::test]
async fn test_good_page_scores_perfect_and_is_stored() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(good_page(&base_url)))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("results.db");
    let config = create_test_config(2, db_path.to_str().unwrap(), "");
    let store = Arc::new(SqliteResultStore::new(&db_path).expect("Failed to open store"));
    let coordinator = coordinator_with_store(config, store.clone());
    let pool = coordinator.start();

    let job_id = coordinator
        .submit("acme", &format!("{}/", base_url), AnalysisOptions::default())
        .expect("submission should be accepted");
    let job = wait_for(&coordinator, job_id).await;
    pool.shutdown().await;

    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.attempts, 1);

    let result = store.get(job_id).await.unwrap().expect("result should be stored");
    assert_eq!(result.status, AnalysisStatus::Succeeded);
    assert_eq!(result.tenant_id, "acme");
    assert_eq!(
        result.overall_score, 100,
        "unexpected score: {:#?}",
        result.check_results
    );
    for check in &result.check_results {
        assert_eq!(check.sub_score, 100, "{} lost points: {:?}", check.check_id, check.issues);
    }
    assert_eq!(result.count(Severity::Critical), 0);
    assert_eq!(result.count(Severity::Warning), 0);

    // One result per registered check, in registration order
    let ids: Vec<String> = result.check_results.iter().map(|r| r.check_id.clone()).collect();
    assert_eq!(ids, coordinator.registry().ids());
}

#[tokio::test]
async fn test_short_title_and_missing_description() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello"))
        .respond_with(html(
            "<html><head><title>Hello</title></head><body><h1>Hello</h1></body></html>".to_string(),
        ))
        .mount(&server)
        .await;

    let (coordinator, store) = memory_coordinator(1);
    let pool = coordinator.start();
    let job_id = coordinator
        .submit("acme", &format!("{}/hello", server.uri()), AnalysisOptions::default())
        .unwrap();
    let job = wait_for(&coordinator, job_id).await;
    pool.shutdown().await;

    assert_eq!(job.state, JobState::Succeeded);
    let result = store.get(job_id).await.unwrap().unwrap();

    let title = result.check("title").unwrap();
    assert!(title
        .issues
        .iter()
        .any(|i| i.severity == Severity::Warning && i.message.contains("too short")));

    let description = result.check("meta_description").unwrap();
    assert!(description
        .issues
        .iter()
        .any(|i| i.severity == Severity::Critical && i.message == "Missing meta description"));

    assert!(result.overall_score < 100);

    // The missing description outranks the short title
    let first = result.prioritized_issues()[0];
    assert_eq!(first.severity, Severity::Critical);
}

#[tokio::test]
async fn test_poor_page_scores_low() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(poor_page()))
        .mount(&server)
        .await;

    let (coordinator, store) = memory_coordinator(1);
    let pool = coordinator.start();
    let job_id = coordinator
        .submit("acme", &server.uri(), AnalysisOptions::default())
        .unwrap();
    let job = wait_for(&coordinator, job_id).await;
    pool.shutdown().await;

    assert_eq!(job.state, JobState::Succeeded);
    let result = store.get(job_id).await.unwrap().unwrap();
    assert!(result.overall_score < 50, "got {}", result.overall_score);
    assert!(result.count(Severity::Critical) >= 3);
    assert_eq!(result.check("title").unwrap().sub_score, 0);
    assert_eq!(result.check("h1").unwrap().sub_score, 0);
}

#[tokio::test]
async fn test_slow_server_fails_with_timeout_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html(good_page(&server.uri())).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let (coordinator, store) = memory_coordinator(1);
    let pool = coordinator.start();
    let options = AnalysisOptions {
        fetch_timeout_ms: 100,
        ..AnalysisOptions::default()
    };
    let job_id = coordinator
        .submit("acme", &format!("{}/slow", server.uri()), options)
        .unwrap();
    let job = wait_for(&coordinator, job_id).await;
    pool.shutdown().await;

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 3);
    let error = job.last_error.expect("failed job should carry its error");
    assert_eq!(error.kind, ErrorKind::Timeout);
    assert!(error.transient);

    // The failure is recorded too
    let result = store.get(job_id).await.unwrap().unwrap();
    assert_eq!(result.status, AnalysisStatus::Failed);
    assert_eq!(result.error.unwrap().kind, ErrorKind::Timeout);
}

#[tokio::test]
async fn test_server_errors_retry_until_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let (coordinator, _) = memory_coordinator(1);
    let pool = coordinator.start();
    let job_id = coordinator
        .submit("acme", &format!("{}/down", server.uri()), AnalysisOptions::default())
        .unwrap();
    let job = wait_for(&coordinator, job_id).await;
    pool.shutdown().await;

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 3);
    let error = job.last_error.unwrap();
    assert_eq!(error.kind, ErrorKind::HttpStatus);
    assert_eq!(error.status_code, Some(503));
}

#[tokio::test]
async fn test_not_found_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let (coordinator, _) = memory_coordinator(1);
    let pool = coordinator.start();
    let job_id = coordinator
        .submit("acme", &format!("{}/missing", server.uri()), AnalysisOptions::default())
        .unwrap();
    let job = wait_for(&coordinator, job_id).await;
    pool.shutdown().await;

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 1);
    let error = job.last_error.unwrap();
    assert_eq!(error.status_code, Some(404));
    assert!(!error.transient);
}

#[tokio::test]
async fn test_redirect_loop_fails_terminally() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/b"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/a"))
        .mount(&server)
        .await;

    let (coordinator, _) = memory_coordinator(1);
    let pool = coordinator.start();
    let job_id = coordinator
        .submit("acme", &format!("{}/a", server.uri()), AnalysisOptions::default())
        .unwrap();
    let job = wait_for(&coordinator, job_id).await;
    pool.shutdown().await;

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.unwrap().kind, ErrorKind::TooManyRedirects);
}

#[tokio::test]
async fn test_tenant_fairness_round_robin() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html(poor_page()).set_delay(Duration::from_millis(20)))
        .mount(&server)
        .await;

    let (coordinator, _) = memory_coordinator(1);
    let base = server.uri();

    // Everything is queued before any worker runs
    let mut solo_jobs = Vec::new();
    for i in 0..4 {
        solo_jobs.push(
            coordinator
                .submit("solo", &format!("{}/solo/{}", base, i), AnalysisOptions::default())
                .unwrap(),
        );
    }
    let other_job = coordinator
        .submit("other", &format!("{}/other/0", base), AnalysisOptions::default())
        .unwrap();

    let pool = coordinator.start();
    wait_for(&coordinator, other_job).await;
    for job_id in &solo_jobs {
        wait_for(&coordinator, *job_id).await;
    }
    pool.shutdown().await;

    let pages: Vec<String> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.url.path().to_string())
        .filter(|p| p != "/robots.txt")
        .collect();
    assert_eq!(pages.len(), 5);
    assert_eq!(pages[0], "/solo/0");
    assert_eq!(pages[1], "/other/0", "other tenant waited behind solo: {:?}", pages);
}

#[tokio::test]
async fn test_concurrency_cap_serializes_a_tenant() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html(poor_page()).set_delay(Duration::from_millis(150)))
        .mount(&server)
        .await;

    // Plenty of workers, but "solo" may only run one job at a time
    let (coordinator, _) = memory_coordinator(4);
    let pool = coordinator.start();
    let started = Instant::now();
    let jobs: Vec<JobId> = (0..3)
        .map(|i| {
            coordinator
                .submit("solo", &format!("{}/page/{}", server.uri(), i), AnalysisOptions::default())
                .unwrap()
        })
        .collect();

    let mut max_running = 0;
    while coordinator.stats().active() > 0 && started.elapsed() < WAIT {
        let running = coordinator
            .scheduler()
            .running_by_tenant()
            .get("solo")
            .copied()
            .unwrap_or(0);
        max_running = max_running.max(running);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for job_id in jobs {
        assert_eq!(wait_for(&coordinator, job_id).await.state, JobState::Succeeded);
    }
    pool.shutdown().await;

    assert!(max_running <= 1);
    assert!(started.elapsed() >= Duration::from_millis(450));
}

#[tokio::test]
async fn test_queue_depth_quota_rejects() {
    let (coordinator, _) = memory_coordinator(1);
    let config = create_test_config(1, "./unused.db", "");
    let depth = config
        .tenants
        .iter()
        .find(|t| t.id == "solo")
        .and_then(|t| t.max_queue_depth)
        .unwrap();

    for i in 0..depth {
        coordinator
            .submit("solo", &format!("https://example.com/{}", i), AnalysisOptions::default())
            .unwrap();
    }
    let rejected = coordinator.submit("solo", "https://example.com/extra", AnalysisOptions::default());
    assert!(matches!(rejected, Err(SubmitError::QuotaExceeded { .. })));

    // Other tenants are unaffected
    assert!(coordinator
        .submit("other", "https://example.com/extra", AnalysisOptions::default())
        .is_ok());
}

#[tokio::test]
async fn test_duplicate_submission_fetches_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html(poor_page()))
        .expect(1)
        .mount(&server)
        .await;

    let (coordinator, _) = memory_coordinator(2);
    let url = format!("{}/page", server.uri());
    let first = coordinator.submit("acme", &url, AnalysisOptions::default()).unwrap();
    let second = coordinator
        .submit("acme", &format!("{}#section", url), AnalysisOptions::default())
        .unwrap();
    assert_eq!(first, second);

    let pool = coordinator.start();
    assert_eq!(wait_for(&coordinator, first).await.state, JobState::Succeeded);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_cancel_running_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html(poor_page()).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let (coordinator, store) = memory_coordinator(1);
    let pool = coordinator.start();
    let job_id = coordinator
        .submit("acme", &format!("{}/slow", server.uri()), AnalysisOptions::default())
        .unwrap();

    let running = eventually(WAIT, || {
        coordinator.get_status(job_id) == Some(JobState::Running)
    })
    .await;
    assert!(running);

    let cancelled_at = Instant::now();
    coordinator.cancel(job_id).unwrap();
    let job = wait_for(&coordinator, job_id).await;
    pool.shutdown().await;

    assert_eq!(job.state, JobState::Cancelled);
    assert!(cancelled_at.elapsed() < Duration::from_secs(4));
    assert!(store.get(job_id).await.unwrap().is_none());

    // Cancelling again is a no-op
    assert!(coordinator.cancel(job_id).is_ok());
}

#[tokio::test]
async fn test_cancel_queued_job() {
    let (coordinator, _) = memory_coordinator(1);
    let job_id = coordinator
        .submit("acme", "https://example.com/", AnalysisOptions::default())
        .unwrap();

    coordinator.cancel(job_id).unwrap();
    assert_eq!(coordinator.get_status(job_id), Some(JobState::Cancelled));
    assert_eq!(
        coordinator.job(job_id).unwrap().last_error.unwrap().kind,
        ErrorKind::Cancelled
    );
}

#[tokio::test]
async fn test_check_subset_only_runs_selected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(good_page(&server.uri())))
        .mount(&server)
        .await;

    let (coordinator, store) = memory_coordinator(1);
    let pool = coordinator.start();
    let options = AnalysisOptions {
        checks: Some(BTreeSet::from(["h1".to_string(), "title".to_string()])),
        ..AnalysisOptions::default()
    };
    let job_id = coordinator
        .submit("acme", &format!("{}/", server.uri()), options)
        .unwrap();
    wait_for(&coordinator, job_id).await;
    pool.shutdown().await;

    let result = store.get(job_id).await.unwrap().unwrap();
    let ids: Vec<&str> = result.check_results.iter().map(|r| r.check_id.as_str()).collect();
    // Registration order, not selection order
    assert_eq!(ids, vec!["title", "h1"]);
    assert_eq!(result.overall_score, 100);
}

/// A check that always panics
struct Exploding;

impl Check for Exploding {
    fn id(&self) -> &str {
        "exploding"
    }

    fn evaluate(&self, _input: &CheckInput) -> Result<CheckOutcome, CheckError> {
        panic!("boom")
    }
}

#[tokio::test]
async fn test_crashing_check_is_contained() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(good_page(&server.uri())))
        .mount(&server)
        .await;

    let config = create_test_config(1, "./unused.db", "");
    let mut registry = CheckRegistry::with_defaults(&config.checks);
    registry.register(Exploding, 10).unwrap();
    let store = Arc::new(MemoryResultStore::new());
    let quotas = Arc::new(StaticQuotas::from_entries(&config.tenants));
    let coordinator = Coordinator::with_registry(config, quotas, store.clone(), registry).unwrap();

    let pool = coordinator.start();
    let job_id = coordinator
        .submit("acme", &format!("{}/", server.uri()), AnalysisOptions::default())
        .unwrap();
    let job = wait_for(&coordinator, job_id).await;
    pool.shutdown().await;

    assert_eq!(job.state, JobState::Succeeded);
    let result = store.get(job_id).await.unwrap().unwrap();
    assert_eq!(result.check_results.len(), 12);

    let exploding = result.check("exploding").unwrap();
    assert_eq!(exploding.sub_score, 0);
    assert_eq!(exploding.issues[0].severity, Severity::Critical);
    assert!(exploding.issues[0].message.contains("boom"));

    // The other checks were unaffected
    assert_eq!(result.check("title").unwrap().sub_score, 100);
}

/// A store that is always down
struct BrokenStore;

#[async_trait]
impl ResultStore for BrokenStore {
    async fn persist(&self, _result: &AnalysisResult) -> StoreResult<PersistOutcome> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn get(&self, _job_id: JobId) -> StoreResult<Option<AnalysisResult>> {
        Ok(None)
    }

    async fn list_for_tenant(&self, _tenant_id: &str, _limit: usize) -> StoreResult<Vec<AnalysisResult>> {
        Ok(Vec::new())
    }

    async fn count(&self) -> StoreResult<u64> {
        Ok(0)
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        Ok(StoreStats::default())
    }
}

#[tokio::test]
async fn test_store_outage_marks_unpersisted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(poor_page()))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(1, "./unused.db", "");
    let coordinator = coordinator_with_store(config, Arc::new(BrokenStore));
    let pool = coordinator.start();
    let job_id = coordinator
        .submit("acme", &server.uri(), AnalysisOptions::default())
        .unwrap();
    let job = wait_for(&coordinator, job_id).await;
    pool.shutdown().await;

    assert_eq!(job.state, JobState::Unpersisted);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.unwrap().kind, ErrorKind::StoreUnavailable);
}

#[tokio::test]
async fn test_closed_coordinator_rejects_submissions() {
    let (coordinator, _) = memory_coordinator(1);
    let pool = coordinator.start();
    coordinator.close();
    pool.shutdown().await;

    assert_eq!(
        coordinator.submit("acme", "https://example.com/", AnalysisOptions::default()),
        Err(SubmitError::ShuttingDown)
    );
}
