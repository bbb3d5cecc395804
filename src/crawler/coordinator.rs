//! Coordinator - job orchestration and the worker pool
//!
//! This module ties the pipeline together:
//! - Accepting, cancelling and observing jobs through the scheduler
//! - Running each dispatched job end to end: fetch, checks, score
//! - Renewing heartbeat leases while a job is in progress
//! - Persisting results with bounded retries
//! - Supervising worker tasks and reaping jobs whose worker was lost

use crate::checks::{AnalysisResult, AnalysisStatus, CheckEngine, CheckRegistry};
use crate::config::Config;
use crate::crawler::scheduler::{Assignment, Dispatch, FailOutcome, Scheduler, SchedulerStats};
use crate::crawler::Fetcher;
use crate::scoring::Scorer;
use crate::state::{AnalysisOptions, ErrorKind, Job, JobError, JobId, JobState};
use crate::storage::{open_store, PersistOutcome, ResultStore, StoreError, StoreResult};
use crate::tenant::{QuotaProvider, StaticQuotas};
use crate::{CancelError, SeoError, SubmitError};
use chrono::Utc;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

struct Inner {
    config: Arc<Config>,
    scheduler: Scheduler,
    fetcher: Fetcher,
    engine: CheckEngine,
    scorer: Scorer,
    store: Arc<dyn ResultStore>,

    /// Jobs that reached a terminal state through a worker
    finished: AtomicU64,
}

/// Entry point of the analysis service
///
/// Cheap to clone; clones share the same scheduler, fetcher and store.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Creates a coordinator with the default check registry
    ///
    /// # Arguments
    ///
    /// * `config` - The service configuration
    /// * `quotas` - Source of per-tenant limits
    /// * `store` - Where finished analyses are written
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to accept jobs; call [`Coordinator::start`] to run them
    /// * `Err(SeoError)` - The HTTP client could not be built
    pub fn new(
        config: Config,
        quotas: Arc<dyn QuotaProvider>,
        store: Arc<dyn ResultStore>,
    ) -> Result<Self, SeoError> {
        let registry = CheckRegistry::with_defaults(&config.checks);
        Self::with_registry(config, quotas, store, registry)
    }

    /// Creates a coordinator running the checks of `registry`
    pub fn with_registry(
        config: Config,
        quotas: Arc<dyn QuotaProvider>,
        store: Arc<dyn ResultStore>,
        registry: CheckRegistry,
    ) -> Result<Self, SeoError> {
        let fetcher = Fetcher::new(&config.user_agent, &config.fetcher)?;
        let scorer = Scorer::from_registry(&registry, config.checks.critical_deduction);
        let scheduler = Scheduler::new(config.scheduler.clone(), quotas, registry.ids());
        let engine = CheckEngine::new(
            Arc::new(registry),
            Duration::from_millis(config.checks.check_timeout_ms),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                scheduler,
                fetcher,
                engine,
                scorer,
                store,
                finished: AtomicU64::new(0),
            }),
        })
    }

    /// Creates a coordinator from configuration alone
    ///
    /// Quotas come from the `[[tenant]]` entries and results go to the
    /// SQLite database at `store.database-path`.
    pub fn from_config(config: Config) -> Result<Self, SeoError> {
        let quotas = Arc::new(StaticQuotas::from_entries(&config.tenants));
        let store = Arc::new(open_store(Path::new(&config.store.database_path))?);
        tracing::info!("Result store: {}", config.store.database_path);
        Self::new(config, quotas, store)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn registry(&self) -> &CheckRegistry {
        self.inner.engine.registry()
    }

    pub fn store(&self) -> Arc<dyn ResultStore> {
        Arc::clone(&self.inner.store)
    }

    /// Submits a page for analysis
    pub fn submit(
        &self,
        tenant_id: &str,
        url: &str,
        options: AnalysisOptions,
    ) -> Result<JobId, SubmitError> {
        self.inner.scheduler.submit(tenant_id, url, options)
    }

    pub fn get_status(&self, job_id: JobId) -> Option<JobState> {
        self.inner.scheduler.get_status(job_id)
    }

    /// Snapshot of a job including attempts and last error
    pub fn job(&self, job_id: JobId) -> Option<Job> {
        self.inner.scheduler.job(job_id)
    }

    pub fn cancel(&self, job_id: JobId) -> Result<(), CancelError> {
        self.inner.scheduler.cancel(job_id)
    }

    /// Waits for a job to reach a terminal state
    pub async fn wait(&self, job_id: JobId) -> Option<Job> {
        self.inner.scheduler.wait_terminal(job_id).await
    }

    /// Waits until no job is queued or running
    pub async fn wait_idle(&self) {
        self.inner.scheduler.wait_idle().await
    }

    /// Stored result of a job, if one was persisted
    pub async fn result(&self, job_id: JobId) -> StoreResult<Option<AnalysisResult>> {
        self.inner.store.get(job_id).await
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.scheduler.stats()
    }

    /// Stops accepting and dispatching jobs
    ///
    /// Jobs already running finish; workers then exit.
    pub fn close(&self) {
        tracing::info!("Closing scheduler");
        self.inner.scheduler.close();
    }

    /// Spawns the worker pool and its supervisor
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> WorkerPool {
        let workers = self.inner.config.scheduler.workers.max(1);
        let shutdown = CancellationToken::new();
        let supervisor = tokio::spawn(supervise(self.clone(), workers, shutdown.clone()));
        tracing::info!("Started {} workers", workers);

        WorkerPool {
            shutdown,
            supervisor,
        }
    }

    /// Runs one attempt of a job to completion and reports the outcome
    async fn execute(&self, assignment: Assignment) {
        let deadline = Instant::now() + self.job_budget(&assignment.options);
        self.execute_until(assignment, deadline).await
    }

    /// Time a job may spend fetching and checking before it is abandoned
    fn job_budget(&self, options: &AnalysisOptions) -> Duration {
        Duration::from_millis(options.fetch_timeout_ms)
            + Duration::from_millis(self.inner.config.checks.check_timeout_ms)
            + Duration::from_millis(self.inner.config.scheduler.deadline_margin_ms)
    }

    async fn execute_until(&self, assignment: Assignment, deadline: Instant) {
        let scheduler = &self.inner.scheduler;
        let job_id = assignment.job_id;
        let attempt = assignment.attempt;

        tracing::info!(
            "Analyzing {} (job {}, tenant {}, attempt {})",
            assignment.url,
            job_id,
            assignment.tenant_id,
            attempt
        );

        let analysis = self
            .with_heartbeat(&assignment, async {
                tokio::select! {
                    biased;
                    _ = assignment.cancel.cancelled() => {
                        Err(JobError::new(ErrorKind::Cancelled, "cancelled while running", None))
                    }
                    outcome = tokio::time::timeout_at(deadline, self.analyze(&assignment)) => {
                        outcome.unwrap_or_else(|_| {
                            Err(JobError::new(
                                ErrorKind::DeadlineExceeded,
                                "job deadline exceeded",
                                None,
                            ))
                        })
                    }
                }
            })
            .await;

        match analysis {
            Ok(result) => {
                let persisted = self.with_heartbeat(&assignment, self.persist(&result)).await;
                match persisted {
                    Ok(_) => {
                        tracing::info!(
                            "Job {} scored {} for {}",
                            job_id,
                            result.overall_score,
                            assignment.url
                        );
                        scheduler.complete(job_id, attempt, JobState::Succeeded, None);
                    }
                    Err(e) => {
                        tracing::error!("Job {} analyzed but not stored: {}", job_id, e);
                        let error = JobError::new(ErrorKind::StoreUnavailable, e.to_string(), None);
                        scheduler.complete(job_id, attempt, JobState::Unpersisted, Some(error));
                    }
                }
            }
            Err(error) => {
                let outcome = scheduler.fail(job_id, attempt, error.clone(), Instant::now());
                if outcome == FailOutcome::Failed {
                    if let Some(job) = scheduler.job(job_id) {
                        let record = AnalysisResult::failed(&job, error);
                        if let Err(e) = self.persist(&record).await {
                            tracing::error!("Could not store failure of job {}: {}", job_id, e);
                        }
                    }
                }
            }
        }

        let finished = self.inner.finished.fetch_add(1, Ordering::Relaxed) + 1;
        if finished % 10 == 0 {
            let stats = scheduler.stats();
            tracing::info!(
                "Progress: {} attempts handled, {} queued, {} running, {} succeeded, {} failed",
                finished,
                stats.queued,
                stats.running,
                stats.succeeded,
                stats.failed
            );
        }
    }

    /// Fetch, check and score one page
    async fn analyze(&self, assignment: &Assignment) -> Result<AnalysisResult, JobError> {
        let page = self
            .inner
            .fetcher
            .fetch(
                &assignment.url,
                Duration::from_millis(assignment.options.fetch_timeout_ms),
                assignment.options.max_redirects,
            )
            .await
            .map_err(|e| {
                tracing::debug!("Fetch of {} failed: {}", assignment.url, e);
                e.to_job_error()
            })?;

        tracing::debug!(
            "Fetched {} ({} bytes, status {})",
            page.url,
            page.body_bytes,
            page.status_code
        );

        let check_results = self
            .inner
            .engine
            .analyze(page, assignment.options.checks.as_ref())
            .await
            .map_err(|e| JobError::new(ErrorKind::EngineFatal, e.to_string(), None))?;

        let overall_score = self.inner.scorer.score(&check_results);

        Ok(AnalysisResult {
            job_id: assignment.job_id,
            tenant_id: assignment.tenant_id.clone(),
            url: assignment.url.to_string(),
            overall_score,
            check_results,
            completed_at: Utc::now(),
            status: AnalysisStatus::Succeeded,
            attempts: assignment.attempt,
            error: None,
        })
    }

    /// Writes a result, retrying up to `store.persist-attempts` times
    async fn persist(&self, result: &AnalysisResult) -> Result<PersistOutcome, StoreError> {
        let attempts = self.inner.config.store.persist_attempts.max(1);
        let delay = Duration::from_millis(self.inner.config.store.persist_retry_delay_ms);

        let mut tries = 0;
        loop {
            tries += 1;
            match self.inner.store.persist(result).await {
                Ok(PersistOutcome::Duplicate) => {
                    tracing::debug!("Result for job {} was already stored", result.job_id);
                    return Ok(PersistOutcome::Duplicate);
                }
                Ok(outcome) => return Ok(outcome),
                Err(e) if tries < attempts => {
                    tracing::warn!(
                        "Storing job {} failed (try {}/{}): {}",
                        result.job_id,
                        tries,
                        attempts,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drives `fut` while renewing the assignment's lease
    async fn with_heartbeat<F: Future>(&self, assignment: &Assignment, fut: F) -> F::Output {
        tokio::pin!(fut);
        let period = Duration::from_millis(self.inner.config.scheduler.heartbeat_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                output = &mut fut => return output,
                _ = ticker.tick() => {
                    let alive = self
                        .inner
                        .scheduler
                        .heartbeat(assignment.job_id, assignment.attempt, Instant::now());
                    if !alive {
                        tracing::debug!(
                            "Job {} attempt {} no longer holds its lease",
                            assignment.job_id,
                            assignment.attempt
                        );
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

/// Handle to the running worker pool
#[derive(Debug)]
pub struct WorkerPool {
    shutdown: CancellationToken,
    supervisor: JoinHandle<()>,
}

impl WorkerPool {
    /// Stops the pool
    ///
    /// Idle workers exit at once; busy ones finish their current job first.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.supervisor.await {
            tracing::error!("Worker supervisor ended abnormally: {}", e);
        }
    }
}

/// Keeps `workers` worker tasks alive and periodically reaps lost jobs
async fn supervise(coordinator: Coordinator, workers: usize, shutdown: CancellationToken) {
    let mut set = JoinSet::new();
    let mut next_id = 0;
    for _ in 0..workers {
        set.spawn(worker_loop(coordinator.clone(), next_id, shutdown.clone()));
        next_id += 1;
    }

    let scheduler = &coordinator.inner.scheduler;
    let period = Duration::from_millis(coordinator.inner.config.scheduler.heartbeat_interval_ms.max(1));
    let mut reaper = tokio::time::interval(period);
    reaper.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = reaper.tick() => {
                let reaped = scheduler.reap_expired(Instant::now());
                if !reaped.is_empty() {
                    tracing::warn!("Requeued {} job(s) from lost workers", reaped.len());
                }
            }
            Some(joined) = set.join_next() => {
                if let Err(e) = joined {
                    tracing::error!("Worker task died: {}", e);
                }
                if scheduler.is_closed() {
                    if set.is_empty() {
                        break;
                    }
                } else {
                    tracing::info!("Respawning worker {}", next_id);
                    set.spawn(worker_loop(coordinator.clone(), next_id, shutdown.clone()));
                    next_id += 1;
                }
            }
        }
    }

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Worker task died during shutdown: {}", e);
        }
    }
    tracing::info!("Worker pool stopped");
}

async fn worker_loop(coordinator: Coordinator, worker_id: usize, shutdown: CancellationToken) {
    tracing::debug!("Worker {} started", worker_id);
    let scheduler = &coordinator.inner.scheduler;

    while !shutdown.is_cancelled() {
        let signal = scheduler.work_signal();
        match scheduler.dispatch_at(Instant::now()) {
            Dispatch::Ready(assignment) => coordinator.execute(assignment).await,
            Dispatch::Idle(next_ready) => {
                let backoff = async {
                    match next_ready {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                };
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = signal => {}
                    _ = backoff => {}
                }
            }
            Dispatch::Closed => break,
        }
    }

    tracing::debug!("Worker {} stopped", worker_id);
}
