//! Scheduler for analysis jobs
//!
//! This module handles:
//! - Admission control against per-tenant queue depth quotas
//! - Duplicate detection for active `(tenant, url)` pairs
//! - Round-robin dispatch across tenants under their concurrency caps
//! - Retry with exponential backoff for transient failures
//! - Cooperative cancellation via per-attempt tokens
//! - Heartbeat leases and reaping of jobs whose worker went silent
//!
//! All state sits behind one mutex. Methods that depend on time take an
//! explicit `now` so callers (and tests) control the clock.

use crate::config::{DuplicatePolicy, SchedulerConfig};
use crate::state::{AnalysisOptions, ErrorKind, Job, JobError, JobId, JobState, TenantLane};
use crate::tenant::QuotaProvider;
use crate::url::{normalize_url, validate_target_url};
use crate::{CancelError, SubmitError};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Work handed to a worker for one attempt of a job
#[derive(Debug, Clone)]
pub struct Assignment {
    pub job_id: JobId,
    pub tenant_id: String,
    pub url: Url,
    pub options: AnalysisOptions,

    /// 1-based attempt number; echo it back on heartbeat/complete/fail
    pub attempt: u32,

    /// Triggered when the job is cancelled or its lease is reaped
    pub cancel: CancellationToken,
}

/// Result of asking the scheduler for work
#[derive(Debug)]
pub enum Dispatch {
    Ready(Assignment),

    /// Nothing dispatchable; the instant is when a backed-off job becomes ready
    Idle(Option<Instant>),

    /// The scheduler was closed
    Closed,
}

/// What a failure report did to the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Requeued; eligible again after the delay
    Retrying { delay: Duration },
    Failed,
    Cancelled,

    /// The report was stale (wrong attempt or job no longer running)
    Ignored,
}

/// Job counts by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub unpersisted: usize,
}

impl SchedulerStats {
    pub fn active(&self) -> usize {
        self.queued + self.running
    }
}

/// Calculates the backoff before retrying after `attempt` failed
///
/// `min(base * 2^(attempt - 1), cap)`, with `attempt` 1-based.
///
/// # Examples
///
/// ```
/// use autoseo::crawler::backoff_delay;
/// use std::time::Duration;
///
/// let base = Duration::from_millis(100);
/// let cap = Duration::from_secs(1);
/// assert_eq!(backoff_delay(1, base, cap), Duration::from_millis(100));
/// assert_eq!(backoff_delay(3, base, cap), Duration::from_millis(400));
/// assert_eq!(backoff_delay(10, base, cap), cap);
/// ```
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(cap).min(cap)
}

struct JobEntry {
    job: Job,

    /// Last heartbeat of the running attempt
    lease: Option<Instant>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct QueueState {
    jobs: HashMap<JobId, JobEntry>,
    lanes: HashMap<String, TenantLane>,

    /// Tenants with a lane, in dispatch order; served tenants move to the back
    rotation: VecDeque<String>,

    /// Active job per `(tenant, normalized url)` for duplicate detection
    active_by_url: HashMap<(String, String), JobId>,

    /// Terminal jobs, oldest first, for retention
    finished: VecDeque<JobId>,

    shutting_down: bool,
}

impl QueueState {
    fn lane_mut(&mut self, tenant_id: &str) -> &mut TenantLane {
        if !self.lanes.contains_key(tenant_id) {
            self.rotation.push_back(tenant_id.to_string());
        }
        self.lanes.entry(tenant_id.to_string()).or_default()
    }

    fn drop_idle_lane(&mut self, tenant_id: &str) {
        if self.lanes.get(tenant_id).is_some_and(|lane| lane.is_idle()) {
            self.lanes.remove(tenant_id);
            self.rotation.retain(|t| t != tenant_id);
        }
    }

    /// Moves a job into a terminal state and releases what it held
    fn settle(
        &mut self,
        job_id: JobId,
        state: JobState,
        error: Option<JobError>,
        was_running: bool,
        retention: usize,
    ) {
        let Some(entry) = self.jobs.get_mut(&job_id) else {
            return;
        };
        if !entry.job.transition(state) {
            return;
        }
        if error.is_some() {
            entry.job.last_error = error;
        }
        entry.lease = None;

        let tenant_id = entry.job.tenant_id.clone();
        let key = dedup_key(&tenant_id, &entry.job.url);
        if self.active_by_url.get(&key) == Some(&job_id) {
            self.active_by_url.remove(&key);
        }

        if was_running {
            if let Some(lane) = self.lanes.get_mut(&tenant_id) {
                lane.record_finish();
            }
        }
        self.drop_idle_lane(&tenant_id);

        self.finished.push_back(job_id);
        while self.finished.len() > retention {
            if let Some(evicted) = self.finished.pop_front() {
                self.jobs.remove(&evicted);
            }
        }
    }
}

fn dedup_key(tenant_id: &str, url: &Url) -> (String, String) {
    let normalized = normalize_url(url.as_str())
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string());
    (tenant_id.to_string(), normalized)
}

/// Tenant-fair job queue shared by the worker pool
pub struct Scheduler {
    state: Mutex<QueueState>,
    quotas: Arc<dyn QuotaProvider>,
    config: SchedulerConfig,

    /// Check ids a submission may select
    known_checks: BTreeSet<String>,

    /// Woken when there may be work to dispatch
    work: Notify,

    /// Woken on every terminal transition
    changes: Notify,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - Retry, dedup and lease settings
    /// * `quotas` - Source of per-tenant limits
    /// * `known_checks` - Registered check ids, used to validate options
    pub fn new(
        config: SchedulerConfig,
        quotas: Arc<dyn QuotaProvider>,
        known_checks: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            quotas,
            config,
            known_checks: known_checks.into_iter().collect(),
            work: Notify::new(),
            changes: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Admits an analysis request
    ///
    /// # Returns
    ///
    /// * `Ok(JobId)` - The new job, or the active duplicate under `return-existing`
    /// * `Err(SubmitError)` - Rejected; nothing was enqueued
    pub fn submit(
        &self,
        tenant_id: &str,
        url: &str,
        options: AnalysisOptions,
    ) -> Result<JobId, SubmitError> {
        let url = validate_target_url(url)?;
        self.validate_options(&options)?;

        let quota = self
            .quotas
            .get_quota(tenant_id)
            .map_err(|_| SubmitError::UnknownTenant(tenant_id.to_string()))?;

        let mut state = self.lock();
        if state.shutting_down {
            return Err(SubmitError::ShuttingDown);
        }

        let key = dedup_key(tenant_id, &url);
        if self.config.duplicate_policy == DuplicatePolicy::ReturnExisting {
            if let Some(existing) = state.active_by_url.get(&key) {
                tracing::debug!("Duplicate submission for {} returns job {}", url, existing);
                return Ok(*existing);
            }
        }

        let in_flight = state.lanes.get(tenant_id).map_or(0, |lane| lane.in_flight());
        let admits = state
            .lanes
            .get(tenant_id)
            .map_or(quota.max_queue_depth > 0, |lane| lane.can_admit(&quota));
        if !admits {
            tracing::warn!(
                "Rejecting job for tenant {}: {} in flight (limit {})",
                tenant_id,
                in_flight,
                quota.max_queue_depth
            );
            return Err(SubmitError::QuotaExceeded {
                tenant_id: tenant_id.to_string(),
                in_flight,
                max_queue_depth: quota.max_queue_depth,
            });
        }

        let job = Job::new(tenant_id.to_string(), url, options);
        let job_id = job.id;
        tracing::info!("Queued job {} for tenant {}: {}", job_id, tenant_id, job.url);

        state.lane_mut(tenant_id).push(job_id, Instant::now());
        state.active_by_url.insert(key, job_id);
        state.jobs.insert(
            job_id,
            JobEntry {
                job,
                lease: None,
                cancel: CancellationToken::new(),
            },
        );
        drop(state);

        self.work.notify_waiters();
        Ok(job_id)
    }

    fn validate_options(&self, options: &AnalysisOptions) -> Result<(), SubmitError> {
        if options.fetch_timeout_ms == 0 {
            return Err(SubmitError::InvalidOptions(
                "fetch_timeout_ms must be positive".to_string(),
            ));
        }

        if let Some(checks) = &options.checks {
            if checks.is_empty() {
                return Err(SubmitError::InvalidOptions(
                    "check selection is empty".to_string(),
                ));
            }
            let unknown: Vec<&str> = checks
                .iter()
                .filter(|id| !self.known_checks.contains(*id))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(SubmitError::InvalidOptions(format!(
                    "unknown check id(s): {}",
                    unknown.join(", ")
                )));
            }
        }

        Ok(())
    }

    /// Picks the next job to run at `now`
    ///
    /// Tenants are served round-robin: the first tenant in rotation with a
    /// ready job and a free concurrency slot is chosen and moved to the back.
    /// Quotas are looked up again here so changes apply without restart.
    pub fn dispatch_at(&self, now: Instant) -> Dispatch {
        let mut state = self.lock();
        if state.shutting_down {
            return Dispatch::Closed;
        }

        let mut chosen = None;
        for index in 0..state.rotation.len() {
            let tenant_id = state.rotation[index].clone();
            let quota = match self.quotas.get_quota(&tenant_id) {
                Ok(quota) => quota,
                Err(e) => {
                    tracing::warn!("Skipping tenant {} at dispatch: {}", tenant_id, e);
                    continue;
                }
            };
            let Some(lane) = state.lanes.get_mut(&tenant_id) else {
                continue;
            };
            if !lane.can_dispatch(&quota, now) {
                continue;
            }
            if let Some(job_id) = lane.take_ready(now) {
                chosen = Some((index, job_id));
                break;
            }
        }

        let Some((index, job_id)) = chosen else {
            let next = state.lanes.values().filter_map(|l| l.next_ready_at()).filter(|t| *t > now).min();
            return Dispatch::Idle(next);
        };

        if let Some(tenant_id) = state.rotation.remove(index) {
            state.rotation.push_back(tenant_id);
        }

        let Some(entry) = state.jobs.get_mut(&job_id) else {
            return Dispatch::Idle(None);
        };
        entry.job.transition(JobState::Running);
        entry.job.attempts += 1;
        entry.lease = Some(now);
        entry.cancel = CancellationToken::new();

        tracing::debug!(
            "Dispatching job {} (tenant {}, attempt {})",
            job_id,
            entry.job.tenant_id,
            entry.job.attempts
        );

        Dispatch::Ready(Assignment {
            job_id,
            tenant_id: entry.job.tenant_id.clone(),
            url: entry.job.url.clone(),
            options: entry.job.options.clone(),
            attempt: entry.job.attempts,
            cancel: entry.cancel.clone(),
        })
    }

    /// Renews the lease of a running attempt
    ///
    /// Returns false when the attempt no longer owns the job.
    pub fn heartbeat(&self, job_id: JobId, attempt: u32, now: Instant) -> bool {
        let mut state = self.lock();
        match state.jobs.get_mut(&job_id) {
            Some(entry) if entry.job.state == JobState::Running && entry.job.attempts == attempt => {
                entry.lease = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Records the end of a running attempt that produced a result
    ///
    /// `outcome` is `Succeeded`, or `Unpersisted` when the result could not
    /// be stored. Returns false for a stale report.
    pub fn complete(
        &self,
        job_id: JobId,
        attempt: u32,
        outcome: JobState,
        error: Option<JobError>,
    ) -> bool {
        let mut state = self.lock();
        let owns = state.jobs.get(&job_id).is_some_and(|entry| {
            entry.job.state == JobState::Running && entry.job.attempts == attempt
        });
        if !owns {
            return false;
        }

        state.settle(job_id, outcome, error, true, self.config.finished_job_retention);
        drop(state);

        tracing::info!("Job {} finished as {}", job_id, outcome);
        self.notify_all();
        true
    }

    /// Records a failed attempt
    ///
    /// A cancelled attempt becomes `Cancelled`; a transient failure with
    /// attempts left is requeued after [`backoff_delay`]; anything else is
    /// `Failed` with `error` as the last error.
    pub fn fail(&self, job_id: JobId, attempt: u32, error: JobError, now: Instant) -> FailOutcome {
        let mut state = self.lock();
        let owns = state.jobs.get(&job_id).is_some_and(|entry| {
            entry.job.state == JobState::Running && entry.job.attempts == attempt
        });
        if !owns {
            return FailOutcome::Ignored;
        }

        let outcome = self.fail_locked(&mut state, job_id, error, now);
        drop(state);

        self.notify_all();
        outcome
    }

    fn fail_locked(
        &self,
        state: &mut QueueState,
        job_id: JobId,
        error: JobError,
        now: Instant,
    ) -> FailOutcome {
        let retention = self.config.finished_job_retention;
        let Some(entry) = state.jobs.get_mut(&job_id) else {
            return FailOutcome::Ignored;
        };

        if entry.cancel.is_cancelled() && entry.lease.is_some() {
            let error = JobError::new(ErrorKind::Cancelled, "cancelled while running", None);
            state.settle(job_id, JobState::Cancelled, Some(error), true, retention);
            tracing::info!("Job {} cancelled", job_id);
            return FailOutcome::Cancelled;
        }

        let attempt = entry.job.attempts;
        if error.is_transient() && attempt < self.config.max_attempts {
            let delay = backoff_delay(
                attempt,
                Duration::from_millis(self.config.retry_base_delay_ms),
                Duration::from_millis(self.config.retry_max_delay_ms),
            );
            tracing::warn!(
                "Job {} attempt {} failed ({}); retrying in {:?}",
                job_id,
                attempt,
                error,
                delay
            );

            entry.job.transition(JobState::Queued);
            entry.job.last_error = Some(error);
            entry.lease = None;
            let tenant_id = entry.job.tenant_id.clone();

            let lane = state.lane_mut(&tenant_id);
            lane.record_finish();
            lane.push(job_id, now + delay);
            return FailOutcome::Retrying { delay };
        }

        tracing::error!("Job {} failed after {} attempt(s): {}", job_id, attempt, error);
        state.settle(job_id, JobState::Failed, Some(error), true, retention);
        FailOutcome::Failed
    }

    /// Cancels a job
    ///
    /// A queued job is cancelled at once. A running job has its token
    /// triggered and is marked `Cancelled` when its worker reports back.
    /// Cancelling a terminal job is a no-op.
    pub fn cancel(&self, job_id: JobId) -> Result<(), CancelError> {
        let mut state = self.lock();
        let Some(entry) = state.jobs.get(&job_id) else {
            return Err(CancelError::NotFound(job_id));
        };
        let job_state = entry.job.state;
        let tenant_id = entry.job.tenant_id.clone();

        match job_state {
            JobState::Queued => {
                if let Some(lane) = state.lanes.get_mut(&tenant_id) {
                    lane.remove(job_id);
                }
                let error = JobError::new(ErrorKind::Cancelled, "cancelled before start", None);
                state.settle(
                    job_id,
                    JobState::Cancelled,
                    Some(error),
                    false,
                    self.config.finished_job_retention,
                );
                drop(state);

                tracing::info!("Job {} cancelled while queued", job_id);
                self.notify_all();
            }
            JobState::Running => {
                tracing::info!("Cancellation requested for running job {}", job_id);
                if let Some(entry) = state.jobs.get(&job_id) {
                    entry.cancel.cancel();
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Fails every running job whose lease is older than the heartbeat timeout
    ///
    /// The lost attempt counts as a transient `WorkerLost` failure, so the
    /// job is retried while attempts remain. Returns the reaped job ids.
    pub fn reap_expired(&self, now: Instant) -> Vec<JobId> {
        let timeout = Duration::from_millis(self.config.heartbeat_timeout_ms);
        let mut state = self.lock();

        let expired: Vec<JobId> = state
            .jobs
            .iter()
            .filter(|(_, entry)| entry.job.state == JobState::Running)
            .filter(|(_, entry)| {
                entry
                    .lease
                    .is_some_and(|lease| now.saturating_duration_since(lease) > timeout)
            })
            .map(|(id, _)| *id)
            .collect();

        for job_id in &expired {
            tracing::warn!("Job {} lost its worker (no heartbeat for {:?})", job_id, timeout);
            let token = state.jobs.get(job_id).map(|entry| entry.cancel.clone());
            let error = JobError::new(ErrorKind::WorkerLost, "no heartbeat from worker", None);
            self.fail_locked(&mut state, *job_id, error, now);

            // The lost attempt is stale whether the job was requeued or failed
            if let Some(token) = token {
                token.cancel();
            }
        }
        drop(state);

        if !expired.is_empty() {
            self.notify_all();
        }
        expired
    }

    /// Stops dispatching and rejects new submissions
    pub fn close(&self) {
        self.lock().shutting_down = true;
        self.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().shutting_down
    }

    pub fn get_status(&self, job_id: JobId) -> Option<JobState> {
        self.lock().jobs.get(&job_id).map(|entry| entry.job.state)
    }

    /// Full snapshot of a job, including its last error
    pub fn job(&self, job_id: JobId) -> Option<Job> {
        self.lock().jobs.get(&job_id).map(|entry| entry.job.clone())
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.lock();
        let mut stats = SchedulerStats::default();
        for entry in state.jobs.values() {
            match entry.job.state {
                JobState::Queued => stats.queued += 1,
                JobState::Running => stats.running += 1,
                JobState::Succeeded => stats.succeeded += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Cancelled => stats.cancelled += 1,
                JobState::Unpersisted => stats.unpersisted += 1,
            }
        }
        stats
    }

    /// Running jobs per tenant
    pub fn running_by_tenant(&self) -> HashMap<String, u32> {
        self.lock()
            .lanes
            .iter()
            .map(|(tenant, lane)| (tenant.clone(), lane.running()))
            .collect()
    }

    /// Resolves at the next event that may make work dispatchable
    ///
    /// Create it before calling [`Scheduler::dispatch_at`] so a submission
    /// landing in between still wakes the caller.
    pub fn work_signal(&self) -> Notified<'_> {
        self.work.notified()
    }

    /// Resolves once the job is terminal
    ///
    /// Returns `None` for unknown (or already evicted) jobs.
    pub async fn wait_terminal(&self, job_id: JobId) -> Option<Job> {
        loop {
            let notified = self.changes.notified();
            let job = self.job(job_id)?;
            if job.state.is_terminal() {
                return Some(job);
            }
            notified.await;
        }
    }

    /// Resolves once no job is queued or running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.changes.notified();
            if self.stats().active() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn notify_all(&self) {
        self.work.notify_waiters();
        self.changes.notify_waiters();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
