use crate::state::JobId;
use crate::tenant::TenantQuota;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// A queued job and the earliest instant it may be dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedJob {
    pub id: JobId,
    pub ready_at: Instant,
}

/// Tracks the state of one tenant inside the scheduler
///
/// Holds the tenant's FIFO of queued jobs (including retries waiting out
/// their backoff) and the number of jobs its workers currently hold, which is
/// everything needed to enforce the tenant's quota.
#[derive(Debug, Clone, Default)]
pub struct TenantLane {
    queued: VecDeque<QueuedJob>,
    running: u32,
}

impl TenantLane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queued plus running jobs, the figure compared against `max_queue_depth`
    pub fn in_flight(&self) -> u32 {
        self.queued.len() as u32 + self.running
    }

    pub fn running(&self) -> u32 {
        self.running
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// True when the lane holds no work at all
    pub fn is_idle(&self) -> bool {
        self.queued.is_empty() && self.running == 0
    }

    /// Checks whether a new submission fits within the tenant's queue depth
    pub fn can_admit(&self, quota: &TenantQuota) -> bool {
        self.in_flight() < quota.max_queue_depth
    }

    /// Checks whether another job of this tenant may start now
    ///
    /// # Arguments
    ///
    /// * `quota` - The tenant's current quota
    /// * `now` - The current time instant
    ///
    /// # Returns
    ///
    /// * `true` - A worker slot is free and some queued job's backoff has elapsed
    /// * `false` - The tenant is at its concurrency cap or nothing is ready
    pub fn can_dispatch(&self, quota: &TenantQuota, now: Instant) -> bool {
        self.running < quota.max_concurrent_jobs && self.has_ready(now)
    }

    fn has_ready(&self, now: Instant) -> bool {
        self.queued.iter().any(|q| q.ready_at <= now)
    }

    pub fn push(&mut self, id: JobId, ready_at: Instant) {
        self.queued.push_back(QueuedJob { id, ready_at });
    }

    /// Removes a queued job; returns false if it was not queued here
    pub fn remove(&mut self, id: JobId) -> bool {
        match self.queued.iter().position(|q| q.id == id) {
            Some(index) => {
                self.queued.remove(index);
                true
            }
            None => false,
        }
    }

    /// Takes the oldest queued job whose backoff has elapsed and counts it as running
    pub fn take_ready(&mut self, now: Instant) -> Option<JobId> {
        let index = self.queued.iter().position(|q| q.ready_at <= now)?;
        let job = self.queued.remove(index)?;
        self.running += 1;
        Some(job.id)
    }

    /// Records that one of the tenant's running jobs left the running state
    pub fn record_finish(&mut self) {
        self.running = self.running.saturating_sub(1);
    }

    /// Earliest instant a queued job becomes dispatchable
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.queued.iter().map(|q| q.ready_at).min()
    }

    /// Calculates the time until the next queued job leaves backoff
    ///
    /// Returns None if a job is ready now or nothing is queued.
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        let next = self.next_ready_at()?;
        if next <= now {
            None
        } else {
            Some(next - now)
        }
    }
}
