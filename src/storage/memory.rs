use crate::checks::{AnalysisResult, AnalysisStatus, Severity};
use crate::state::JobId;
use crate::storage::traits::{PersistOutcome, ResultStore, StoreResult};
use crate::storage::StoreStats;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryInner {
    results: HashMap<JobId, AnalysisResult>,
    order: Vec<JobId>,
}

/// Process-local [`ResultStore`], used by tests and `--dry-run`
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored result in insertion order
    pub fn all(&self) -> Vec<AnalysisResult> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .order
            .iter()
            .filter_map(|id| inner.results.get(id).cloned())
            .collect()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn persist(&self, result: &AnalysisResult) -> StoreResult<PersistOutcome> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.results.contains_key(&result.job_id) {
            return Ok(PersistOutcome::Duplicate);
        }
        inner.order.push(result.job_id);
        inner.results.insert(result.job_id, result.clone());
        Ok(PersistOutcome::Inserted)
    }

    async fn get(&self, job_id: JobId) -> StoreResult<Option<AnalysisResult>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.results.get(&job_id).cloned())
    }

    async fn list_for_tenant(&self, tenant_id: &str, limit: usize) -> StoreResult<Vec<AnalysisResult>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.results.get(id))
            .filter(|r| r.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> StoreResult<u64> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.results.len() as u64)
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut stats = StoreStats::default();
        let mut score_sum = 0u64;

        for result in inner.results.values() {
            stats.results += 1;
            match result.status {
                AnalysisStatus::Succeeded => {
                    stats.succeeded += 1;
                    score_sum += result.overall_score as u64;
                }
                AnalysisStatus::Failed => stats.failed += 1,
            }
            for severity in [Severity::Info, Severity::Warning, Severity::Critical] {
                let count = result.count(severity) as u64;
                if count > 0 {
                    *stats.issues.entry(severity).or_insert(0) += count;
                }
            }
        }

        if stats.succeeded > 0 {
            stats.average_score = Some(score_sum as f64 / stats.succeeded as f64);
        }
        Ok(stats)
    }
}
