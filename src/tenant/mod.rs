//! Tenant quota lookup
//!
//! The scheduler asks a [`QuotaProvider`] for a tenant's limits at admission
//! and on every dispatch decision. Lookups happen while the scheduler lock is
//! held, so implementations must answer from memory without blocking.

use crate::config::{Plan, TenantEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Concurrency and backlog limits for one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantQuota {
    pub tenant_id: String,
    pub max_concurrent_jobs: u32,
    pub max_queue_depth: u32,
}

impl TenantQuota {
    /// Quota for a tenant on `plan` with no overrides
    pub fn for_plan(tenant_id: impl Into<String>, plan: Plan) -> Self {
        let (max_concurrent_jobs, max_queue_depth) = plan.default_limits();
        Self {
            tenant_id: tenant_id.into(),
            max_concurrent_jobs,
            max_queue_depth,
        }
    }
}

impl From<&TenantEntry> for TenantQuota {
    fn from(entry: &TenantEntry) -> Self {
        let defaults = TenantQuota::for_plan(entry.id.clone(), entry.plan);
        Self {
            max_concurrent_jobs: entry
                .max_concurrent_jobs
                .unwrap_or(defaults.max_concurrent_jobs),
            max_queue_depth: entry.max_queue_depth.unwrap_or(defaults.max_queue_depth),
            ..defaults
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TenantError {
    #[error("Unknown tenant: {0}")]
    UnknownTenant(String),
}

/// Source of tenant quotas
pub trait QuotaProvider: Send + Sync {
    fn get_quota(&self, tenant_id: &str) -> Result<TenantQuota, TenantError>;
}

/// In-memory quota table, usually built from the `[[tenant]]` config entries
#[derive(Debug, Default)]
pub struct StaticQuotas {
    quotas: RwLock<HashMap<String, TenantQuota>>,
}

impl StaticQuotas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[TenantEntry]) -> Self {
        let quotas = entries
            .iter()
            .map(|entry| (entry.id.clone(), TenantQuota::from(entry)))
            .collect();
        Self {
            quotas: RwLock::new(quotas),
        }
    }

    /// Adds or replaces a tenant's quota; takes effect at the next dispatch
    pub fn upsert(&self, quota: TenantQuota) {
        let mut quotas = self.quotas.write().unwrap_or_else(|e| e.into_inner());
        quotas.insert(quota.tenant_id.clone(), quota);
    }

    pub fn remove(&self, tenant_id: &str) -> Option<TenantQuota> {
        let mut quotas = self.quotas.write().unwrap_or_else(|e| e.into_inner());
        quotas.remove(tenant_id)
    }

    pub fn len(&self) -> usize {
        self.quotas.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QuotaProvider for StaticQuotas {
    fn get_quota(&self, tenant_id: &str) -> Result<TenantQuota, TenantError> {
        let quotas = self.quotas.read().unwrap_or_else(|e| e.into_inner());
        quotas
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| TenantError::UnknownTenant(tenant_id.to_string()))
    }
}
