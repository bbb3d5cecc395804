//! Robots.txt caching implementation
//!
//! Entries are keyed by origin and expire after a configurable TTL
//! (24 hours by default).

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Robots.txt lookup result for one origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// Body of the file; `None` when the origin has none (4xx) or it was unreachable
    pub body: Option<String>,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(body: Option<String>) -> Self {
        Self {
            body,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the entry is older than `ttl`
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

/// Shared per-origin robots.txt cache, safe for concurrent workers
#[derive(Debug)]
pub struct RobotsCache {
    entries: Mutex<HashMap<String, CachedRobots>>,
    ttl: Duration,
}

impl RobotsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached entry for `origin` if it is still fresh
    pub fn get(&self, origin: &str) -> Option<CachedRobots> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(origin)
            .filter(|entry| !entry.is_stale(self.ttl))
            .cloned()
    }

    pub fn insert(&self, origin: &str, entry: CachedRobots) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(origin.to_string(), entry);
    }

    /// Drops stale entries; returns how many were removed
    pub fn purge_stale(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_stale(self.ttl));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}
