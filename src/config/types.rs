use serde::Deserialize;

/// Main configuration structure for AutoSEO
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub checks: ChecksConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default, rename = "tenant")]
    pub tenants: Vec<TenantEntry>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// HTTP fetching configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetcherConfig {
    /// Bodies larger than this are truncated and flagged
    pub max_body_bytes: usize,

    /// TCP/TLS connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Whether to look up robots.txt for each analyzed origin
    pub fetch_robots: bool,

    /// How long a cached robots.txt stays fresh (hours)
    pub robots_ttl_hours: i64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 5 * 1024 * 1024,
            connect_timeout_ms: 5_000,
            fetch_robots: true,
            robots_ttl_hours: 24,
        }
    }
}

/// What to do when the same tenant submits a URL that is already in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Return the id of the queued or running job
    ReturnExisting,
    /// Always create an independent job
    CreateNew,
}

/// Job queue and worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Size of the global worker pool
    pub workers: usize,

    /// Attempts per job before a transient failure becomes terminal
    pub max_attempts: u32,

    /// First retry delay; doubles per attempt (milliseconds)
    pub retry_base_delay_ms: u64,

    /// Upper bound on a single retry delay (milliseconds)
    pub retry_max_delay_ms: u64,

    pub duplicate_policy: DuplicatePolicy,

    /// How often a worker renews the lease on its running job (milliseconds)
    pub heartbeat_interval_ms: u64,

    /// A running job whose lease is older than this is requeued (milliseconds)
    pub heartbeat_timeout_ms: u64,

    /// Slack added to the per-stage timeouts to form the job deadline (milliseconds)
    pub deadline_margin_ms: u64,

    /// Terminal jobs kept for status queries before the oldest are evicted
    pub finished_job_retention: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            duplicate_policy: DuplicatePolicy::ReturnExisting,
            heartbeat_interval_ms: 1_000,
            heartbeat_timeout_ms: 15_000,
            deadline_margin_ms: 5_000,
            finished_job_retention: 10_000,
        }
    }
}

/// Static thresholds consulted by the SEO checks
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ChecksConfig {
    /// Upper bound on a single check's evaluation (milliseconds)
    pub check_timeout_ms: u64,

    pub title_min_length: usize,
    pub title_max_length: usize,
    pub description_min_length: usize,
    pub description_max_length: usize,

    /// Visible words below which content is reported as thin
    pub min_word_count: usize,

    /// HTML documents heavier than this are flagged (bytes)
    pub max_page_bytes: usize,

    /// Referenced scripts, stylesheets and images above this are flagged
    pub max_resource_count: usize,

    /// Points removed from the overall score per critical issue
    pub critical_deduction: u32,

    /// Crawler token evaluated against robots.txt rules
    pub robots_agent: String,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            check_timeout_ms: 2_000,
            title_min_length: 30,
            title_max_length: 60,
            description_min_length: 70,
            description_max_length: 160,
            min_word_count: 300,
            max_page_bytes: 1024 * 1024,
            max_resource_count: 100,
            critical_deduction: 5,
            robots_agent: "Googlebot".to_string(),
        }
    }
}

/// Result store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Tries per result before the job is reported as unpersisted
    pub persist_attempts: u32,

    /// Pause between persist tries (milliseconds)
    pub persist_retry_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "./autoseo.db".to_string(),
            persist_attempts: 3,
            persist_retry_delay_ms: 200,
        }
    }
}

/// Billing plan a tenant is on; supplies default quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    /// Default `(max_concurrent_jobs, max_queue_depth)` for the plan
    pub fn default_limits(&self) -> (u32, u32) {
        match self {
            Plan::Free => (1, 10),
            Plan::Pro => (4, 100),
            Plan::Enterprise => (16, 1000),
        }
    }
}

/// A tenant and its quota overrides
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TenantEntry {
    pub id: String,

    #[serde(default = "default_plan")]
    pub plan: Plan,

    /// Overrides the plan's concurrent-job limit
    #[serde(default)]
    pub max_concurrent_jobs: Option<u32>,

    /// Overrides the plan's queue-depth limit
    #[serde(default)]
    pub max_queue_depth: Option<u32>,
}

fn default_plan() -> Plan {
    Plan::Free
}
