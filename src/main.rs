//! AutoSEO main entry point
//!
//! This is the command-line interface for the AutoSEO analysis pipeline.

use anyhow::{bail, Context};
use autoseo::checks::{AnalysisResult, Severity};
use autoseo::config::{load_config_with_hash, Config};
use autoseo::crawler::Coordinator;
use autoseo::storage::{open_store, ResultStore};
use autoseo::url::validate_target_url;
use autoseo::{AnalysisOptions, Job, JobId, JobState};
use clap::Parser;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// AutoSEO: multi-tenant SEO crawl-and-score pipeline
///
/// Fetches each URL, runs the on-page SEO checks against it, scores the
/// result and stores it in the configured result database.
#[derive(Parser, Debug)]
#[command(name = "autoseo")]
#[command(version = "1.0.0")]
#[command(about = "Analyze pages for on-page SEO problems", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Pages to analyze
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Tenant to submit the jobs as (defaults to the only configured tenant)
    #[arg(short, long)]
    tenant: Option<String>,

    /// Run only these checks (comma-separated ids)
    #[arg(long, value_delimiter = ',')]
    checks: Vec<String>,

    /// Fetch budget per page in milliseconds
    #[arg(long)]
    fetch_timeout_ms: Option<u64>,

    /// Redirects followed before giving up
    #[arg(long)]
    max_redirects: Option<u32>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and URLs without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "show"])]
    dry_run: bool,

    /// Show statistics from the result database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "show"])]
    stats: bool,

    /// Print a stored result and exit
    #[arg(long, value_name = "JOB_ID", conflicts_with_all = ["dry_run", "stats"])]
    show: Option<JobId>,

    /// With --stats, also list this many recent results for the tenant
    #[arg(long, default_value_t = 0)]
    history: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&cli, &config)
    } else if cli.stats {
        handle_stats(&cli, &config).await
    } else if let Some(job_id) = cli.show {
        handle_show(&cli, &config, job_id).await
    } else {
        handle_analyze(&cli, config).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("autoseo=info,warn"),
            1 => EnvFilter::new("autoseo=debug,info"),
            2 => EnvFilter::new("autoseo=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_tenant(cli: &Cli, config: &Config) -> anyhow::Result<String> {
    if let Some(tenant) = &cli.tenant {
        return Ok(tenant.clone());
    }
    match config.tenants.as_slice() {
        [only] => Ok(only.id.clone()),
        [] => bail!("no [[tenant]] configured"),
        _ => bail!("several tenants configured; pick one with --tenant"),
    }
}

fn options_from(cli: &Cli) -> AnalysisOptions {
    let defaults = AnalysisOptions::default();
    AnalysisOptions {
        max_redirects: cli.max_redirects.unwrap_or(defaults.max_redirects),
        fetch_timeout_ms: cli.fetch_timeout_ms.unwrap_or(defaults.fetch_timeout_ms),
        checks: if cli.checks.is_empty() {
            None
        } else {
            Some(cli.checks.iter().cloned().collect::<BTreeSet<_>>())
        },
    }
}

/// Handles the --dry-run mode: validates config and URLs
fn handle_dry_run(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    println!("=== AutoSEO Dry Run ===\n");

    println!("User Agent: {}", config.user_agent.header_value());

    println!("\nScheduler:");
    println!("  Workers: {}", config.scheduler.workers);
    println!("  Max attempts: {}", config.scheduler.max_attempts);
    println!(
        "  Retry backoff: {}ms to {}ms",
        config.scheduler.retry_base_delay_ms, config.scheduler.retry_max_delay_ms
    );
    println!("  Duplicate policy: {:?}", config.scheduler.duplicate_policy);

    println!("\nStore:");
    println!("  Database: {}", config.store.database_path);

    println!("\nTenants ({}):", config.tenants.len());
    for tenant in &config.tenants {
        let quota = autoseo::TenantQuota::from(tenant);
        println!(
            "  - {} ({:?}): {} concurrent, {} queued",
            tenant.id, tenant.plan, quota.max_concurrent_jobs, quota.max_queue_depth
        );
    }

    let registry = autoseo::checks::CheckRegistry::with_defaults(&config.checks);
    println!("\nChecks ({}):", registry.len());
    for (id, weight) in registry.weights() {
        println!("  - {} (weight {})", id, weight);
    }

    let mut invalid = 0;
    println!("\nURLs ({}):", cli.urls.len());
    for url in &cli.urls {
        match validate_target_url(url) {
            Ok(parsed) => println!("  ✓ {}", parsed),
            Err(e) => {
                invalid += 1;
                println!("  ✗ {} ({})", url, e);
            }
        }
    }

    println!("\n✓ Configuration is valid");
    if invalid > 0 {
        bail!("{} URL(s) would be rejected", invalid);
    }
    Ok(())
}

/// Handles the --stats mode: shows statistics from the result database
async fn handle_stats(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let store = open_store(Path::new(&config.store.database_path))?;
    let stats = store.stats().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Database: {}\n", config.store.database_path);
        println!("Results:        {}", stats.results);
        println!("  Succeeded:    {}", stats.succeeded);
        println!("  Failed:       {}", stats.failed);
        match stats.average_score {
            Some(avg) => println!("Average score:  {:.1}", avg),
            None => println!("Average score:  -"),
        }
        println!("Issues:");
        for severity in [Severity::Critical, Severity::Warning, Severity::Info] {
            println!("  {:<12}  {}", severity, stats.issue_count(severity));
        }
    }

    if cli.history > 0 {
        let tenant = resolve_tenant(cli, config)?;
        let recent = store.list_for_tenant(&tenant, cli.history).await?;
        println!("\nRecent results for {}:", tenant);
        for result in &recent {
            println!(
                "  {}  {:>3}  {}  {}",
                result.completed_at.format("%Y-%m-%d %H:%M:%S"),
                result.overall_score,
                result.status.as_str(),
                result.url
            );
        }
    }

    Ok(())
}

/// Handles the --show mode: prints one stored result
async fn handle_show(cli: &Cli, config: &Config, job_id: JobId) -> anyhow::Result<()> {
    let store = open_store(Path::new(&config.store.database_path))?;
    let Some(result) = store.get(job_id).await? else {
        bail!("no stored result for job {}", job_id);
    };
    print_result(&result, cli.json)
}

/// Handles the main mode: analyzes every URL and reports the outcomes
async fn handle_analyze(cli: &Cli, config: Config) -> anyhow::Result<()> {
    if cli.urls.is_empty() {
        bail!("nothing to analyze; pass one or more URLs");
    }
    let tenant = resolve_tenant(cli, &config)?;
    let options = options_from(cli);

    let coordinator = Coordinator::from_config(config)?;
    let pool = coordinator.start();

    let mut submitted: Vec<JobId> = Vec::new();
    let mut rejected = 0;
    for url in &cli.urls {
        match coordinator.submit(&tenant, url, options.clone()) {
            Ok(job_id) => {
                if !submitted.contains(&job_id) {
                    submitted.push(job_id);
                }
            }
            Err(e) => {
                rejected += 1;
                tracing::error!("Rejected {}: {}", url, e);
            }
        }
    }

    tokio::select! {
        _ = coordinator.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; cancelling outstanding jobs");
            for job_id in &submitted {
                let _ = coordinator.cancel(*job_id);
            }
            coordinator.wait_idle().await;
        }
    }

    coordinator.close();
    pool.shutdown().await;

    let mut unsuccessful = rejected;
    for job_id in &submitted {
        let Some(job) = coordinator.job(*job_id) else {
            continue;
        };
        if job.state != JobState::Succeeded {
            unsuccessful += 1;
        }
        match coordinator.result(*job_id).await? {
            Some(result) if job.state == JobState::Succeeded => print_result(&result, cli.json)?,
            _ => print_job(&job, cli.json)?,
        }
    }

    if unsuccessful > 0 {
        bail!("{} of {} URL(s) were not analyzed", unsuccessful, cli.urls.len());
    }
    Ok(())
}

fn print_result(result: &AnalysisResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!(
        "\n{}  score {}  risk {}  (job {}, attempt {})",
        result.url,
        result.overall_score,
        result.risk_level(),
        result.job_id,
        result.attempts
    );
    if let Some(error) = &result.error {
        println!("  error: {}", error);
    }

    let priorities: Vec<_> = result
        .prioritized_issues()
        .into_iter()
        .filter(|issue| issue.severity > Severity::Info)
        .take(5)
        .collect();
    if !priorities.is_empty() {
        println!("  fix first:");
        for issue in priorities {
            println!("    [{}] {}: {}", issue.severity, issue.check_id, issue.message);
        }
    }
    for check in &result.check_results {
        println!("  {:<18} {:>3}", check.check_id, check.sub_score);
        for issue in &check.issues {
            match &issue.locator {
                Some(locator) => println!("      [{}] {} ({})", issue.severity, issue.message, locator),
                None => println!("      [{}] {}", issue.severity, issue.message),
            }
        }
    }
    Ok(())
}

fn print_job(job: &Job, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(job)?);
        return Ok(());
    }

    println!("\n{}  {}  (job {}, {} attempt(s))", job.url, job.state, job.id, job.attempts);
    if let Some(error) = &job.last_error {
        println!("  error: {}", error);
    }
    Ok(())
}
