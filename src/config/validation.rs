use crate::config::types::{
    ChecksConfig, Config, FetcherConfig, SchedulerConfig, StoreConfig, TenantEntry,
    UserAgentConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_user_agent_config(&config.user_agent)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_scheduler_config(&config.scheduler)?;
    validate_checks_config(&config.checks)?;
    validate_store_config(&config.store)?;
    validate_tenants(&config.tenants)?;
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.max_body_bytes < 1024 {
        return Err(ConfigError::Validation(format!(
            "max_body_bytes must be >= 1024, got {}",
            config.max_body_bytes
        )));
    }

    if config.connect_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "connect_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.robots_ttl_hours < 0 {
        return Err(ConfigError::Validation(format!(
            "robots_ttl_hours cannot be negative, got {}",
            config.robots_ttl_hours
        )));
    }

    Ok(())
}

fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    if config.retry_max_delay_ms < config.retry_base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry_max_delay_ms ({}) must be >= retry_base_delay_ms ({})",
            config.retry_max_delay_ms, config.retry_base_delay_ms
        )));
    }

    if config.heartbeat_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "heartbeat_interval_ms must be > 0".to_string(),
        ));
    }

    // A lease must survive at least two missed renewals
    if config.heartbeat_timeout_ms < config.heartbeat_interval_ms * 2 {
        return Err(ConfigError::Validation(format!(
            "heartbeat_timeout_ms ({}) must be at least twice heartbeat_interval_ms ({})",
            config.heartbeat_timeout_ms, config.heartbeat_interval_ms
        )));
    }

    Ok(())
}

fn validate_checks_config(config: &ChecksConfig) -> Result<(), ConfigError> {
    if config.check_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "check_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.title_min_length > config.title_max_length {
        return Err(ConfigError::Validation(format!(
            "title_min_length ({}) exceeds title_max_length ({})",
            config.title_min_length, config.title_max_length
        )));
    }

    if config.description_min_length > config.description_max_length {
        return Err(ConfigError::Validation(format!(
            "description_min_length ({}) exceeds description_max_length ({})",
            config.description_min_length, config.description_max_length
        )));
    }

    if config.critical_deduction > 100 {
        return Err(ConfigError::Validation(format!(
            "critical_deduction must be <= 100, got {}",
            config.critical_deduction
        )));
    }

    if config.robots_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "robots_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.persist_attempts < 1 {
        return Err(ConfigError::Validation(
            "persist_attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_tenants(tenants: &[TenantEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in tenants {
        if entry.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "tenant id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(entry.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate tenant id '{}'",
                entry.id
            )));
        }

        if entry.max_concurrent_jobs == Some(0) {
            return Err(ConfigError::Validation(format!(
                "tenant '{}': max_concurrent_jobs must be >= 1",
                entry.id
            )));
        }

        if entry.max_queue_depth == Some(0) {
            return Err(ConfigError::Validation(format!(
                "tenant '{}': max_queue_depth must be >= 1",
                entry.id
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
