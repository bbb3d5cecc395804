//! Configuration module for AutoSEO
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use autoseo::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("autoseo.toml")).unwrap();
//! println!("Worker pool size: {}", config.scheduler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ChecksConfig, Config, DuplicatePolicy, FetcherConfig, Plan, SchedulerConfig, StoreConfig,
    TenantEntry, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
