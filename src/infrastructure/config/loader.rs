use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid api.base_url: {0:?}. Must start with http:// or https://")]
    InvalidBaseUrl(String),

    #[error("Invalid api.timeout_secs: {0}. Must be between 1 and 600")]
    InvalidTimeout(u64),

    #[error("Invalid api.requests_per_second: {0}. Must be at least 1")]
    InvalidRateLimit(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid comparison.poll_interval_ms: {0}. Must be at least 100")]
    InvalidPollInterval(u64),

    #[error("Invalid comparison.max_poll_attempts: {0}. Must be between 1 and 10000")]
    InvalidMaxPollAttempts(u32),

    #[error("Invalid execution.max_concurrent_workers: {0}. Must be between 1 and 32")]
    InvalidMaxWorkers(u32),

    #[error("Invalid workflow.max_fix_iterations: {0}. Must be between 1 and 20")]
    InvalidMaxFixIterations(u32),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .testflow/config.yaml
    /// 3. .testflow/local.yaml (uncommitted overrides)
    /// 4. TESTFLOW_* environment variables, `__` between nesting levels
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`] with `.testflow/` resolved under `root`.
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config> {
        let dir = root.as_ref().join(".testflow");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("TESTFLOW_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, without env overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let api = &config.api;
        if !(api.base_url.starts_with("http://") || api.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(api.base_url.clone()));
        }
        if api.timeout_secs == 0 || api.timeout_secs > 600 {
            return Err(ConfigError::InvalidTimeout(api.timeout_secs));
        }
        if api.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(api.requests_per_second));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.comparison.poll_interval_ms < 100 {
            return Err(ConfigError::InvalidPollInterval(config.comparison.poll_interval_ms));
        }
        if config.comparison.max_poll_attempts == 0 || config.comparison.max_poll_attempts > 10_000 {
            return Err(ConfigError::InvalidMaxPollAttempts(config.comparison.max_poll_attempts));
        }

        let workers = config.execution.max_concurrent_workers;
        if workers == 0 || workers > 32 {
            return Err(ConfigError::InvalidMaxWorkers(workers));
        }

        let iterations = config.workflow.max_fix_iterations;
        if iterations == 0 || iterations > 20 {
            return Err(ConfigError::InvalidMaxFixIterations(iterations));
        }

        Ok(())
    }
}
