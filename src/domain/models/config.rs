use serde::{Deserialize, Serialize};

/// Main configuration structure for testflow
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Testing service API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Database configuration (durable client state)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Comparison polling configuration
    #[serde(default)]
    pub comparison: ComparisonConfig,

    /// Batch execution configuration
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Workflow runner configuration
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Testing service API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ApiConfig {
    /// Base URL of the testing service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Requests per second allowed against the service
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

fn default_base_url() -> String {
    "http://localhost:3001".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_requests_per_second() -> u32 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".testflow/state.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}

/// Comparison polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComparisonConfig {
    /// Delay between polls of a running comparison
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Polls before a still-running comparison is treated as failed
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

const fn default_poll_interval_ms() -> u64 {
    3000
}

const fn default_max_poll_attempts() -> u32 {
    200
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

/// Batch execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionConfig {
    /// Maximum number of concurrent test workers (1-32)
    #[serde(default = "default_max_concurrent_workers")]
    pub max_concurrent_workers: u32,

    /// Delay between run status refreshes while awaiting a batch
    #[serde(default = "default_execution_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

const fn default_max_concurrent_workers() -> u32 {
    4
}

const fn default_execution_poll_interval_ms() -> u64 {
    2000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: default_max_concurrent_workers(),
            poll_interval_ms: default_execution_poll_interval_ms(),
        }
    }
}

/// Workflow runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowConfig {
    /// Verifying → fixing rollbacks allowed before the workflow gives up
    #[serde(default = "default_max_fix_iterations")]
    pub max_fix_iterations: u32,

    /// Ask the diagnosis service to use its LLM analyzer
    #[serde(default = "default_true")]
    pub use_llm_diagnosis: bool,
}

const fn default_max_fix_iterations() -> u32 {
    3
}

const fn default_true() -> bool {
    true
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_fix_iterations: default_max_fix_iterations(),
            use_llm_diagnosis: default_true(),
        }
    }
}
