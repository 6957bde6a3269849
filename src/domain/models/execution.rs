//! Batch execution job types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::test_run::RunStatus;

/// Client-side view of the batch job.
///
/// ```text
/// Idle → Running ⇄ Paused
///   ↑______↓_________↓   (stop)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Paused,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to run in a batch execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Test ids to run. Empty means the full suite.
    #[serde(default)]
    pub test_ids: Vec<String>,
    /// Number of parallel workers requested.
    pub concurrency: u32,
    /// Restrict to previously failing tests.
    #[serde(default)]
    pub failed_only: bool,
}

impl ExecutionRequest {
    pub fn new(concurrency: u32) -> Self {
        Self {
            test_ids: Vec::new(),
            concurrency,
            failed_only: false,
        }
    }

    pub fn with_tests(mut self, test_ids: Vec<String>) -> Self {
        self.test_ids = test_ids;
        self
    }
}

/// Immediate response to an execution start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStarted {
    pub run_id: String,
    #[serde(default)]
    pub status: RunStatus,
    /// Number of tests the server queued, when it reports one.
    #[serde(default)]
    pub total: Option<u32>,
}

/// Counters for the current batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProgress {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub passed: u32,
    #[serde(default)]
    pub failed: u32,
}

impl ExecutionProgress {
    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.completed)
    }
}

/// A test claimed by a worker, shown before its result record exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningTestInfo {
    pub test_id: String,
    #[serde(default)]
    pub test_name: String,
    #[serde(default)]
    pub worker_id: u32,
    pub started_at: DateTime<Utc>,
}

impl RunningTestInfo {
    pub fn new(test_id: impl Into<String>, worker_id: u32) -> Self {
        Self {
            test_id: test_id.into(),
            test_name: String::new(),
            worker_id,
            started_at: Utc::now(),
        }
    }
}

/// Server-side view of whatever job is currently executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActiveExecution {
    pub active: bool,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
    #[serde(default)]
    pub progress: Option<ExecutionProgress>,
    #[serde(default)]
    pub workers: Vec<RunningTestInfo>,
}
