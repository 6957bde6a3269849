//! Batch test runs and their per-test results.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Collection;

/// Lifecycle status of a batch test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal runs are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single scripted test within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Running,
    Passed,
    Failed,
    Error,
    Skipped,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One batch execution of scripted conversations against the agent under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    /// Identity. Empty when the source omitted it.
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub passed: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub results: Collection<TestResult>,
}

impl TestRun {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    pub fn with_counts(mut self, total: u32, passed: u32, failed: u32) -> Self {
        self.total = total;
        self.passed = passed;
        self.failed = failed;
        self
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_results(mut self, results: Vec<TestResult>) -> Self {
        self.results = Arc::new(results.into_iter().map(Arc::new).collect());
        self
    }

    /// Result ids that did not pass, in result order.
    pub fn failed_test_ids(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, ResultStatus::Failed | ResultStatus::Error))
            .map(|r| r.test_id.clone())
            .collect()
    }
}

/// Result of one scripted test inside a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Identity within the run. Empty when the source omitted it.
    #[serde(default)]
    pub test_id: String,
    #[serde(default)]
    pub status: ResultStatus,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl TestResult {
    pub fn new(test_id: impl Into<String>, status: ResultStatus) -> Self {
        Self {
            test_id: test_id.into(),
            status,
            duration_ms: 0,
            error_message: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_terminal() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!ResultStatus::Running.is_final());
        assert!(ResultStatus::Error.is_final());
    }

    #[test]
    fn test_run_deserializes_camel_case_with_missing_fields() {
        let json = r#"{"runId":"run-7","total":3,"passed":2,"status":"running",
            "results":[{"testId":"t1","status":"passed","durationMs":1200}]}"#;
        let run: TestRun = serde_json::from_str(json).unwrap();
        assert_eq!(run.run_id, "run-7");
        assert_eq!(run.failed, 0);
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].duration_ms, 1200);
        assert!(run.results[0].error_message.is_none());
    }

    #[test]
    fn test_failed_test_ids() {
        let run = TestRun::new("r").with_results(vec![
            TestResult::new("a", ResultStatus::Passed),
            TestResult::new("b", ResultStatus::Failed),
            TestResult::new("c", ResultStatus::Error).with_error("boom"),
        ]);
        assert_eq!(run.failed_test_ids(), vec!["b".to_string(), "c".to_string()]);
    }
}
