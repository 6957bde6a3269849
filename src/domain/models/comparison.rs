//! Multi-environment comparison runs and the derived per-test matrix.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Environment variant a comparison can replicate a test on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Production,
    SandboxA,
    SandboxB,
}

impl Environment {
    pub const ALL: [Environment; 3] = [Self::Production, Self::SandboxA, Self::SandboxB];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::SandboxA => "sandbox_a",
            Self::SandboxB => "sandbox_b",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "production" | "prod" => Ok(Self::Production),
            "sandbox_a" | "a" => Ok(Self::SandboxA),
            "sandbox_b" | "b" => Ok(Self::SandboxB),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Status of a comparison job as reported by the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl ComparisonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one test on one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentResult {
    pub passed: bool,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default)]
    pub duration_ms: u64,
    pub ran_at: DateTime<Utc>,
}

/// `testId -> result` for one environment.
pub type EnvironmentResults = BTreeMap<String, EnvironmentResult>;

/// Request to replicate a set of tests across environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRequest {
    pub environments: Vec<Environment>,
    pub test_ids: Vec<String>,
}

impl ComparisonRequest {
    pub fn new(environments: Vec<Environment>, test_ids: Vec<String>) -> Self {
        Self {
            environments,
            test_ids,
        }
    }
}

/// Immediate response to a comparison start; the job keeps running remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonStarted {
    pub comparison_id: String,
    pub status: ComparisonStatus,
    #[serde(default)]
    pub message: Option<String>,
}

/// Aggregate outcome of a finished comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    #[serde(default)]
    pub total_tests: u32,
    #[serde(default)]
    pub production_pass_rate: f64,
    #[serde(default)]
    pub sandbox_a_pass_rate: f64,
    #[serde(default)]
    pub sandbox_b_pass_rate: f64,
    /// Tests that did not pass on production but passed on a sandbox.
    #[serde(default)]
    pub improvements: Vec<String>,
    /// Tests that passed on production but failed on a sandbox.
    #[serde(default)]
    pub regressions: Vec<String>,
}

impl ComparisonSummary {
    /// Placeholder shape shown while a comparison is still running.
    pub fn zeroed() -> Self {
        Self::default()
    }

    pub fn derive(run: &ComparisonRun) -> Self {
        let matrix = ComparisonMatrix::build(run);
        let mut improvements = Vec::new();
        let mut regressions = Vec::new();

        for row in &matrix.rows {
            let sandboxes = [row.sandbox_a.as_ref(), row.sandbox_b.as_ref()];
            let production_passed = row.production.as_ref().is_some_and(|r| r.passed);

            if !production_passed && sandboxes.iter().flatten().any(|r| r.passed) {
                improvements.push(row.test_id.clone());
            }
            if production_passed && sandboxes.iter().flatten().any(|r| !r.passed) {
                regressions.push(row.test_id.clone());
            }
        }

        Self {
            total_tests: u32::try_from(matrix.rows.len()).unwrap_or(u32::MAX),
            production_pass_rate: pass_rate(&run.production_results),
            sandbox_a_pass_rate: pass_rate(&run.sandbox_a_results),
            sandbox_b_pass_rate: pass_rate(&run.sandbox_b_results),
            improvements,
            regressions,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn pass_rate(results: &EnvironmentResults) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let passed = results.values().filter(|r| r.passed).count();
    passed as f64 / results.len() as f64
}

/// A comparison job and its raw per-environment results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRun {
    pub comparison_id: String,
    #[serde(default)]
    pub status: ComparisonStatus,
    #[serde(default)]
    pub production_results: EnvironmentResults,
    #[serde(default)]
    pub sandbox_a_results: EnvironmentResults,
    #[serde(default)]
    pub sandbox_b_results: EnvironmentResults,
    #[serde(default)]
    pub summary: Option<ComparisonSummary>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ComparisonRun {
    pub fn new(comparison_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            comparison_id: comparison_id.into(),
            status: ComparisonStatus::Running,
            production_results: EnvironmentResults::new(),
            sandbox_a_results: EnvironmentResults::new(),
            sandbox_b_results: EnvironmentResults::new(),
            summary: None,
            started_at,
            completed_at: None,
            error: None,
        }
    }

    pub fn results_for(&self, environment: Environment) -> &EnvironmentResults {
        match environment {
            Environment::Production => &self.production_results,
            Environment::SandboxA => &self.sandbox_a_results,
            Environment::SandboxB => &self.sandbox_b_results,
        }
    }

    /// Summary to display: the remote one once terminal, derived if absent,
    /// zeroed while still running.
    pub fn effective_summary(&self) -> ComparisonSummary {
        if !self.status.is_terminal() {
            return ComparisonSummary::zeroed();
        }
        self.summary
            .clone()
            .unwrap_or_else(|| ComparisonSummary::derive(self))
    }
}

/// Entry in the list of past comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonListEntry {
    pub comparison_id: String,
    #[serde(default)]
    pub status: ComparisonStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<ComparisonSummary>,
}

/// One test's cells across the three environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonMatrixRow {
    pub test_id: String,
    pub production: Option<EnvironmentResult>,
    pub sandbox_a: Option<EnvironmentResult>,
    pub sandbox_b: Option<EnvironmentResult>,
}

impl ComparisonMatrixRow {
    pub fn cell(&self, environment: Environment) -> Option<&EnvironmentResult> {
        match environment {
            Environment::Production => self.production.as_ref(),
            Environment::SandboxA => self.sandbox_a.as_ref(),
            Environment::SandboxB => self.sandbox_b.as_ref(),
        }
    }
}

/// Normalized per-test view of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ComparisonMatrix {
    pub rows: Vec<ComparisonMatrixRow>,
}

impl ComparisonMatrix {
    /// Rows are the union of test ids across all environments, sorted by id.
    /// A test missing from an environment gets an empty cell there.
    pub fn build(run: &ComparisonRun) -> Self {
        let test_ids: BTreeSet<&String> = run
            .production_results
            .keys()
            .chain(run.sandbox_a_results.keys())
            .chain(run.sandbox_b_results.keys())
            .collect();

        let rows = test_ids
            .into_iter()
            .map(|test_id| ComparisonMatrixRow {
                test_id: test_id.clone(),
                production: run.production_results.get(test_id).cloned(),
                sandbox_a: run.sandbox_a_results.get(test_id).cloned(),
                sandbox_b: run.sandbox_b_results.get(test_id).cloned(),
            })
            .collect();

        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(passed: bool) -> EnvironmentResult {
        EnvironmentResult {
            passed,
            turn_count: 4,
            duration_ms: 900,
            ran_at: Utc::now(),
        }
    }

    #[test]
    fn test_matrix_is_union_of_environment_keys() {
        let mut run = ComparisonRun::new("cmp", Utc::now());
        run.production_results.insert("t1".into(), result(true));
        run.sandbox_a_results.insert("t1".into(), result(true));
        run.sandbox_a_results.insert("t2".into(), result(false));

        let matrix = ComparisonMatrix::build(&run);
        assert_eq!(matrix.len(), 2);

        let t1 = &matrix.rows[0];
        assert_eq!(t1.test_id, "t1");
        assert!(t1.production.is_some());
        assert!(t1.sandbox_a.is_some());
        assert!(t1.sandbox_b.is_none());

        let t2 = &matrix.rows[1];
        assert_eq!(t2.test_id, "t2");
        assert!(t2.production.is_none());
        assert!(t2.cell(Environment::SandboxA).is_some());
        assert!(t2.sandbox_b.is_none());
    }

    #[test]
    fn test_empty_run_has_empty_matrix() {
        let run = ComparisonRun::new("cmp", Utc::now());
        assert!(ComparisonMatrix::build(&run).is_empty());
    }

    #[test]
    fn test_derive_summary() {
        let mut run = ComparisonRun::new("cmp", Utc::now());
        run.production_results.insert("fixed".into(), result(false));
        run.sandbox_a_results.insert("fixed".into(), result(true));
        run.production_results.insert("broken".into(), result(true));
        run.sandbox_b_results.insert("broken".into(), result(false));
        run.production_results.insert("same".into(), result(true));
        run.sandbox_a_results.insert("same".into(), result(true));

        let summary = ComparisonSummary::derive(&run);
        assert_eq!(summary.total_tests, 3);
        assert_eq!(summary.improvements, vec!["fixed".to_string()]);
        assert_eq!(summary.regressions, vec!["broken".to_string()]);
        assert!((summary.production_pass_rate - 2.0 / 3.0).abs() < f64::EPSILON);
        assert!((summary.sandbox_a_pass_rate - 1.0).abs() < f64::EPSILON);
        assert!(summary.sandbox_b_pass_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn test_effective_summary_zeroed_while_running() {
        let mut run = ComparisonRun::new("cmp", Utc::now());
        run.production_results.insert("t1".into(), result(true));
        assert_eq!(run.effective_summary(), ComparisonSummary::zeroed());

        run.status = ComparisonStatus::Completed;
        assert_eq!(run.effective_summary().total_tests, 1);
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("sandbox-a".parse::<Environment>(), Ok(Environment::SandboxA));
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Production));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_run_wire_format() {
        let json = r#"{
            "comparisonId": "cmp-9",
            "status": "running",
            "productionResults": {"t1": {"passed": true, "turnCount": 6, "durationMs": 4100, "ranAt": "2025-03-01T10:00:00Z"}},
            "sandboxAResults": {},
            "sandboxBResults": {},
            "startedAt": "2025-03-01T09:59:00Z"
        }"#;
        let run: ComparisonRun = serde_json::from_str(json).unwrap();
        assert_eq!(run.comparison_id, "cmp-9");
        assert_eq!(run.production_results["t1"].turn_count, 6);
        assert!(run.summary.is_none());
        assert!(!run.status.is_terminal());
    }
}
