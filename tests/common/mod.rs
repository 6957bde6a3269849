//! Common test utilities for integration tests
//!
//! `ScriptedTestingApi` stands in for the remote testing service. Each
//! endpoint replays a script; the last scripted response repeats once the
//! script runs out.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use testflow::domain::errors::{DomainError, DomainResult};
use testflow::domain::models::{
    ActiveExecution, BatchApplyReport, ComparisonListEntry, ComparisonRequest, ComparisonRun,
    ComparisonStarted, ComparisonStatus, DeployReport, DiagnosisReport, EnvironmentResult,
    ExecutionRequest, ExecutionStarted, Fix, FixApplyOutcome, FixType, FixVerification, RunStatus,
    TestRun, VerificationReport,
};
use testflow::domain::ports::{ComparisonApi, ExecutionApi, FixApi};

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Pops the next scripted item, repeating the last one.
fn next_of<T: Clone>(script: &mut VecDeque<T>) -> Option<T> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

#[derive(Default)]
struct Script {
    // execution
    run_ids: VecDeque<String>,
    runs: HashMap<String, VecDeque<TestRun>>,
    active: Option<ActiveExecution>,

    // comparison
    comparisons: HashMap<String, VecDeque<ComparisonRun>>,
    history: Vec<ComparisonListEntry>,
    next_comparison: Option<String>,

    // fixes
    diagnosis: Option<DiagnosisReport>,
    fixes: Vec<Fix>,
    failing_fixes: HashSet<String>,
    verifications: VecDeque<bool>,
    generate_per_listing: bool,
    listings: u32,
}

/// Scripted stand-in for every testing-service port.
#[derive(Default)]
pub struct ScriptedTestingApi {
    script: Mutex<Script>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTestingApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Responses for `get_run(run_id)`, and the id the next start returns.
    pub fn script_run(&self, run_id: &str, responses: Vec<TestRun>) {
        let mut script = self.script.lock().unwrap();
        script.run_ids.push_back(run_id.to_string());
        script.runs.insert(run_id.to_string(), responses.into());
    }

    pub fn script_active(&self, active: ActiveExecution) {
        self.script.lock().unwrap().active = Some(active);
    }

    /// Responses for `get_comparison_run(id)`.
    pub fn script_comparison(&self, comparison_id: &str, responses: Vec<ComparisonRun>) {
        self.script
            .lock()
            .unwrap()
            .comparisons
            .insert(comparison_id.to_string(), responses.into());
    }

    /// Id returned by the next `start_comparison`.
    pub fn next_comparison(&self, comparison_id: &str) {
        self.script.lock().unwrap().next_comparison = Some(comparison_id.to_string());
    }

    pub fn script_history(&self, history: Vec<ComparisonListEntry>) {
        self.script.lock().unwrap().history = history;
    }

    pub fn script_diagnosis(&self, report: DiagnosisReport) {
        self.script.lock().unwrap().diagnosis = Some(report);
    }

    /// Fixes the server knows about. New ones can be added between phases.
    pub fn add_fixes(&self, fixes: Vec<Fix>) {
        self.script.lock().unwrap().fixes.extend(fixes);
    }

    /// Every `list_fixes` call discovers one more pending fix (`auto-N`).
    pub fn generate_fix_per_listing(&self) {
        self.script.lock().unwrap().generate_per_listing = true;
    }

    pub fn fail_fix(&self, fix_id: &str) {
        self.script.lock().unwrap().failing_fixes.insert(fix_id.to_string());
    }

    /// `overall_effective` for successive verify calls.
    pub fn script_verifications(&self, effective: Vec<bool>) {
        self.script.lock().unwrap().verifications = effective.into();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ExecutionApi for ScriptedTestingApi {
    async fn start_execution(&self, request: &ExecutionRequest) -> DomainResult<ExecutionStarted> {
        self.record(format!("start_execution:{}", request.test_ids.join(",")));
        let run_id = self
            .script
            .lock()
            .unwrap()
            .run_ids
            .pop_front()
            .ok_or_else(|| DomainError::Remote("no run scripted".to_string()))?;
        Ok(ExecutionStarted {
            run_id,
            status: RunStatus::Running,
            total: None,
        })
    }

    async fn get_active_execution(&self) -> DomainResult<ActiveExecution> {
        self.record("get_active_execution".to_string());
        Ok(self.script.lock().unwrap().active.clone().unwrap_or_default())
    }

    async fn stop_execution(&self, run_id: &str) -> DomainResult<()> {
        self.record(format!("stop_execution:{run_id}"));
        Ok(())
    }

    async fn pause_execution(&self, run_id: &str) -> DomainResult<()> {
        self.record(format!("pause_execution:{run_id}"));
        Ok(())
    }

    async fn resume_execution(&self, run_id: &str) -> DomainResult<()> {
        self.record(format!("resume_execution:{run_id}"));
        Ok(())
    }

    async fn list_runs(&self) -> DomainResult<Vec<TestRun>> {
        self.record("list_runs".to_string());
        let script = self.script.lock().unwrap();
        Ok(script
            .runs
            .values()
            .filter_map(|responses| responses.back().cloned())
            .collect())
    }

    async fn get_run(&self, run_id: &str) -> DomainResult<TestRun> {
        self.record(format!("get_run:{run_id}"));
        let mut script = self.script.lock().unwrap();
        script
            .runs
            .get_mut(run_id)
            .and_then(next_of)
            .ok_or_else(|| DomainError::Remote(format!("404: run {run_id}")))
    }
}

#[async_trait]
impl ComparisonApi for ScriptedTestingApi {
    async fn start_comparison(&self, request: &ComparisonRequest) -> DomainResult<ComparisonStarted> {
        self.record(format!("start_comparison:{}", request.test_ids.join(",")));
        let comparison_id = self
            .script
            .lock()
            .unwrap()
            .next_comparison
            .take()
            .ok_or_else(|| DomainError::Remote("no comparison scripted".to_string()))?;
        Ok(ComparisonStarted {
            comparison_id,
            status: ComparisonStatus::Running,
            message: None,
        })
    }

    async fn get_comparison_run(&self, comparison_id: &str) -> DomainResult<ComparisonRun> {
        self.record(format!("get_comparison_run:{comparison_id}"));
        let mut script = self.script.lock().unwrap();
        script
            .comparisons
            .get_mut(comparison_id)
            .and_then(next_of)
            .ok_or_else(|| DomainError::Remote(format!("404: comparison {comparison_id}")))
    }

    async fn list_comparisons(&self) -> DomainResult<Vec<ComparisonListEntry>> {
        self.record("list_comparisons".to_string());
        Ok(self.script.lock().unwrap().history.clone())
    }
}

#[async_trait]
impl FixApi for ScriptedTestingApi {
    async fn run_diagnosis(&self, run_id: &str, use_llm: bool) -> DomainResult<DiagnosisReport> {
        self.record(format!("run_diagnosis:{run_id}:{use_llm}"));
        Ok(self.script.lock().unwrap().diagnosis.clone().unwrap_or(DiagnosisReport {
            success: true,
            ..DiagnosisReport::default()
        }))
    }

    async fn list_fixes(&self, _run_id: Option<&str>) -> DomainResult<Vec<Fix>> {
        self.record("list_fixes".to_string());
        let mut script = self.script.lock().unwrap();
        if script.generate_per_listing {
            script.listings += 1;
            let fix = pending_fix(&format!("auto-{}", script.listings));
            script.fixes.push(fix);
        }
        Ok(script.fixes.clone())
    }

    async fn apply_batch_fixes(&self, fix_ids: &[String]) -> DomainResult<BatchApplyReport> {
        self.record(format!("apply_batch_fixes:{}", fix_ids.join(",")));
        let script = self.script.lock().unwrap();
        let results = fix_ids
            .iter()
            .map(|id| {
                let failed = script.failing_fixes.contains(id);
                FixApplyOutcome {
                    fix_id: id.clone(),
                    success: !failed,
                    file_key: None,
                    new_version: (!failed).then(|| format!("{id}-v2")),
                    error: failed.then(|| "patch did not apply".to_string()),
                }
            })
            .collect();
        Ok(BatchApplyReport { results })
    }

    async fn verify_fixes(&self, fix_ids: &[String]) -> DomainResult<VerificationReport> {
        self.record(format!("verify_fixes:{}", fix_ids.join(",")));
        let effective = next_of(&mut self.script.lock().unwrap().verifications).unwrap_or(true);
        Ok(VerificationReport {
            overall_effective: effective,
            fix_ids: fix_ids.to_vec(),
            results: fix_ids
                .iter()
                .map(|id| FixVerification {
                    fix_id: id.clone(),
                    effective,
                    test_id: None,
                })
                .collect(),
        })
    }

    async fn deploy_fixes(&self, fix_ids: &[String]) -> DomainResult<DeployReport> {
        self.record(format!("deploy_fixes:{}", fix_ids.join(",")));
        Ok(DeployReport {
            deployed: u32::try_from(fix_ids.len()).unwrap(),
        })
    }
}

/// Fixed timestamp `secs` after 2024-01-01T00:00:00Z.
pub fn at(secs: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

pub fn env_result(passed: bool) -> EnvironmentResult {
    EnvironmentResult {
        passed,
        turn_count: 3,
        duration_ms: 1200,
        ran_at: at(10),
    }
}

pub fn running_comparison(comparison_id: &str) -> ComparisonRun {
    ComparisonRun::new(comparison_id, at(0))
}

pub fn completed_comparison(comparison_id: &str) -> ComparisonRun {
    let mut run = ComparisonRun::new(comparison_id, at(0));
    run.status = ComparisonStatus::Completed;
    run.completed_at = Some(at(60));
    run.production_results.insert("t1".into(), env_result(false));
    run.sandbox_a_results.insert("t1".into(), env_result(true));
    run.production_results.insert("t2".into(), env_result(true));
    run.sandbox_a_results.insert("t2".into(), env_result(true));
    run
}

pub fn finished_run(run_id: &str, passed: u32, failed: u32) -> TestRun {
    TestRun::new(run_id)
        .with_counts(passed + failed, passed, failed)
        .with_status(RunStatus::Completed)
}

pub fn in_progress_run(run_id: &str) -> TestRun {
    TestRun::new(run_id).with_status(RunStatus::Running)
}

pub fn pending_fix(fix_id: &str) -> Fix {
    Fix::new(fix_id, FixType::Prompt, "prompts/system.md").with_description(format!("fix {fix_id}"))
}
