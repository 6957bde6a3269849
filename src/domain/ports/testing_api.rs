//! Testing service ports.
//!
//! The batch runner, the comparison runner and the diagnosis/fix service are
//! external collaborators. Every call here returns promptly; long-running work
//! continues remotely and is observed by polling or pushed events.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ActiveExecution, BatchApplyReport, ComparisonListEntry, ComparisonRequest, ComparisonRun,
    ComparisonStarted, DeployReport, DiagnosisReport, ExecutionRequest, ExecutionStarted, Fix,
    TestRun, VerificationReport,
};

/// Batch execution of scripted conversations.
#[async_trait]
pub trait ExecutionApi: Send + Sync {
    /// Start a batch. Returns as soon as the job is queued.
    async fn start_execution(&self, request: &ExecutionRequest) -> DomainResult<ExecutionStarted>;

    /// Describe whatever job is executing server-side right now.
    async fn get_active_execution(&self) -> DomainResult<ActiveExecution>;

    /// Idempotent.
    async fn stop_execution(&self, run_id: &str) -> DomainResult<()>;

    /// Idempotent.
    async fn pause_execution(&self, run_id: &str) -> DomainResult<()>;

    /// Idempotent.
    async fn resume_execution(&self, run_id: &str) -> DomainResult<()>;

    /// Recent runs, newest first, without per-test results.
    async fn list_runs(&self) -> DomainResult<Vec<TestRun>>;

    /// One run including its per-test results.
    async fn get_run(&self, run_id: &str) -> DomainResult<TestRun>;
}

/// Multi-environment comparison jobs.
#[async_trait]
pub trait ComparisonApi: Send + Sync {
    /// Start a comparison. Must not block until the job completes.
    async fn start_comparison(&self, request: &ComparisonRequest) -> DomainResult<ComparisonStarted>;

    async fn get_comparison_run(&self, comparison_id: &str) -> DomainResult<ComparisonRun>;

    /// Past comparisons, newest first.
    async fn list_comparisons(&self) -> DomainResult<Vec<ComparisonListEntry>>;
}

/// Failure diagnosis and remediation.
#[async_trait]
pub trait FixApi: Send + Sync {
    async fn run_diagnosis(&self, run_id: &str, use_llm: bool) -> DomainResult<DiagnosisReport>;

    /// Fixes generated so far, optionally restricted to one run.
    async fn list_fixes(&self, run_id: Option<&str>) -> DomainResult<Vec<Fix>>;

    async fn apply_batch_fixes(&self, fix_ids: &[String]) -> DomainResult<BatchApplyReport>;

    async fn verify_fixes(&self, fix_ids: &[String]) -> DomainResult<VerificationReport>;

    async fn deploy_fixes(&self, fix_ids: &[String]) -> DomainResult<DeployReport>;
}
