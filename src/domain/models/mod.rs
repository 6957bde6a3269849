pub mod comparison;
pub mod config;
pub mod execution;
pub mod fix;
pub mod test_run;
pub mod transcript;
pub mod workflow;

use std::sync::Arc;

/// Shared, identity-preserving collection.
///
/// Items are individually reference-counted so a merge can hand back the
/// exact item (and the exact collection) it was given when nothing changed.
pub type Collection<T> = Arc<Vec<Arc<T>>>;

pub use comparison::{
    ComparisonListEntry, ComparisonMatrix, ComparisonMatrixRow, ComparisonRequest, ComparisonRun,
    ComparisonStarted, ComparisonStatus, ComparisonSummary, Environment, EnvironmentResult,
    EnvironmentResults,
};
pub use config::{
    ApiConfig, ComparisonConfig, Config, DatabaseConfig, ExecutionConfig, LoggingConfig,
    WorkflowConfig,
};
pub use execution::{
    ActiveExecution, ExecutionProgress, ExecutionRequest, ExecutionStarted, ExecutionStatus,
    RunningTestInfo,
};
pub use fix::{
    BatchApplyReport, DeployReport, DiagnosisReport, Fix, FixApplyOutcome, FixStatus, FixType,
    FixVerification, VerificationReport,
};
pub use test_run::{ResultStatus, RunStatus, TestResult, TestRun};
pub use transcript::{ApiCall, ConversationTurn, TurnRole};
pub use workflow::{
    PhaseCompletion, PhaseMetrics, PhaseState, PhaseStatus, WorkflowPhase, WorkflowRun,
};
