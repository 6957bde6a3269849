//! Drives the workflow state machine against the remote collaborators.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult, OnError};
use crate::domain::models::{
    Config, ExecutionRequest, PhaseCompletion, RunStatus, WorkflowPhase, WorkflowRun,
};
use crate::domain::ports::FixApi;
use crate::services::execution_coordinator::ExecutionCoordinator;
use crate::services::fix_tracker::FixTracker;
use crate::services::workflow_machine::WorkflowStateMachine;

/// Knobs for one workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub execution: ExecutionRequest,
    /// Test run to analyze when the workflow starts past `testing`.
    pub run_id: Option<String>,
    pub use_llm_diagnosis: bool,
    /// Verifying → fixing rollbacks allowed before the loop is abandoned.
    pub max_fix_iterations: u32,
    pub poll_interval: Duration,
}

impl WorkflowOptions {
    pub fn from_config(config: &Config, execution: ExecutionRequest) -> Self {
        Self {
            execution,
            run_id: None,
            use_llm_diagnosis: config.workflow.use_llm_diagnosis,
            max_fix_iterations: config.workflow.max_fix_iterations,
            poll_interval: Duration::from_millis(config.execution.poll_interval_ms),
        }
    }
}

/// Final state of a workflow run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutcome {
    pub run: WorkflowRun,
    /// Phase that ended the workflow with an error, if any.
    pub failed_phase: Option<WorkflowPhase>,
}

impl WorkflowOutcome {
    pub fn succeeded(&self) -> bool {
        self.failed_phase.is_none()
    }
}

pub struct WorkflowRunner {
    coordinator: ExecutionCoordinator,
    fixes: FixTracker,
    fix_api: Arc<dyn FixApi>,
    options: WorkflowOptions,
    machine: WorkflowStateMachine,
}

impl WorkflowRunner {
    pub fn new(
        coordinator: ExecutionCoordinator,
        fixes: FixTracker,
        fix_api: Arc<dyn FixApi>,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            coordinator,
            fixes,
            fix_api,
            options,
            machine: WorkflowStateMachine::new(),
        }
    }

    pub fn machine(&self) -> &WorkflowStateMachine {
        &self.machine
    }

    /// Run phases until the workflow returns to idle.
    ///
    /// A phase error is recorded on that phase and abandons the workflow.
    pub async fn run(&mut self, skip_to: Option<WorkflowPhase>) -> DomainResult<WorkflowOutcome> {
        self.machine.reset();
        match skip_to {
            None | Some(WorkflowPhase::Testing) => {
                self.machine.start()?;
            }
            Some(target) => {
                self.machine.skip_to_phase(target)?;
                self.machine.begin_phase(target, None);
            }
        }

        let mut run_id = self.options.run_id.clone();
        let mut failed_phase = None;

        loop {
            let phase = self.machine.current_phase();
            let step = match phase {
                WorkflowPhase::Idle => break,
                WorkflowPhase::Testing => self.run_testing().await,
                WorkflowPhase::Analyzing => self.run_analyzing(run_id.as_deref()).await,
                WorkflowPhase::Fixing => self.run_fixing(run_id.as_deref()).await,
                WorkflowPhase::Verifying => self.run_verifying().await,
                WorkflowPhase::Deploying => self.run_deploying().await,
            };

            let completion = match step {
                Ok(completion) => completion,
                Err(err) => {
                    self.machine.mark_error(phase, err.to_string())?;
                    self.machine.abandon();
                    failed_phase = Some(phase);
                    break;
                }
            };

            if let PhaseCompletion::Testing { run_id: id, .. } = &completion {
                run_id = Some(id.clone());
            }

            let next = self.machine.complete_phase(completion)?;
            if phase == WorkflowPhase::Verifying
                && next == WorkflowPhase::Fixing
                && self.machine.run().fix_iterations > self.options.max_fix_iterations
            {
                let message = format!(
                    "fixes did not improve results after {} iterations",
                    self.options.max_fix_iterations
                );
                warn!(fix_iterations = self.machine.run().fix_iterations, "fix loop exhausted");
                self.machine.mark_error(WorkflowPhase::Fixing, message)?;
                self.machine.abandon();
                failed_phase = Some(WorkflowPhase::Fixing);
                break;
            }
        }

        info!(
            workflow_id = %self.machine.run().id,
            failed_phase = ?failed_phase,
            fix_iterations = self.machine.run().fix_iterations,
            "workflow finished"
        );
        Ok(WorkflowOutcome {
            run: self.machine.run().clone(),
            failed_phase,
        })
    }

    async fn run_testing(&self) -> DomainResult<PhaseCompletion> {
        let run_id = self.coordinator.start(&self.options.execution).await?;
        loop {
            tokio::time::sleep(self.options.poll_interval).await;
            let Some(run) = self.coordinator.refresh_run(&run_id, OnError::Surface).await? else {
                continue;
            };
            match run.status {
                RunStatus::Queued | RunStatus::Running => continue,
                RunStatus::Failed => {
                    return Err(DomainError::Remote(format!("test run {run_id} failed")));
                }
                RunStatus::Completed => {
                    return Ok(PhaseCompletion::Testing {
                        run_id,
                        total: run.total,
                        passed: run.passed,
                        failed: run.failed,
                    });
                }
            }
        }
    }

    async fn run_analyzing(&self, run_id: Option<&str>) -> DomainResult<PhaseCompletion> {
        let run_id = run_id.ok_or_else(|| {
            DomainError::ValidationFailed("analysis needs a test run id".to_string())
        })?;
        let report = self
            .fix_api
            .run_diagnosis(run_id, self.options.use_llm_diagnosis)
            .await?;
        if !report.success {
            return Err(DomainError::Remote(format!("diagnosis of run {run_id} failed")));
        }
        self.fixes.refresh(Some(run_id)).await?;
        Ok(PhaseCompletion::Analyzing {
            fixes_generated: report.fixes_generated,
            analyzed_count: report.analyzed_count,
        })
    }

    async fn run_fixing(&self, run_id: Option<&str>) -> DomainResult<PhaseCompletion> {
        self.fixes.refresh(run_id).await?;
        let pending = self.fixes.pending_ids().await;
        let report = self.fixes.apply_batch(&pending).await?;
        let applied = report.results.iter().filter(|r| r.success).count();
        let applied_fixes = u32::try_from(applied).unwrap_or(u32::MAX);
        Ok(PhaseCompletion::Fixing { applied_fixes })
    }

    async fn run_verifying(&self) -> DomainResult<PhaseCompletion> {
        let applied = self.fixes.applied_ids().await;
        if applied.is_empty() {
            return Ok(PhaseCompletion::Verifying { improved: false });
        }
        let report = self.fixes.verify(&applied).await?;
        Ok(PhaseCompletion::Verifying {
            improved: report.overall_effective,
        })
    }

    async fn run_deploying(&self) -> DomainResult<PhaseCompletion> {
        let verified = self.fixes.verified_ids().await;
        let report = self.fix_api.deploy_fixes(&verified).await?;
        Ok(PhaseCompletion::Deploying {
            deployed: report.deployed,
        })
    }
}
