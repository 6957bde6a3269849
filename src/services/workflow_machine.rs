//! Test → deploy workflow state machine.
//!
//! Transitions are decided only by the completing phase's payload:
//!
//! | from      | condition            | to                      |
//! |-----------|----------------------|-------------------------|
//! | testing   | failed == 0          | idle                    |
//! | testing   | failed > 0           | analyzing               |
//! | analyzing | fixes_generated == 0 | idle                    |
//! | analyzing | fixes_generated > 0  | fixing                  |
//! | fixing    | applied_fixes == 0   | idle                    |
//! | fixing    | applied_fixes > 0    | verifying               |
//! | verifying | improved             | deploying               |
//! | verifying | !improved            | fixing (rollback)       |
//! | deploying | always               | idle                    |

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    PhaseCompletion, PhaseMetrics, PhaseState, PhaseStatus, WorkflowPhase, WorkflowRun,
};

/// Owns one [`WorkflowRun`] and applies transitions to it.
#[derive(Debug, Clone, Default)]
pub struct WorkflowStateMachine {
    run: WorkflowRun,
}

impl WorkflowStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self) -> &WorkflowRun {
        &self.run
    }

    pub fn current_phase(&self) -> WorkflowPhase {
        self.run.current_phase
    }

    /// Begin a fresh workflow at `testing`.
    pub fn start(&mut self) -> DomainResult<&WorkflowRun> {
        if self.run.current_phase != WorkflowPhase::Idle {
            return Err(DomainError::InvalidStateTransition {
                from: self.run.current_phase.to_string(),
                to: WorkflowPhase::Testing.to_string(),
                reason: "a workflow is already in progress".to_string(),
            });
        }
        self.run = WorkflowRun::new();
        self.begin_phase(WorkflowPhase::Testing, None);
        info!(workflow_id = %self.run.id, "workflow started");
        Ok(&self.run)
    }

    /// Record the current phase's completion and move to the next phase.
    pub fn complete_phase(&mut self, completion: PhaseCompletion) -> DomainResult<WorkflowPhase> {
        let from = completion.phase();
        if from != self.run.current_phase {
            return Err(DomainError::InvalidStateTransition {
                from: self.run.current_phase.to_string(),
                to: from.to_string(),
                reason: format!("cannot complete {from} while in {}", self.run.current_phase),
            });
        }

        let (metrics, next) = match completion {
            PhaseCompletion::Testing {
                run_id,
                total,
                passed,
                failed,
            } => {
                let next = if failed == 0 {
                    (WorkflowPhase::Idle, None)
                } else {
                    (
                        WorkflowPhase::Analyzing,
                        Some(PhaseMetrics::Analyzing {
                            failure_count: failed,
                            fixes_generated: 0,
                            analyzed_count: 0,
                        }),
                    )
                };
                (
                    PhaseMetrics::Testing {
                        run_id: Some(run_id),
                        total,
                        passed,
                        failed,
                    },
                    next,
                )
            }
            PhaseCompletion::Analyzing {
                fixes_generated,
                analyzed_count,
            } => {
                let failure_count = match self.run.analyzing.metrics {
                    PhaseMetrics::Analyzing { failure_count, .. } => failure_count,
                    _ => 0,
                };
                let next = if fixes_generated == 0 {
                    (WorkflowPhase::Idle, None)
                } else {
                    (
                        WorkflowPhase::Fixing,
                        Some(PhaseMetrics::Fixing {
                            pending_fixes: fixes_generated,
                            applied_fixes: 0,
                        }),
                    )
                };
                (
                    PhaseMetrics::Analyzing {
                        failure_count,
                        fixes_generated,
                        analyzed_count,
                    },
                    next,
                )
            }
            PhaseCompletion::Fixing { applied_fixes } => {
                let pending_fixes = match self.run.fixing.metrics {
                    PhaseMetrics::Fixing { pending_fixes, .. } => pending_fixes,
                    _ => 0,
                };
                let next = if applied_fixes == 0 {
                    (WorkflowPhase::Idle, None)
                } else {
                    (
                        WorkflowPhase::Verifying,
                        Some(PhaseMetrics::Verifying { improved: None }),
                    )
                };
                (
                    PhaseMetrics::Fixing {
                        pending_fixes,
                        applied_fixes,
                    },
                    next,
                )
            }
            PhaseCompletion::Verifying { improved } => {
                let next = if improved {
                    (
                        WorkflowPhase::Deploying,
                        Some(PhaseMetrics::Deploying { deployed: 0 }),
                    )
                } else {
                    let pending_fixes = match self.run.fixing.metrics {
                        PhaseMetrics::Fixing { pending_fixes, .. } => pending_fixes,
                        _ => 0,
                    };
                    (
                        WorkflowPhase::Fixing,
                        Some(PhaseMetrics::Fixing {
                            pending_fixes,
                            applied_fixes: 0,
                        }),
                    )
                };
                (
                    PhaseMetrics::Verifying {
                        improved: Some(improved),
                    },
                    next,
                )
            }
            PhaseCompletion::Deploying { deployed } => {
                (PhaseMetrics::Deploying { deployed }, (WorkflowPhase::Idle, None))
            }
        };

        if let Some(state) = self.run.phase_mut(from) {
            state.status = PhaseStatus::Completed;
            state.completed_at = Some(Utc::now());
            state.error = None;
            state.metrics = metrics;
        }

        let (to, seed) = next;
        if from == WorkflowPhase::Verifying && to == WorkflowPhase::Fixing {
            self.run.fix_iterations += 1;
            info!(
                workflow_id = %self.run.id,
                fix_iterations = self.run.fix_iterations,
                "verification did not improve results, returning to fixing"
            );
        }

        if to == WorkflowPhase::Idle {
            self.run.current_phase = WorkflowPhase::Idle;
        } else {
            self.begin_phase(to, seed);
        }
        info!(workflow_id = %self.run.id, from = %from, to = %to, "workflow transition");
        Ok(to)
    }

    /// Enter `phase`, marking it in progress. `seed` replaces its counters.
    pub fn begin_phase(&mut self, phase: WorkflowPhase, seed: Option<PhaseMetrics>) {
        self.run.current_phase = phase;
        if let Some(state) = self.run.phase_mut(phase) {
            state.status = PhaseStatus::InProgress;
            state.started_at = Some(Utc::now());
            state.completed_at = None;
            state.error = None;
            if let Some(metrics) = seed {
                state.metrics = metrics;
            }
        }
    }

    /// Record an error on a phase. No transition is taken.
    pub fn mark_error(&mut self, phase: WorkflowPhase, message: impl Into<String>) -> DomainResult<()> {
        let message = message.into();
        let state = self.run.phase_mut(phase).ok_or_else(|| {
            DomainError::ValidationFailed("idle has no phase state".to_string())
        })?;
        warn!(phase = %phase, error = %message, "workflow phase failed");
        state.status = PhaseStatus::Error;
        state.completed_at = Some(Utc::now());
        state.error = Some(message);
        Ok(())
    }

    /// Jump to `target`. Earlier phases still `pending` become `skipped`;
    /// completed or in-progress phases are left alone.
    pub fn skip_to_phase(&mut self, target: WorkflowPhase) -> DomainResult<()> {
        if target == WorkflowPhase::Idle {
            return Err(DomainError::ValidationFailed(
                "cannot skip to idle".to_string(),
            ));
        }

        for phase in WorkflowPhase::SEQUENCE.into_iter().filter(|p| *p < target) {
            if let Some(state) = self.run.phase_mut(phase) {
                if state.status == PhaseStatus::Pending {
                    state.status = PhaseStatus::Skipped;
                }
            }
        }
        if let Some(state) = self.run.phase_mut(target) {
            if !matches!(state.status, PhaseStatus::Completed | PhaseStatus::InProgress) {
                *state = PhaseState::pending(state.metrics.clone());
            }
        }
        self.run.current_phase = target;
        info!(workflow_id = %self.run.id, target = %target, "skipped to phase");
        Ok(())
    }

    /// Give up on the current phase and return to idle, keeping phase history.
    pub fn abandon(&mut self) {
        info!(workflow_id = %self.run.id, phase = %self.run.current_phase, "workflow abandoned");
        self.run.current_phase = WorkflowPhase::Idle;
    }

    /// Drop everything and return to a fresh idle run.
    pub fn reset(&mut self) {
        self.run = WorkflowRun::new();
    }
}
