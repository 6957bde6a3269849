//! Workflow phase types.
//!
//! The workflow walks `testing → analyzing → fixing → verifying → deploying`
//! and returns to `idle`. Transition decisions live in
//! `services::workflow_machine`; this module only holds the state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase the workflow is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    #[default]
    Idle,
    Testing,
    Analyzing,
    Fixing,
    Verifying,
    Deploying,
}

impl WorkflowPhase {
    /// Working phases in execution order (excludes `Idle`).
    pub const SEQUENCE: [WorkflowPhase; 5] = [
        Self::Testing,
        Self::Analyzing,
        Self::Fixing,
        Self::Verifying,
        Self::Deploying,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Testing => "testing",
            Self::Analyzing => "analyzing",
            Self::Fixing => "fixing",
            Self::Verifying => "verifying",
            Self::Deploying => "deploying",
        }
    }
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "testing" => Ok(Self::Testing),
            "analyzing" => Ok(Self::Analyzing),
            "fixing" => Ok(Self::Fixing),
            "verifying" => Ok(Self::Verifying),
            "deploying" => Ok(Self::Deploying),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

/// Status of a single phase, independent of the other phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Error,
    Skipped,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase-specific counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PhaseMetrics {
    Testing {
        run_id: Option<String>,
        total: u32,
        passed: u32,
        failed: u32,
    },
    Analyzing {
        failure_count: u32,
        fixes_generated: u32,
        analyzed_count: u32,
    },
    Fixing {
        pending_fixes: u32,
        applied_fixes: u32,
    },
    Verifying {
        improved: Option<bool>,
    },
    Deploying {
        deployed: u32,
    },
}

/// Recorded state of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    pub status: PhaseStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub metrics: PhaseMetrics,
}

impl PhaseState {
    pub fn pending(metrics: PhaseMetrics) -> Self {
        Self {
            status: PhaseStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
            metrics,
        }
    }
}

/// Completion payload reported by a phase when its work finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PhaseCompletion {
    Testing {
        run_id: String,
        total: u32,
        passed: u32,
        failed: u32,
    },
    Analyzing {
        fixes_generated: u32,
        analyzed_count: u32,
    },
    Fixing {
        applied_fixes: u32,
    },
    Verifying {
        improved: bool,
    },
    Deploying {
        deployed: u32,
    },
}

impl PhaseCompletion {
    pub fn phase(&self) -> WorkflowPhase {
        match self {
            Self::Testing { .. } => WorkflowPhase::Testing,
            Self::Analyzing { .. } => WorkflowPhase::Analyzing,
            Self::Fixing { .. } => WorkflowPhase::Fixing,
            Self::Verifying { .. } => WorkflowPhase::Verifying,
            Self::Deploying { .. } => WorkflowPhase::Deploying,
        }
    }
}

/// One pass of the test → deploy workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub current_phase: WorkflowPhase,
    pub testing: PhaseState,
    pub analyzing: PhaseState,
    pub fixing: PhaseState,
    pub verifying: PhaseState,
    pub deploying: PhaseState,
    /// Number of verifying → fixing rollbacks taken so far.
    pub fix_iterations: u32,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            current_phase: WorkflowPhase::Idle,
            testing: PhaseState::pending(PhaseMetrics::Testing {
                run_id: None,
                total: 0,
                passed: 0,
                failed: 0,
            }),
            analyzing: PhaseState::pending(PhaseMetrics::Analyzing {
                failure_count: 0,
                fixes_generated: 0,
                analyzed_count: 0,
            }),
            fixing: PhaseState::pending(PhaseMetrics::Fixing {
                pending_fixes: 0,
                applied_fixes: 0,
            }),
            verifying: PhaseState::pending(PhaseMetrics::Verifying { improved: None }),
            deploying: PhaseState::pending(PhaseMetrics::Deploying { deployed: 0 }),
            fix_iterations: 0,
            created_at: Utc::now(),
        }
    }

    pub fn phase(&self, phase: WorkflowPhase) -> Option<&PhaseState> {
        match phase {
            WorkflowPhase::Idle => None,
            WorkflowPhase::Testing => Some(&self.testing),
            WorkflowPhase::Analyzing => Some(&self.analyzing),
            WorkflowPhase::Fixing => Some(&self.fixing),
            WorkflowPhase::Verifying => Some(&self.verifying),
            WorkflowPhase::Deploying => Some(&self.deploying),
        }
    }

    pub fn phase_mut(&mut self, phase: WorkflowPhase) -> Option<&mut PhaseState> {
        match phase {
            WorkflowPhase::Idle => None,
            WorkflowPhase::Testing => Some(&mut self.testing),
            WorkflowPhase::Analyzing => Some(&mut self.analyzing),
            WorkflowPhase::Fixing => Some(&mut self.fixing),
            WorkflowPhase::Verifying => Some(&mut self.verifying),
            WorkflowPhase::Deploying => Some(&mut self.deploying),
        }
    }
}

impl Default for WorkflowRun {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_workflow_is_idle_with_pending_phases() {
        let run = WorkflowRun::new();
        assert_eq!(run.current_phase, WorkflowPhase::Idle);
        for phase in WorkflowPhase::SEQUENCE {
            let state = run.phase(phase).unwrap();
            assert_eq!(state.status, PhaseStatus::Pending);
            assert!(state.started_at.is_none());
        }
        assert!(run.phase(WorkflowPhase::Idle).is_none());
        assert_eq!(
            run.testing.metrics,
            PhaseMetrics::Testing { run_id: None, total: 0, passed: 0, failed: 0 }
        );
        assert_eq!(run.verifying.metrics, PhaseMetrics::Verifying { improved: None });
    }

    #[test]
    fn test_phase_order() {
        assert!(WorkflowPhase::Testing < WorkflowPhase::Analyzing);
        assert!(WorkflowPhase::Verifying < WorkflowPhase::Deploying);
        assert!(WorkflowPhase::Idle < WorkflowPhase::Testing);
    }

    #[test]
    fn test_completion_serde() {
        let completion = PhaseCompletion::Verifying { improved: true };
        let json = serde_json::to_string(&completion).unwrap();
        assert_eq!(json, r#"{"phase":"verifying","improved":true}"#);
        assert_eq!(completion.phase(), WorkflowPhase::Verifying);
    }
}
