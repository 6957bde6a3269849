//! Single entry point for pushed execution events.
//!
//! The runner streams worker and transcript events while a batch executes.
//! Each event is applied in arrival order to the execution coordinator and
//! the live session tracker.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::domain::models::{
    ApiCall, ConversationTurn, ExecutionProgress, RunningTestInfo, TestResult,
};
use crate::services::execution_coordinator::ExecutionCoordinator;
use crate::services::live_session::LiveSessionTracker;

/// Event pushed by the batch runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ExecutionEvent {
    WorkerClaimed(RunningTestInfo),
    Turn {
        #[serde(rename = "testId")]
        test_id: String,
        turn: ConversationTurn,
    },
    ApiCall {
        #[serde(rename = "testId")]
        test_id: String,
        call: ApiCall,
    },
    TestCompleted(TestResult),
    Progress(ExecutionProgress),
    BatchCompleted {
        #[serde(rename = "runId")]
        run_id: String,
    },
}

impl ExecutionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorkerClaimed(_) => "worker_claimed",
            Self::Turn { .. } => "turn",
            Self::ApiCall { .. } => "api_call",
            Self::TestCompleted(_) => "test_completed",
            Self::Progress(_) => "progress",
            Self::BatchCompleted { .. } => "batch_completed",
        }
    }
}

/// Routes pushed events to the components that own the affected state.
#[derive(Clone)]
pub struct EventRouter {
    coordinator: ExecutionCoordinator,
    live: LiveSessionTracker,
}

impl EventRouter {
    pub fn new(coordinator: ExecutionCoordinator, live: LiveSessionTracker) -> Self {
        Self { coordinator, live }
    }

    pub async fn apply(&self, event: ExecutionEvent) {
        trace!(kind = event.kind(), "applying execution event");
        match event {
            ExecutionEvent::WorkerClaimed(info) => {
                self.coordinator.worker_claimed(info).await;
            }
            ExecutionEvent::Turn { test_id, turn } => {
                self.live.add_turn(&test_id, turn).await;
            }
            ExecutionEvent::ApiCall { test_id, call } => {
                self.live.add_api_call(&test_id, call).await;
            }
            ExecutionEvent::TestCompleted(result) => {
                self.live.mark_complete(&result.test_id).await;
                self.coordinator.worker_finished(result).await;
            }
            ExecutionEvent::Progress(progress) => {
                self.coordinator.update_progress(progress).await;
            }
            ExecutionEvent::BatchCompleted { run_id } => {
                debug!(run_id = %run_id, "batch completed event");
                self.live.mark_all_complete().await;
                self.coordinator.batch_completed().await;
            }
        }
    }

    /// Apply events until the stream ends. Returns the number applied.
    pub async fn consume<S>(&self, events: S) -> usize
    where
        S: Stream<Item = ExecutionEvent>,
    {
        let mut events = std::pin::pin!(events);
        let mut applied = 0;
        while let Some(event) = events.next().await {
            self.apply(event).await;
            applied += 1;
        }
        debug!(applied, "execution event stream closed");
        applied
    }
}
