pub mod comparison_orchestrator;
pub mod event_router;
pub mod execution_coordinator;
pub mod fix_tracker;
pub mod live_session;
pub mod reconciler;
pub mod scheduled_task;
pub mod workflow_machine;
pub mod workflow_runner;

pub use comparison_orchestrator::{
    ComparisonOrchestrator, ComparisonView, InFlightComparison, PollPolicy, ResumeOutcome,
    IN_FLIGHT_KEY,
};
pub use event_router::{EventRouter, ExecutionEvent};
pub use execution_coordinator::{ExecutionCoordinator, ExecutionSnapshot};
pub use fix_tracker::FixTracker;
pub use live_session::{LiveConversationState, LiveSessionTracker};
pub use scheduled_task::ScheduledTask;
pub use workflow_machine::WorkflowStateMachine;
pub use workflow_runner::{WorkflowOptions, WorkflowOutcome, WorkflowRunner};
