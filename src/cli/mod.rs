pub mod commands;
pub mod context;
pub mod output;
pub mod types;

pub use context::AppContext;
pub use output::progress::{create_progress_bar, create_spinner};
pub use types::{Cli, Commands};

use crate::domain::errors::DomainError;

/// Print a command failure and exit non-zero.
///
/// In JSON mode the error goes to stdout as `{"error": ..., "kind": ...}` so
/// scripted callers see one JSON document per invocation.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    let kind = err
        .downcast_ref::<DomainError>()
        .map_or("error", error_kind);

    if json_mode {
        let body = serde_json::json!({
            "error": format!("{err:#}"),
            "kind": kind,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}

fn error_kind(err: &DomainError) -> &'static str {
    match err {
        DomainError::InvalidStateTransition { .. } => "invalid_state_transition",
        DomainError::FixNotFound(_) | DomainError::ComparisonNotFound(_) => "not_found",
        DomainError::NoActiveExecution => "no_active_execution",
        DomainError::ExecutionAlreadyRunning(_) | DomainError::ComparisonAlreadyRunning(_) => {
            "already_running"
        }
        DomainError::PollTimeout { .. } => "poll_timeout",
        DomainError::ComparisonFailed { .. } => "comparison_failed",
        DomainError::Remote(_) => "remote",
        DomainError::StorageError(_) => "storage",
        DomainError::SerializationError(_) => "serialization",
        DomainError::ValidationFailed(_) => "validation",
    }
}
