//! Domain errors for the testflow engine.

use thiserror::Error;

/// Domain-level errors that can occur in the testflow engine.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Fix not found: {0}")]
    FixNotFound(String),

    #[error("Comparison not found: {0}")]
    ComparisonNotFound(String),

    #[error("No active execution")]
    NoActiveExecution,

    #[error("Execution {0} is already running")]
    ExecutionAlreadyRunning(String),

    #[error("Comparison {0} is already being tracked")]
    ComparisonAlreadyRunning(String),

    #[error("Comparison {comparison_id} did not finish after {attempts} polls")]
    PollTimeout { comparison_id: String, attempts: u32 },

    #[error("Comparison {comparison_id} failed: {reason}")]
    ComparisonFailed { comparison_id: String, reason: String },

    #[error("Remote call failed: {0}")]
    Remote(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// What a call site does with a collaborator error.
///
/// Background refreshes usually suppress; operator-triggered calls surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnError {
    /// Record the message on the component and return the error.
    #[default]
    Surface,
    /// Log at debug level and keep the previous state.
    Suppress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_timeout_message() {
        let err = DomainError::PollTimeout {
            comparison_id: "cmp-1".to_string(),
            attempts: 200,
        };
        assert_eq!(err.to_string(), "Comparison cmp-1 did not finish after 200 polls");
    }

    #[test]
    fn test_serde_error_converts() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: DomainError = parse.unwrap_err().into();
        assert!(matches!(err, DomainError::SerializationError(_)));
    }

    #[test]
    fn test_on_error_defaults_to_surface() {
        assert_eq!(OnError::default(), OnError::Surface);
    }
}
