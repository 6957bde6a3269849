use reqwest::StatusCode;
use thiserror::Error;

use crate::domain::errors::DomainError;

/// Failures talking to the testing service.
#[derive(Error, Debug)]
pub enum ApiClientError {
    /// HTTP 400 / 422
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// HTTP 404
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP 409, e.g. an execution is already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// HTTP 429
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// HTTP 5xx
    #[error("Server error ({0}): {1}")]
    ServerError(StatusCode, String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid base url: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid response body: {0}")]
    InvalidResponse(String),

    #[error("Unexpected status ({0}): {1}")]
    UnknownError(StatusCode, String),
}

impl ApiClientError {
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 | 422 => Self::InvalidRequest(body),
            404 => Self::NotFound(body),
            409 => Self::Conflict(body),
            429 => Self::RateLimitExceeded,
            500..=599 => Self::ServerError(status, body),
            _ => Self::UnknownError(status, body),
        }
    }

    /// True when the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimitExceeded | Self::ServerError(_, _) => true,
            Self::NetworkError(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

impl From<ApiClientError> for DomainError {
    fn from(err: ApiClientError) -> Self {
        match err {
            ApiClientError::InvalidRequest(msg) => DomainError::ValidationFailed(msg),
            ApiClientError::InvalidResponse(msg) => DomainError::SerializationError(msg),
            other => DomainError::Remote(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ApiClientError::from_status(StatusCode::NOT_FOUND, "no run".into()),
            ApiClientError::NotFound(_)
        ));
        assert!(matches!(
            ApiClientError::from_status(StatusCode::CONFLICT, "busy".into()),
            ApiClientError::Conflict(_)
        ));
        assert!(ApiClientError::from_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(ApiClientError::RateLimitExceeded.is_transient());
        assert!(!ApiClientError::from_status(StatusCode::BAD_REQUEST, String::new()).is_transient());
    }

    #[test]
    fn test_domain_mapping() {
        let err: DomainError = ApiClientError::InvalidRequest("concurrency".into()).into();
        assert!(matches!(err, DomainError::ValidationFailed(_)));

        let err: DomainError = ApiClientError::from_status(StatusCode::SERVICE_UNAVAILABLE, "down".into()).into();
        assert!(matches!(err, DomainError::Remote(msg) if msg.contains("down")));
    }
}
