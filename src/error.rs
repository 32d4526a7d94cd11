use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::envelope::ApiResponse;
use crate::ports::RepositoryError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    DuplicateReference(String),

    #[error("Missing provider: the x-provider header is required")]
    MissingProvider,

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider {provider} does not support {capability}")]
    Unsupported {
        provider: String,
        capability: &'static str,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("Token request rejected: {0}")]
    TokenRejected(String),

    #[error("Token request failed: {0}")]
    TokenUnavailable(String),

    #[error("{0}")]
    UpstreamRejected(String),

    #[error("{0}")]
    UpstreamUnreachable(String),

    #[error("{0}")]
    StillPending(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Repository(#[from] RepositoryError),
}

impl GatewayError {
    pub fn duplicate_reference(py_ref: &str) -> Self {
        GatewayError::DuplicateReference(format!(
            "pyRef must be unique: a transaction with reference {} already exists",
            py_ref
        ))
    }

    /// Maps a ledger insert failure, reporting a lost uniqueness race as a duplicate.
    pub fn from_insert(err: RepositoryError, py_ref: &str) -> Self {
        match err {
            RepositoryError::Duplicate(_) => GatewayError::duplicate_reference(py_ref),
            other => GatewayError::Repository(other),
        }
    }

    /// Envelope code. NotFound is 400 rather than 404 by existing convention.
    pub fn code(&self) -> u16 {
        match self {
            GatewayError::Validation(_)
            | GatewayError::DuplicateReference(_)
            | GatewayError::MissingProvider
            | GatewayError::UnknownProvider(_)
            | GatewayError::Unsupported { .. }
            | GatewayError::NotFound(_) => 400,
            GatewayError::Unauthorized(_) => 401,
            GatewayError::Timeout => 408,
            GatewayError::TokenRejected(_) | GatewayError::UpstreamRejected(_) => 422,
            GatewayError::TokenUnavailable(_)
            | GatewayError::UpstreamUnreachable(_)
            | GatewayError::Configuration(_) => 500,
            GatewayError::StillPending(_) => 504,
            GatewayError::Repository(RepositoryError::Duplicate(_)) => 400,
            GatewayError::Repository(_) => 500,
        }
    }
}

impl From<GatewayError> for ApiResponse {
    fn from(error: GatewayError) -> Self {
        ApiResponse::new(error.code(), error.to_string(), None)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        ApiResponse::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_validation_error_code() {
        let error = GatewayError::Validation(ValidationError::new("msisdn", "is required"));
        assert_eq!(error.code(), 400);
    }

    #[test]
    fn test_not_found_is_bad_request() {
        let error = GatewayError::NotFound("no such transaction".to_string());
        assert_eq!(error.code(), 400);
    }

    #[test]
    fn test_token_errors() {
        assert_eq!(GatewayError::TokenRejected("Unauthorized".into()).code(), 422);
        assert_eq!(GatewayError::TokenUnavailable("refused".into()).code(), 500);
    }

    #[test]
    fn test_still_pending_code() {
        assert_eq!(GatewayError::StillPending("in progress".into()).code(), 504);
    }

    #[test]
    fn test_duplicate_storage_key_is_bad_request() {
        let error = GatewayError::Repository(RepositoryError::Duplicate("abc-1".into()));
        assert_eq!(error.code(), 400);
        let error = GatewayError::Repository(RepositoryError::Storage("down".into()));
        assert_eq!(error.code(), 500);
    }

    #[test]
    fn test_duplicate_message_mentions_uniqueness() {
        let error = GatewayError::from_insert(RepositoryError::Duplicate("key".into()), "abc-1");
        assert_eq!(error.code(), 400);
        assert!(error.to_string().contains("unique"));
        assert!(error.to_string().contains("abc-1"));
    }

    #[test]
    fn test_envelope_conversion() {
        let envelope = ApiResponse::from(GatewayError::UnknownProvider("acme".into()));
        assert_eq!(envelope.code, 400);
        assert!(!envelope.success);
        assert_eq!(envelope.message, "Unknown provider: acme");
        assert!(envelope.data.is_none());
    }

    #[tokio::test]
    async fn test_timeout_response() {
        let response = GatewayError::Timeout.into_response();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
