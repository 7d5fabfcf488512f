//! API error envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// JSON error body: `{"error": {"message", "kind", "retryable"}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    pub kind: String,
    pub retryable: bool,
}

/// API error with status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ApiErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            response: ApiErrorResponse {
                error: ApiErrorDetail {
                    message: message.into(),
                    kind: kind.into(),
                    retryable: false,
                },
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let status = match &err {
            DomainError::BadRequest { .. }
            | DomainError::Parse { .. }
            | DomainError::Chunk { .. } => StatusCode::BAD_REQUEST,
            DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
            DomainError::Conflict { .. } => StatusCode::CONFLICT,
            DomainError::ProviderTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            DomainError::Embedding { .. }
            | DomainError::Rerank { .. }
            | DomainError::Llm { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DomainError::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            response: ApiErrorResponse {
                error: ApiErrorDetail {
                    message: err.to_string(),
                    kind: err.kind().to_string(),
                    retryable: err.retryable(),
                },
            },
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.response.error.kind, self.response.error.message
        )
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_mapping() {
        let err: ApiError = DomainError::not_found("document x not found").into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.response.error.kind, "not_found");

        let err: ApiError = DomainError::chunk("no chunks").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = DomainError::provider_timeout("slow").into();
        assert_eq!(err.status, StatusCode::GATEWAY_TIMEOUT);
        assert!(err.response.error.retryable);
    }

    #[test]
    fn test_error_serialization() {
        let err = ApiError::bad_request("missing query");
        let json = serde_json::to_string(&err.response).unwrap();
        assert!(json.contains("\"kind\":\"bad_request\""));
        assert!(json.contains("missing query"));
    }
}
