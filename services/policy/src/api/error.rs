//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes HTTP error response construction so every endpoint returns
//! the same `{code, message, request_id}` shape.
//!
//! # Key invariants and assumptions
//! - Each [`PolicyError`] variant maps to exactly one status and code.
//! - Internal errors log details server-side and return a generic message.
use crate::api::types::ErrorResponse;
use crate::error::PolicyError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers.
///
/// # Invariants
/// - `status` must match the semantics of `body.code`.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use warden_policy::api::error::ApiError;
/// use warden_policy::api::types::ErrorResponse;
///
/// let err = ApiError {
///     status: StatusCode::NOT_FOUND,
///     body: ErrorResponse {
///         code: "not_found".to_string(),
///         message: "missing".to_string(),
///         request_id: None,
///     },
/// };
/// assert_eq!(err.status.as_u16(), 404);
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        },
    }
}

/// Build a 404 Not Found error.
pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message)
}

/// Build a 409 Conflict error with a caller-provided code
/// (`already_exists` or `conflict`).
pub fn api_conflict(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::CONFLICT, code, message)
}

/// Build a 400 Bad Request validation error.
pub fn api_validation_error(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

/// Build a 422 error for a binding whose role cannot be referenced.
pub fn api_invalid_reference(message: &str) -> ApiError {
    api_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_reference", message)
}

/// Build a 503 error for a retryable dependency failure.
pub fn api_unavailable(message: &str) -> ApiError {
    api_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
}

/// Build a 500 Internal Server Error.
///
/// # What it does
/// Logs the underlying error and returns a generic message.
pub fn api_internal(message: &str, err: &PolicyError) -> ApiError {
    tracing::error!(error = ?err, "policy service internal error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        let message = err.to_string();
        match &err {
            PolicyError::NotFound(_) => api_not_found(&message),
            PolicyError::AlreadyExists(_) => api_conflict("already_exists", &message),
            PolicyError::Conflict(_) => api_conflict("conflict", &message),
            PolicyError::InvalidReference(_) => api_invalid_reference(&message),
            PolicyError::ValidationFailed(_) => api_validation_error(&message),
            PolicyError::Unavailable(_) => api_unavailable(&message),
            PolicyError::Unexpected(_) => api_internal("internal error", &err),
        }
    }
}
