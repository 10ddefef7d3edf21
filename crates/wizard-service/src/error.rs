//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use wizard_core::{LedgerError, ProfileError};
use wizard_store::StoreError;

use crate::generator::GeneratorError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - the value belongs to another resource.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Insufficient credits.
    #[error("insufficient credits: current={current}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        current: i32,
        /// Required amount.
        required: i32,
    },

    /// The datastore is unreachable or slow; the request may be retried.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientCredits { current, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                format!(
                    "You have {current} credit(s) left and this needs {required}. \
                     Upgrade your plan or wait for the next reset."
                ),
                Some(serde_json::json!({
                    "current": current,
                    "required": required
                })),
            ),
            Self::ServiceUnavailable(msg) => {
                tracing::warn!(error = %msg, "Datastore unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    "The credit service is temporarily unavailable. Please try again.".to_string(),
                    Some(serde_json::json!({ "retryable": true })),
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAccount(msg) => Self::BadRequest(format!("invalid account: {msg}")),
            LedgerError::InvalidAmount(amount) => {
                Self::BadRequest(format!("amount must be a positive integer, got {amount}"))
            }
            LedgerError::InsufficientCredit { current, required } => {
                Self::InsufficientCredits { current, required }
            }
            LedgerError::DatastoreUnavailable(msg) => Self::ServiceUnavailable(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        if err.is_email_conflict() {
            return Self::Conflict("email is already in use by another account".into());
        }
        match err {
            StoreError::Unavailable(msg) => Self::ServiceUnavailable(msg),
            StoreError::NotFound | StoreError::UnknownAccount => {
                Self::NotFound("account not found".into())
            }
            StoreError::Conflict { constraint } => {
                Self::Conflict(format!("conflicting value ({constraint})"))
            }
            StoreError::Database(msg) => Self::Internal(msg),
        }
    }
}

impl From<ProfileError> for ApiError {
    fn from(err: ProfileError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<GeneratorError> for ApiError {
    fn from(err: GeneratorError) -> Self {
        match err {
            GeneratorError::NotConfigured => Self::ExternalService(err.to_string()),
            GeneratorError::Timeout(_) => {
                Self::ExternalService("code generation timed out, please try again".into())
            }
            other => {
                tracing::error!(error = %other, "Code generation failed");
                Self::ExternalService("code generation failed".into())
            }
        }
    }
}
