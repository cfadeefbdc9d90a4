//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

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

    /// Insufficient credits for the requested operation.
    #[error("insufficient credits: balance={current}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        current: i64,
        /// Credits the operation requires.
        required: i64,
        /// Missing credits.
        deficit: i64,
        /// Where the user can top up.
        top_up_url: String,
    },

    /// An attempt id was submitted twice.
    #[error("duplicate attempt: {0}")]
    DuplicateAttempt(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
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
            Self::InsufficientCredits {
                current,
                required,
                deficit,
                top_up_url,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                format!(
                    "You need {required} credits but have {current} ({deficit} short). \
                     Top up to continue."
                ),
                Some(serde_json::json!({
                    "current": current,
                    "required": required,
                    "deficit": deficit,
                    "top_up_url": top_up_url,
                })),
            ),
            Self::DuplicateAttempt(id) => (
                StatusCode::CONFLICT,
                "duplicate_attempt",
                format!("Attempt {id} was already settled"),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
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

impl From<crate::ledger::LedgerError> for ApiError {
    fn from(err: crate::ledger::LedgerError) -> Self {
        use crate::ledger::LedgerError;
        match err {
            LedgerError::DuplicateAttempt(attempt_id) => Self::DuplicateAttempt(attempt_id),
            LedgerError::Storage(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<atelier_ledger_store::StoreError> for ApiError {
    fn from(err: atelier_ledger_store::StoreError) -> Self {
        use atelier_ledger_store::StoreError;
        match err {
            StoreError::NotFound => Self::NotFound("record not found".into()),
            StoreError::DuplicateAttempt { attempt_id } => Self::DuplicateAttempt(attempt_id),
            // InsufficientCredits is mapped at the call site, where the
            // top-up URL is known; a stray one is an internal inconsistency.
            StoreError::InsufficientCredits { balance, required } => Self::Internal(format!(
                "unhandled insufficient credits: balance={balance}, required={required}"
            )),
            StoreError::Unavailable(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}
