//! Request and response types for the ledger client.

use serde::{Deserialize, Serialize};

use atelier_ledger_core::Operation;

/// Advisory credit check request.
#[derive(Debug, Clone, Serialize)]
pub struct CheckRequest {
    /// User to check.
    pub user_id: String,
    /// Operation identifier.
    pub operation: Operation,
}

/// Advisory credit check response.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckResponse {
    /// Whether the balance covered the cost at check time.
    pub has_credits: bool,
    /// Balance observed at check time.
    pub current_balance: i64,
    /// Credits the operation costs.
    pub required: i64,
    /// Missing credits (zero when funded).
    pub deficit: i64,
    /// Whether the operation is free.
    pub is_free: bool,
}

/// Deduction request, sent after the paid work succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct DeductRequest {
    /// User to charge.
    pub user_id: String,
    /// Operation identifier.
    pub operation: Operation,
    /// Idempotency key for this billing attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
    /// Operation-specific context for the audit log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Deduction response.
#[derive(Debug, Clone, Deserialize)]
pub struct DeductResponse {
    /// Whether the charge applied.
    pub success: bool,
    /// Whether the operation was free.
    pub free: bool,
    /// Credits charged.
    pub cost: i64,
    /// Balance after the charge, absent for free operations.
    pub new_balance: Option<i64>,
    /// The debit transaction, absent for free operations.
    pub transaction_id: Option<String>,
}

/// Refund request, sent when the paid work failed after a charge.
#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    /// User to compensate.
    pub user_id: String,
    /// Operation that failed.
    pub operation: Operation,
    /// Why the operation failed.
    pub reason: String,
    /// Attempt id of the original debit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
}

/// Refund response.
#[derive(Debug, Clone, Deserialize)]
pub struct RefundResponse {
    /// Whether the refund applied.
    pub success: bool,
    /// Whether the operation was free.
    pub free: bool,
    /// Balance after the refund, absent for free operations.
    pub new_balance: Option<i64>,
    /// The refund transaction, absent for free operations.
    pub transaction_id: Option<String>,
}

/// Grant request: top-up or promotional credit.
#[derive(Debug, Clone, Serialize)]
pub struct GrantRequest {
    /// User to credit.
    pub user_id: String,
    /// Credits to add.
    pub amount: i64,
    /// Where the credits come from.
    pub source: String,
    /// Operator issuing the grant, when manual.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<String>,
}

/// Grant response.
#[derive(Debug, Clone, Deserialize)]
pub struct GrantResponse {
    /// Balance after the grant.
    pub new_balance: i64,
    /// The credit transaction.
    pub transaction_id: String,
}

/// Error response body from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// The error payload.
    pub error: ApiErrorBody,
}

/// Error payload from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured details, when present.
    pub details: Option<serde_json::Value>,
}
