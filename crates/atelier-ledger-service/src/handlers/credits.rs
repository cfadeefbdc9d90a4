//! Credit balance, history, and the check/deduct/refund/grant protocol
//! endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use atelier_ledger_core::{
    AttemptId, CreditCheck, LedgerTransaction, Operation, TransactionMetadata, TransactionType,
    UserId,
};

use crate::auth::{AuthUser, ServiceAuth};
use crate::billing::refund_failed_operation;
use crate::error::ApiError;
use crate::ledger::{Deduction, RefundOutcome};
use crate::state::AppState;

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))
}

fn parse_operation(raw: &str) -> Result<Operation, ApiError> {
    raw.parse()
        .map_err(|e: atelier_ledger_core::UnknownOperation| ApiError::BadRequest(e.to_string()))
}

fn payment_required(state: &AppState, current: i64, required: i64) -> ApiError {
    ApiError::InsufficientCredits {
        current,
        required,
        deficit: required - current,
        top_up_url: state.config.top_up_url(),
    }
}

// ============================================================================
// Balance
// ============================================================================

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Current spendable credits.
    pub credits: i64,
    /// Lifetime credits spent.
    pub lifetime_spent: i64,
    /// Lifetime credits refunded.
    pub lifetime_refunded: i64,
}

/// Get the authenticated user's balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger.get_balance_record(&auth.user_id)?;

    Ok(Json(BalanceResponse {
        credits: balance.credits,
        lifetime_spent: balance.lifetime_spent,
        lifetime_refunded: balance.lifetime_refunded,
    }))
}

// ============================================================================
// Transactions
// ============================================================================

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Direction (debit, credit, refund).
    pub tx_type: TransactionType,
    /// Credits moved (always positive; direction is `tx_type`).
    pub amount: i64,
    /// The billable operation, when tied to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    /// Balance before this transaction.
    pub balance_before: i64,
    /// Balance after this transaction.
    pub balance_after: i64,
    /// Operation-specific context.
    pub metadata: TransactionMetadata,
    /// Timestamp (RFC 3339).
    pub created_at: String,
}

impl From<&LedgerTransaction> for TransactionResponse {
    fn from(tx: &LedgerTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            tx_type: tx.tx_type,
            amount: tx.amount,
            operation: tx.operation,
            balance_before: tx.balance_before,
            balance_after: tx.balance_after,
            metadata: tx.metadata.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List the authenticated user's transaction history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let transactions = state
        .ledger
        .transaction_history(&auth.user_id, limit + 1, query.offset)?;

    let has_more = transactions.len() > limit;
    let transactions: Vec<_> = transactions
        .iter()
        .take(limit)
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

// ============================================================================
// Check
// ============================================================================

/// Credit check request.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// User to check.
    pub user_id: String,
    /// Operation identifier.
    pub operation: String,
}

/// Advisory credit check for a user and operation.
///
/// Always returns a result; a failing check is a 200 with
/// `has_credits: false`, never an error.
pub async fn check_credits(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<CheckRequest>,
) -> Result<Json<CreditCheck>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let operation = parse_operation(&body.operation)?;

    tracing::debug!(
        service = %auth.service_name,
        user_id = %user_id,
        operation = %operation,
        "Credit check"
    );

    Ok(Json(state.ledger.check_credits(&user_id, operation)))
}

// ============================================================================
// Deduct
// ============================================================================

/// Deduction request, sent after the paid work succeeded.
#[derive(Debug, Deserialize)]
pub struct DeductRequest {
    /// User to charge.
    pub user_id: String,
    /// Operation identifier.
    pub operation: String,
    /// Idempotency key for this billing attempt.
    #[serde(default)]
    pub attempt_id: Option<AttemptId>,
    /// Operation-specific context for the audit log.
    #[serde(default)]
    pub metadata: TransactionMetadata,
}

/// Deduction response.
#[derive(Debug, Serialize)]
pub struct DeductResponse {
    /// Whether the charge applied (free operations count as success).
    pub success: bool,
    /// Whether the operation was free.
    pub free: bool,
    /// Credits charged.
    pub cost: i64,
    /// Balance after the charge, absent for free operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<i64>,
    /// The debit transaction, absent for free operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Deduct the operation's cost from the user's balance.
///
/// The conditional decrement is the authoritative gate: a 402 here means
/// the balance was spent between the caller's check and this call, and
/// nothing was mutated.
pub async fn deduct_credits(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<DeductRequest>,
) -> Result<Json<DeductResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let operation = parse_operation(&body.operation)?;

    let outcome = state.ledger.deduct_credits(
        &user_id,
        operation,
        body.metadata,
        body.attempt_id.as_ref(),
    )?;

    match outcome {
        Deduction::Free => Ok(Json(DeductResponse {
            success: true,
            free: true,
            cost: 0,
            new_balance: None,
            transaction_id: None,
        })),
        Deduction::Applied {
            new_balance,
            transaction_id,
        } => {
            tracing::info!(
                service = %auth.service_name,
                user_id = %user_id,
                operation = %operation,
                new_balance,
                "Deduction applied"
            );
            Ok(Json(DeductResponse {
                success: true,
                free: false,
                cost: operation.cost(),
                new_balance: Some(new_balance),
                transaction_id: Some(transaction_id.to_string()),
            }))
        }
        Deduction::InsufficientFunds { balance, required } => {
            Err(payment_required(&state, balance, required))
        }
    }
}

// ============================================================================
// Refund
// ============================================================================

/// Refund request, sent when the paid work failed after a charge.
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// User to compensate.
    pub user_id: String,
    /// Operation that failed.
    pub operation: String,
    /// Why the operation failed.
    pub reason: String,
    /// Attempt id of the original debit; caps compensation at one refund.
    #[serde(default)]
    pub attempt_id: Option<AttemptId>,
}

/// Refund response.
#[derive(Debug, Serialize)]
pub struct RefundResponse {
    /// Whether the refund applied (free operations count as success).
    pub success: bool,
    /// Whether the operation was free (nothing to compensate).
    pub free: bool,
    /// Balance after the refund, absent for free operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<i64>,
    /// The refund transaction, absent for free operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Refund the operation's cost after a failed delivery.
pub async fn refund_credits(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<RefundRequest>,
) -> Result<Json<RefundResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;
    let operation = parse_operation(&body.operation)?;

    let outcome = refund_failed_operation(
        &state.ledger,
        &user_id,
        operation,
        &body.reason,
        body.attempt_id.as_ref(),
    )?;

    match outcome {
        RefundOutcome::Free => Ok(Json(RefundResponse {
            success: true,
            free: true,
            new_balance: None,
            transaction_id: None,
        })),
        RefundOutcome::Applied {
            new_balance,
            transaction_id,
        } => {
            tracing::info!(
                service = %auth.service_name,
                user_id = %user_id,
                operation = %operation,
                reason = %body.reason,
                new_balance,
                "Refund applied"
            );
            Ok(Json(RefundResponse {
                success: true,
                free: false,
                new_balance: Some(new_balance),
                transaction_id: Some(transaction_id.to_string()),
            }))
        }
    }
}

// ============================================================================
// Grant
// ============================================================================

/// Grant request: top-up or promotional credit.
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    /// User to credit.
    pub user_id: String,
    /// Credits to add.
    pub amount: i64,
    /// Where the credits come from (purchase, promo, support, ...).
    pub source: String,
    /// Operator issuing the grant, when manual.
    #[serde(default)]
    pub granted_by: Option<String>,
}

/// Grant response.
#[derive(Debug, Serialize)]
pub struct GrantResponse {
    /// Balance after the grant.
    pub new_balance: i64,
    /// The credit transaction.
    pub transaction_id: String,
}

/// Add credits to a user's balance.
pub async fn grant_credits(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<GrantRequest>,
) -> Result<Json<GrantResponse>, ApiError> {
    let user_id = parse_user_id(&body.user_id)?;

    if body.amount <= 0 {
        return Err(ApiError::BadRequest("Amount must be positive".into()));
    }
    if body.amount > 1_000_000 {
        return Err(ApiError::BadRequest(
            "Amount exceeds the per-grant maximum".into(),
        ));
    }

    let (new_balance, transaction_id) = state.ledger.grant_credits(
        &user_id,
        body.amount,
        &body.source,
        body.granted_by.clone(),
    )?;

    tracing::info!(
        service = %auth.service_name,
        user_id = %user_id,
        amount = body.amount,
        source = %body.source,
        new_balance,
        "Credits granted"
    );

    Ok(Json(GrantResponse {
        new_balance,
        transaction_id: transaction_id.to_string(),
    }))
}
