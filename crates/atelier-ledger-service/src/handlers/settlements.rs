//! Operator surface for open settlement records.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use atelier_ledger_core::{AttemptId, Operation};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// One stale settlement.
#[derive(Debug, Serialize)]
pub struct SettlementResponse {
    /// The attempt that never settled.
    pub attempt_id: String,
    /// The user it would have billed.
    pub user_id: String,
    /// The operation it ran.
    pub operation: Operation,
    /// When the attempt passed its funded check (RFC 3339).
    pub started_at: String,
    /// Age in seconds.
    pub age_seconds: i64,
}

/// Stale settlements response.
#[derive(Debug, Serialize)]
pub struct ListSettlementsResponse {
    /// Open settlements older than the stale threshold, oldest first.
    pub settlements: Vec<SettlementResponse>,
}

/// List open settlements older than the configured stale threshold.
///
/// These are attempts that passed their funded check but never reached a
/// terminal transaction - the signature of a crash between "work finished"
/// and "billing resolved". The service never charges from these records;
/// an operator inspects the attempt and either refunds, grants, or
/// dismisses it.
pub async fn list_stale(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
) -> Result<Json<ListSettlementsResponse>, ApiError> {
    let now = Utc::now();
    let cutoff = now - chrono::Duration::seconds(state.config.settlement_stale_seconds);

    let settlements = state
        .ledger
        .open_settlements(cutoff)?
        .into_iter()
        .map(|s| SettlementResponse {
            attempt_id: s.attempt_id.to_string(),
            user_id: s.user_id.to_string(),
            operation: s.operation,
            started_at: s.started_at.to_rfc3339(),
            age_seconds: (now - s.started_at).num_seconds(),
        })
        .collect();

    Ok(Json(ListSettlementsResponse { settlements }))
}

/// Settlement resolution request.
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    /// The attempt whose record to dismiss.
    pub attempt_id: String,
}

/// Dismiss an open settlement record after operator review.
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let attempt_id: AttemptId = body
        .attempt_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid attempt ID".into()))?;

    state.ledger.resolve_settlement(&attempt_id)?;

    tracing::info!(
        service = %auth.service_name,
        attempt = %attempt_id,
        "Settlement dismissed by operator"
    );

    Ok(Json(serde_json::json!({ "resolved": body.attempt_id })))
}
