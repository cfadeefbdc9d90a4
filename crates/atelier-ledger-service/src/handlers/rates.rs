//! Rate table handler.

use axum::Json;
use serde::Serialize;

use atelier_ledger_core::Operation;

/// One rate table entry.
#[derive(Debug, Serialize)]
pub struct RateEntry {
    /// Operation identifier.
    pub operation: Operation,
    /// Credit cost.
    pub cost: i64,
    /// Category.
    pub category: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Whether the operation is free.
    pub free: bool,
}

/// Rate table response.
#[derive(Debug, Serialize)]
pub struct RatesResponse {
    /// All operations, cheapest first.
    pub rates: Vec<RateEntry>,
}

/// List the full rate table, cheapest operations first.
pub async fn list_rates() -> Json<RatesResponse> {
    let mut rates: Vec<_> = Operation::ALL
        .iter()
        .map(|&operation| RateEntry {
            operation,
            cost: operation.cost(),
            category: operation.category().as_str(),
            name: operation.name(),
            free: operation.is_free(),
        })
        .collect();
    rates.sort_by_key(|entry| entry.cost);

    Json(RatesResponse { rates })
}
