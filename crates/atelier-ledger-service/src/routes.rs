//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{credits, health, rates, settlements};
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/rates` - Rate table listing
///
/// ## Credits (user JWT auth)
/// - `GET /v1/credits/balance` - Current balance
/// - `GET /v1/credits/transactions` - Transaction history
///
/// ## Billing protocol (service API key auth)
/// - `POST /v1/credits/check` - Advisory credit check
/// - `POST /v1/credits/deduct` - Debit after successful work
/// - `POST /v1/credits/refund` - Compensating refund
/// - `POST /v1/credits/grant` - Top-up / promotional credit
///
/// ## Settlements (service API key auth)
/// - `GET /v1/settlements/stale` - Attempts that never settled
/// - `POST /v1/settlements/resolve` - Dismiss a record after review
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    Router::new()
        // Public
        .route("/health", get(health::health))
        .route("/v1/rates", get(rates::list_rates))
        // Credits (user auth)
        .route("/v1/credits/balance", get(credits::get_balance))
        .route("/v1/credits/transactions", get(credits::list_transactions))
        // Billing protocol (service auth)
        .route("/v1/credits/check", post(credits::check_credits))
        .route("/v1/credits/deduct", post(credits::deduct_credits))
        .route("/v1/credits/refund", post(credits::refund_credits))
        .route("/v1/credits/grant", post(credits::grant_credits))
        // Settlements (service auth)
        .route("/v1/settlements/stale", get(settlements::list_stale))
        .route("/v1/settlements/resolve", post(settlements::resolve))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
