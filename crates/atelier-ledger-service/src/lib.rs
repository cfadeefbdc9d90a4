//! Atelier Ledger HTTP API Service.
//!
//! This crate provides the credit ledger for the Atelier platform:
//!
//! - Balance and transaction history for end users
//! - The check / deduct / refund protocol for generation backends
//! - Top-up grants
//! - Settlement records for crash recovery
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **User JWTs** - For end-user requests (balance, history)
//! 2. **Service API keys** - For service-to-service requests from the
//!    generation backends

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for routing consistency

pub mod auth;
pub mod billing;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod routes;
pub mod settlement;
pub mod state;

pub use billing::{with_credits, Billed, BillingError, BillingOutcome};
pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::{Deduction, Ledger, LedgerError, RefundOutcome};
pub use routes::create_router;
pub use state::AppState;
