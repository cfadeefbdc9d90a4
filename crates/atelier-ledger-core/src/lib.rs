//! Core types for the Atelier credit ledger.
//!
//! This crate defines the pure data model shared by the store, service, and
//! client crates:
//!
//! - Strongly-typed identifiers ([`UserId`], [`TransactionId`], [`AttemptId`])
//! - The rate table ([`Operation`], [`Category`]) mapping every billable
//!   action to a fixed credit cost
//! - The per-user [`Balance`] record
//! - The append-only [`LedgerTransaction`] audit record
//! - The advisory [`CreditCheck`] snapshot
//!
//! Everything here is plain data; orchestration lives in the service crate
//! and persistence in the store crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod check;
pub mod ids;
pub mod metadata;
pub mod rates;
pub mod transaction;

pub use balance::Balance;
pub use check::CreditCheck;
pub use ids::{AttemptId, IdError, TransactionId, UserId};
pub use metadata::TransactionMetadata;
pub use rates::{Category, Operation, UnknownOperation};
pub use transaction::{LedgerTransaction, TransactionType};
