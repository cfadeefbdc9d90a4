//! `RocksDB` storage layer for the Atelier credit ledger.
//!
//! This crate persists balances, the append-only transaction log, attempt
//! markers, and open settlement records using `RocksDB` column families.
//!
//! # Architecture
//!
//! - `balances`: per-user balance records, keyed by `user_id`
//! - `transactions`: ledger transactions, keyed by `transaction_id` (ULID)
//! - `transactions_by_user`: time-ordered index for per-user history
//! - `attempts`: idempotency markers, keyed by kind + `attempt_id`
//! - `settlements`: open settlement records for crash recovery
//!
//! The balance mutations are compound: the conditional check (for debits),
//! the balance write, the transaction append, and the attempt marker land in
//! one `WriteBatch`, and concurrent mutations for the same user serialize on
//! a striped lock held across the whole read-check-write section.
//! Application code never reads a balance and writes back a new absolute
//! value.
//!
//! # Example
//!
//! ```no_run
//! use atelier_ledger_store::{RocksStore, Store};
//! use atelier_ledger_core::UserId;
//!
//! let store = RocksStore::open("/tmp/atelier-ledger-db").unwrap();
//!
//! let user_id = UserId::generate();
//! let balance = store.get_or_create_balance(&user_id).unwrap();
//! assert_eq!(balance.credits, 0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_ledger_core::{
    AttemptId, Balance, LedgerTransaction, Operation, TransactionId, TransactionMetadata, UserId,
};

/// Outcome of an applied balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Balance immediately before the mutation.
    pub balance_before: i64,

    /// Balance immediately after the mutation.
    pub balance_after: i64,

    /// Id of the transaction row written with the mutation.
    pub transaction_id: TransactionId,
}

/// A durable record of a billable attempt that passed its funded check but
/// has not yet reached a terminal transaction.
///
/// Written before the paid work runs and deleted when the attempt settles
/// (debit, refund, or no-charge). A record that outlives its request marks a
/// crash in the gap between "work finished" and "billing resolved".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSettlement {
    /// The attempt this record tracks.
    pub attempt_id: AttemptId,

    /// The user the attempt would bill.
    pub user_id: UserId,

    /// The operation the attempt runs.
    pub operation: Operation,

    /// When the attempt passed its funded check.
    pub started_at: DateTime<Utc>,
}

impl PendingSettlement {
    /// Open a settlement record for an attempt starting now.
    #[must_use]
    pub fn open(attempt_id: AttemptId, user_id: UserId, operation: Operation) -> Self {
        Self {
            attempt_id,
            user_id,
            operation,
            started_at: Utc::now(),
        }
    }
}

/// The storage trait defining all ledger persistence operations.
///
/// Each mutation is atomic: either every write it describes lands, or none
/// do. Free operations never reach the store; every amount written is
/// strictly positive.
pub trait Store: Send + Sync {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    /// Get a user's balance, provisioning a zero record if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_or_create_balance(&self, user_id: &UserId) -> Result<Balance>;

    /// Get a user's balance without provisioning.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_balance(&self, user_id: &UserId) -> Result<Option<Balance>>;

    /// Conditionally debit the operation's cost and append the debit
    /// transaction in one atomic unit.
    ///
    /// The decrement applies only if the current balance covers the cost;
    /// concurrent debits for one user are linearized by the store, so the
    /// balance can never go negative. When `attempt` is given, a marker is
    /// written in the same unit and a repeated attempt is refused.
    ///
    /// # Errors
    ///
    /// - `StoreError::InsufficientCredits` if the balance is too low
    ///   (no mutation).
    /// - `StoreError::DuplicateAttempt` if the attempt was already debited.
    fn debit(
        &self,
        user_id: &UserId,
        operation: Operation,
        metadata: TransactionMetadata,
        attempt: Option<&AttemptId>,
    ) -> Result<Applied>;

    /// Unconditionally credit the operation's cost back and append the
    /// refund transaction in one atomic unit.
    ///
    /// When `attempt` is given, at most one refund can ever be applied for
    /// that attempt.
    ///
    /// # Errors
    ///
    /// - `StoreError::DuplicateAttempt` if the attempt was already
    ///   refunded.
    fn refund(
        &self,
        user_id: &UserId,
        operation: Operation,
        metadata: TransactionMetadata,
        attempt: Option<&AttemptId>,
    ) -> Result<Applied>;

    /// Unconditionally add `amount` credits (top-up or promotional grant)
    /// and append the credit transaction in one atomic unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    ///
    /// # Panics
    ///
    /// Panics if `amount` is not strictly positive; callers validate
    /// user-supplied amounts before reaching the store.
    fn grant(
        &self,
        user_id: &UserId,
        amount: i64,
        metadata: TransactionMetadata,
    ) -> Result<Applied>;

    // =========================================================================
    // Transaction Log
    // =========================================================================

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId)
        -> Result<Option<LedgerTransaction>>;

    /// List transactions for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>>;

    // =========================================================================
    // Settlement Records
    // =========================================================================

    /// Durably record an attempt that passed its funded check.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_settlement(&self, settlement: &PendingSettlement) -> Result<()>;

    /// Remove an attempt's settlement record once it reaches a terminal
    /// transaction (or a no-charge resolution). Resolving an unknown
    /// attempt is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn resolve_settlement(&self, attempt_id: &AttemptId) -> Result<()>;

    /// List open settlements started at or before `cutoff`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_open_settlements(&self, cutoff: DateTime<Utc>) -> Result<Vec<PendingSettlement>>;
}
