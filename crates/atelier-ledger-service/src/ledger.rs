//! The ledger service: the check / deduct / refund protocol every billable
//! call site drives.
//!
//! The protocol is check-before-work, debit-after-success:
//!
//! 1. [`Ledger::check_credits`] - advisory read, fails fast on obviously
//!    underfunded requests. Never a reservation.
//! 2. The caller performs the paid work (an external generation call that
//!    can take seconds to minutes; nothing is locked meanwhile).
//! 3. [`Ledger::deduct_credits`] on success - the store's conditional
//!    decrement is the authoritative gate and can still refuse if the
//!    balance was spent concurrently.
//! 4. [`Ledger::refund_credits`] if the work failed after a charge.
//!
//! Expected business conditions (insufficient funds, free operations) come
//! back as structured outcomes; `Err` is reserved for infrastructure
//! faults and duplicate attempts. The ledger never retries internally.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use atelier_ledger_core::{
    AttemptId, CreditCheck, LedgerTransaction, Operation, TransactionId, TransactionMetadata,
    UserId,
};
use atelier_ledger_store::{PendingSettlement, RocksStore, Store, StoreError};

/// Errors from ledger operations.
///
/// Insufficient funds is deliberately *not* here: it is an expected
/// business outcome, reported through [`Deduction::InsufficientFunds`].
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// An attempt id was submitted twice; the original application stands.
    #[error("duplicate attempt: {0}")]
    DuplicateAttempt(String),

    /// The underlying store failed.
    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateAttempt { attempt_id } => Self::DuplicateAttempt(attempt_id),
            other => Self::Storage(other),
        }
    }
}

/// Outcome of a deduction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deduction {
    /// The operation is free; nothing was touched.
    Free,

    /// The debit was applied and logged.
    Applied {
        /// Balance after the debit.
        new_balance: i64,
        /// The debit transaction.
        transaction_id: TransactionId,
    },

    /// The conditional debit refused: the balance no longer covers the
    /// cost (possible even after a passing check, if concurrent requests
    /// spent the balance first). Nothing was mutated; the caller decides
    /// what happens to the already-produced result.
    InsufficientFunds {
        /// Balance at the time of the refused debit.
        balance: i64,
        /// Credits the operation requires.
        required: i64,
    },
}

/// Outcome of a refund request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    /// The operation is free; there is nothing to compensate.
    Free,

    /// The refund was applied and logged.
    Applied {
        /// Balance after the refund.
        new_balance: i64,
        /// The refund transaction.
        transaction_id: TransactionId,
    },
}

/// The ledger service over a storage backend.
#[derive(Debug)]
pub struct Ledger<S = RocksStore> {
    store: Arc<S>,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> Ledger<S> {
    /// Create a ledger over the given store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Check whether a user can afford an operation.
    ///
    /// Advisory only: a pure read plus a comparison, never a lock or a
    /// reservation. Free operations pass without touching the store. A
    /// storage fault degrades to "not funded" (logged) rather than an
    /// error, because the check gates nothing - the conditional debit does.
    #[must_use]
    pub fn check_credits(&self, user_id: &UserId, operation: Operation) -> CreditCheck {
        if operation.is_free() {
            return CreditCheck::free();
        }

        match self.store.get_or_create_balance(user_id) {
            Ok(balance) => CreditCheck::evaluate(operation, balance.credits),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    operation = %operation,
                    error = %e,
                    "Credit check failed to read balance"
                );
                CreditCheck {
                    has_credits: false,
                    current_balance: 0,
                    required: operation.cost(),
                    deficit: operation.cost(),
                    is_free: false,
                }
            }
        }
    }

    /// Deduct the operation's cost after the paid work succeeded.
    ///
    /// No-ops for free operations. The conditional decrement and the debit
    /// transaction land in one atomic unit; on a lost race the outcome is
    /// [`Deduction::InsufficientFunds`] with no mutation.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::DuplicateAttempt`] if `attempt` was already
    ///   debited.
    /// - [`LedgerError::Storage`] on infrastructure faults.
    pub fn deduct_credits(
        &self,
        user_id: &UserId,
        operation: Operation,
        metadata: TransactionMetadata,
        attempt: Option<&AttemptId>,
    ) -> Result<Deduction, LedgerError> {
        if operation.is_free() {
            tracing::debug!(operation = %operation, "Free operation - no deduction");
            return Ok(Deduction::Free);
        }

        match self.store.debit(user_id, operation, metadata, attempt) {
            Ok(applied) => {
                tracing::info!(
                    user_id = %user_id,
                    operation = %operation,
                    cost = operation.cost(),
                    balance_before = applied.balance_before,
                    balance_after = applied.balance_after,
                    transaction_id = %applied.transaction_id,
                    "Credits deducted"
                );
                Ok(Deduction::Applied {
                    new_balance: applied.balance_after,
                    transaction_id: applied.transaction_id,
                })
            }
            Err(StoreError::InsufficientCredits { balance, required }) => {
                tracing::warn!(
                    user_id = %user_id,
                    operation = %operation,
                    balance,
                    required,
                    "Deduction refused: insufficient credits"
                );
                Ok(Deduction::InsufficientFunds { balance, required })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refund the operation's cost after the paid work failed.
    ///
    /// No-ops for free operations. The increment and the refund
    /// transaction (carrying `reason`) land in one atomic unit. Passing the
    /// attempt id of the original debit caps compensation at one refund.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::DuplicateAttempt`] if `attempt` was already
    ///   refunded.
    /// - [`LedgerError::Storage`] on infrastructure faults.
    pub fn refund_credits(
        &self,
        user_id: &UserId,
        operation: Operation,
        reason: &str,
        attempt: Option<&AttemptId>,
    ) -> Result<RefundOutcome, LedgerError> {
        if operation.is_free() {
            return Ok(RefundOutcome::Free);
        }

        let metadata = TransactionMetadata::refund(reason, attempt.copied());
        let applied = self.store.refund(user_id, operation, metadata, attempt)?;

        tracing::info!(
            user_id = %user_id,
            operation = %operation,
            reason = %reason,
            balance_after = applied.balance_after,
            transaction_id = %applied.transaction_id,
            "Credits refunded"
        );

        Ok(RefundOutcome::Applied {
            new_balance: applied.balance_after,
            transaction_id: applied.transaction_id,
        })
    }

    /// Add credits from a top-up or promotional grant.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] on infrastructure faults.
    pub fn grant_credits(
        &self,
        user_id: &UserId,
        amount: i64,
        source: &str,
        granted_by: Option<String>,
    ) -> Result<(i64, TransactionId), LedgerError> {
        let metadata = TransactionMetadata::grant(source, granted_by);
        let applied = self.store.grant(user_id, amount, metadata)?;

        tracing::info!(
            user_id = %user_id,
            amount,
            source = %source,
            balance_after = applied.balance_after,
            "Credits granted"
        );

        Ok((applied.balance_after, applied.transaction_id))
    }

    /// Current balance, provisioning a zero record on first access.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] on infrastructure faults.
    pub fn get_balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        Ok(self.store.get_or_create_balance(user_id)?.credits)
    }

    /// Full balance record, with lifetime counters.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] on infrastructure faults.
    pub fn get_balance_record(
        &self,
        user_id: &UserId,
    ) -> Result<atelier_ledger_core::Balance, LedgerError> {
        Ok(self.store.get_or_create_balance(user_id)?)
    }

    /// Transaction history, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] on infrastructure faults.
    pub fn transaction_history(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        Ok(self.store.list_transactions(user_id, limit, offset)?)
    }

    // =========================================================================
    // Settlement bracket
    // =========================================================================

    /// Durably open a settlement for an attempt about to run paid work.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] on infrastructure faults.
    pub fn begin_settlement(
        &self,
        user_id: &UserId,
        operation: Operation,
    ) -> Result<AttemptId, LedgerError> {
        let attempt = AttemptId::generate();
        self.store
            .put_settlement(&PendingSettlement::open(attempt, *user_id, operation))?;
        Ok(attempt)
    }

    /// Close an attempt's settlement record after it reached a terminal
    /// disposition.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] on infrastructure faults.
    pub fn resolve_settlement(&self, attempt: &AttemptId) -> Result<(), LedgerError> {
        Ok(self.store.resolve_settlement(attempt)?)
    }

    /// Open settlements started at or before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] on infrastructure faults.
    pub fn open_settlements(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PendingSettlement>, LedgerError> {
        Ok(self.store.list_open_settlements(cutoff)?)
    }
}
