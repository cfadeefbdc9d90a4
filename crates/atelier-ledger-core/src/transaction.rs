//! Ledger transaction types.
//!
//! Every balance change appends exactly one transaction. Rows are immutable
//! once written; corrections happen through compensating entries (a refund
//! for a debit), never by editing history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Operation, TransactionId, TransactionMetadata, UserId};

/// An append-only audit record of one balance change.
///
/// `amount` is always positive; direction comes from `tx_type`. The row
/// carries both sides of the mutation (`balance_before`, `balance_after`) so
/// the log reconciles against the balance without replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique transaction id (ULID, time-ordered).
    pub id: TransactionId,

    /// The user whose balance changed.
    pub user_id: UserId,

    /// Direction of the change.
    pub tx_type: TransactionType,

    /// Credits moved. Strictly positive.
    pub amount: i64,

    /// The billable operation, when the change is tied to one.
    /// Top-ups and grants have none.
    pub operation: Option<Operation>,

    /// Balance immediately before this transaction.
    pub balance_before: i64,

    /// Balance immediately after this transaction.
    pub balance_after: i64,

    /// Operation-specific context.
    pub metadata: TransactionMetadata,

    /// When the transaction was written.
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Build a debit row for a successful paid operation.
    #[must_use]
    pub fn debit(
        user_id: UserId,
        operation: Operation,
        balance_before: i64,
        balance_after: i64,
        metadata: TransactionMetadata,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            tx_type: TransactionType::Debit,
            amount: operation.cost(),
            operation: Some(operation),
            balance_before,
            balance_after,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Build a refund row compensating a failed operation.
    #[must_use]
    pub fn refund(
        user_id: UserId,
        operation: Operation,
        balance_before: i64,
        balance_after: i64,
        metadata: TransactionMetadata,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            tx_type: TransactionType::Refund,
            amount: operation.cost(),
            operation: Some(operation),
            balance_before,
            balance_after,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Build a credit row for a top-up or grant.
    #[must_use]
    pub fn credit(
        user_id: UserId,
        amount: i64,
        balance_before: i64,
        balance_after: i64,
        metadata: TransactionMetadata,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            tx_type: TransactionType::Credit,
            amount,
            operation: None,
            balance_before,
            balance_after,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// The change this row applied to the balance, signed by direction.
    #[must_use]
    pub const fn signed_amount(&self) -> i64 {
        if self.tx_type.is_debit() {
            -self.amount
        } else {
            self.amount
        }
    }

    /// Whether the row's balances agree with its amount and direction.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.amount > 0 && self.balance_after == self.balance_before + self.signed_amount()
    }
}

/// Direction of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Balance decrease for a successful paid operation.
    Debit,

    /// Balance increase from a top-up or grant.
    Credit,

    /// Balance increase compensating a failed paid operation.
    Refund,
}

impl TransactionType {
    /// Whether this type increases the balance.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Credit | Self::Refund)
    }

    /// Whether this type decreases the balance.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Debit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_row_is_consistent() {
        let user_id = UserId::generate();
        let tx = LedgerTransaction::debit(
            user_id,
            Operation::ImageUltra,
            100,
            65,
            TransactionMetadata::None,
        );

        assert_eq!(tx.amount, 35);
        assert_eq!(tx.tx_type, TransactionType::Debit);
        assert_eq!(tx.operation, Some(Operation::ImageUltra));
        assert_eq!(tx.signed_amount(), -35);
        assert!(tx.is_consistent());
    }

    #[test]
    fn refund_row_is_consistent() {
        let user_id = UserId::generate();
        let tx = LedgerTransaction::refund(
            user_id,
            Operation::VideoGen4_10s,
            60,
            100,
            TransactionMetadata::refund("render failed", None),
        );

        assert_eq!(tx.amount, 40);
        assert_eq!(tx.tx_type, TransactionType::Refund);
        assert_eq!(tx.signed_amount(), 40);
        assert!(tx.is_consistent());
    }

    #[test]
    fn credit_row_has_no_operation() {
        let user_id = UserId::generate();
        let tx = LedgerTransaction::credit(
            user_id,
            500,
            0,
            500,
            TransactionMetadata::grant("purchase", None),
        );

        assert_eq!(tx.operation, None);
        assert_eq!(tx.tx_type, TransactionType::Credit);
        assert!(tx.is_consistent());
    }

    #[test]
    fn mismatched_balances_are_inconsistent() {
        let user_id = UserId::generate();
        let mut tx = LedgerTransaction::debit(
            user_id,
            Operation::ChatAdvanced,
            10,
            9,
            TransactionMetadata::None,
        );
        assert!(tx.is_consistent());

        tx.balance_after = 8;
        assert!(!tx.is_consistent());
    }

    #[test]
    fn type_direction() {
        assert!(TransactionType::Credit.is_credit());
        assert!(TransactionType::Refund.is_credit());
        assert!(!TransactionType::Debit.is_credit());

        assert!(TransactionType::Debit.is_debit());
        assert!(!TransactionType::Refund.is_debit());
    }
}
