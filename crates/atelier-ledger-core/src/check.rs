//! The advisory credit check result.

use serde::{Deserialize, Serialize};

use crate::Operation;

/// Outcome of asking whether a user can afford an operation.
///
/// This is a snapshot, not a reservation: the balance can change between a
/// check and a later deduction, so a passing check never authorizes a
/// charge. The atomic conditional debit in the store is the real gate; the
/// check exists to fail fast and to give the UI exact numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCheck {
    /// Whether the balance covered the cost at check time.
    pub has_credits: bool,

    /// Balance observed at check time.
    pub current_balance: i64,

    /// Credits the operation costs.
    pub required: i64,

    /// How many credits are missing (zero when funded).
    pub deficit: i64,

    /// Whether the operation is free and exempt from checks.
    pub is_free: bool,
}

impl CreditCheck {
    /// A check for a free operation: always passes, never reads the store.
    #[must_use]
    pub const fn free() -> Self {
        Self {
            has_credits: true,
            current_balance: 0,
            required: 0,
            deficit: 0,
            is_free: true,
        }
    }

    /// Evaluate a paid operation against an observed balance.
    #[must_use]
    pub fn evaluate(operation: Operation, current_balance: i64) -> Self {
        let required = operation.cost();
        let has_credits = current_balance >= required;
        Self {
            has_credits,
            current_balance,
            required,
            deficit: if has_credits {
                0
            } else {
                required - current_balance
            },
            is_free: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn funded_check_has_no_deficit() {
        let check = CreditCheck::evaluate(Operation::MusicGenerateV5, 10);
        assert!(check.has_credits);
        assert_eq!(check.current_balance, 10);
        assert_eq!(check.required, 6);
        assert_eq!(check.deficit, 0);
        assert!(!check.is_free);
    }

    #[test]
    fn underfunded_check_reports_exact_deficit() {
        let check = CreditCheck::evaluate(Operation::MusicGenerateV5, 3);
        assert!(!check.has_credits);
        assert_eq!(check.deficit, 3);
    }

    #[test]
    fn exact_balance_passes() {
        let check = CreditCheck::evaluate(Operation::ImageStandard, 25);
        assert!(check.has_credits);
        assert_eq!(check.deficit, 0);
    }

    #[test]
    fn free_check_passes_regardless() {
        let check = CreditCheck::free();
        assert!(check.has_credits);
        assert!(check.is_free);
        assert_eq!(check.required, 0);
    }
}
