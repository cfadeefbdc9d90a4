//! The per-user balance record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A user's prepaid credit balance.
///
/// One record per user, provisioned lazily at zero on first access and
/// mutated only through the store's atomic debit/credit operations. The
/// `credits` field is never negative: a debit that would overdraw fails
/// before any mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// The user this balance belongs to.
    pub user_id: UserId,

    /// Current spendable credits.
    pub credits: i64,

    /// Lifetime credits spent on successful operations.
    pub lifetime_spent: i64,

    /// Lifetime credits returned by refunds.
    pub lifetime_refunded: i64,

    /// When the record was provisioned.
    pub created_at: DateTime<Utc>,

    /// When the record was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// Provision a fresh zero balance for a user.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            credits: 0,
            lifetime_spent: 0,
            lifetime_refunded: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the balance covers a deduction of `amount` credits.
    #[must_use]
    pub fn can_afford(&self, amount: i64) -> bool {
        self.credits >= amount
    }
}
