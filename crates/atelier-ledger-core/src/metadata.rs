//! Structured metadata attached to ledger transactions.
//!
//! Metadata is a closed, tagged record rather than an open JSON bag so the
//! audit log stays queryable: every variant has a fixed shape and the tag
//! survives serialization.

use serde::{Deserialize, Serialize};

use crate::AttemptId;

/// Operation-specific context recorded alongside a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionMetadata {
    /// No additional context.
    #[default]
    None,

    /// Context of a paid generation (debit transactions).
    Generation {
        /// The user's prompt, when the operation took one.
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        /// Model or engine that served the request.
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        /// Input asset, for operations that transform one.
        #[serde(skip_serializing_if = "Option::is_none")]
        source_url: Option<String>,
        /// Where the produced asset was stored.
        #[serde(skip_serializing_if = "Option::is_none")]
        result_url: Option<String>,
        /// Requested output duration, for timed media.
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_secs: Option<u32>,
    },

    /// Context of a compensating refund (refund transactions).
    Refund {
        /// Why the debited operation failed.
        reason: String,
        /// The attempt whose debit this refund compensates.
        #[serde(skip_serializing_if = "Option::is_none")]
        failed_attempt: Option<AttemptId>,
    },

    /// Context of a top-up or promotional grant (credit transactions).
    Grant {
        /// Where the credits came from (purchase, promo, support, ...).
        source: String,
        /// Operator who issued the grant, when manual.
        #[serde(skip_serializing_if = "Option::is_none")]
        granted_by: Option<String>,
    },
}

impl TransactionMetadata {
    /// Metadata for a refund with the given failure reason.
    #[must_use]
    pub fn refund(reason: impl Into<String>, failed_attempt: Option<AttemptId>) -> Self {
        Self::Refund {
            reason: reason.into(),
            failed_attempt,
        }
    }

    /// Metadata for a credit grant from the given source.
    #[must_use]
    pub fn grant(source: impl Into<String>, granted_by: Option<String>) -> Self {
        Self::Grant {
            source: source.into(),
            granted_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_none() {
        assert_eq!(TransactionMetadata::default(), TransactionMetadata::None);
    }

    #[test]
    fn tagged_serialization() {
        let meta = TransactionMetadata::Generation {
            prompt: Some("a rainy street at dusk".into()),
            model: Some("gen4-turbo".into()),
            source_url: None,
            result_url: None,
            duration_secs: Some(10),
        };

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["kind"], "generation");
        assert_eq!(json["duration_secs"], 10);
        assert!(json.get("source_url").is_none());

        let back: TransactionMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn refund_metadata_carries_reason_and_attempt() {
        let attempt = AttemptId::generate();
        let meta = TransactionMetadata::refund("upstream timeout", Some(attempt));

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["kind"], "refund");
        assert_eq!(json["reason"], "upstream timeout");
        assert_eq!(json["failed_attempt"], attempt.to_string());
    }
}
