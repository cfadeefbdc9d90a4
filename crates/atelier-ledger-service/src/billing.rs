//! Billing middleware: wraps a paid operation's handler in the
//! check → execute → settle protocol.
//!
//! This is a saga, not a two-phase commit: the paid work is an external,
//! non-transactional call, so consistency between "work done" and "credits
//! spent" is best-effort and observable in the transaction log. The
//! middleware guarantees that every funded attempt either settles in-process
//! (debit, refund, or no-charge) or leaves a durable open settlement for the
//! sweeper.
//!
//! Charge ordering: the handler runs first, the debit lands only on
//! success. A handler that fails is never charged. A debit that loses the
//! race after the work succeeded does not undo the work - the caller
//! receives the result with a [`BillingOutcome::ChargeFailed`] flag and
//! decides disposition. Call sites that charge *before* delivery instead
//! compensate a failed delivery with [`refund_failed_operation`].

use std::future::Future;

use atelier_ledger_core::{
    AttemptId, CreditCheck, Operation, TransactionId, TransactionMetadata, UserId,
};
use atelier_ledger_store::Store;

use crate::ledger::{Deduction, Ledger, LedgerError, RefundOutcome};

/// How a wrapped operation was billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingOutcome {
    /// Free operation: no check, no charge, no audit entry.
    Free,

    /// The debit was applied after the handler succeeded.
    Charged {
        /// Balance after the debit.
        new_balance: i64,
        /// The debit transaction.
        transaction_id: TransactionId,
        /// Credits charged.
        cost: i64,
    },

    /// The handler succeeded but the authoritative debit refused (the
    /// balance was spent concurrently between check and deduct). The
    /// result is still delivered; disposition of the loss is the caller's
    /// business decision.
    ChargeFailed {
        /// Balance at the refused debit.
        balance: i64,
        /// Credits the operation required.
        required: i64,
    },
}

/// A handler result together with how it was billed.
#[derive(Debug)]
pub struct Billed<T> {
    /// The handler's output.
    pub value: T,
    /// How the operation was billed.
    pub outcome: BillingOutcome,
}

/// Failures of the billing wrapper.
#[derive(Debug)]
pub enum BillingError<E> {
    /// The advisory check found the balance short; the handler never ran.
    InsufficientFunds(CreditCheck),

    /// The wrapped handler failed. No charge was applied.
    Handler(E),

    /// The ledger itself failed.
    Ledger(LedgerError),
}

/// Run `handler` under the credit protocol for `operation`.
///
/// 1. Advisory check; short-circuits with
///    [`BillingError::InsufficientFunds`] when underfunded and not free.
/// 2. For paid operations, durably opens a settlement record before the
///    handler runs.
/// 3. Runs the handler.
/// 4. On success, applies the debit keyed by the settlement's attempt id.
///    A lost race becomes [`BillingOutcome::ChargeFailed`] alongside the
///    handler's value.
/// 5. On handler failure the error propagates uncharged: under post-pay
///    ordering no debit exists yet. Call sites that charge before
///    delivering compensate a failed delivery with
///    [`refund_failed_operation`], which caps compensation at one refund
///    per attempt.
/// 6. Resolves the settlement on every terminal path. A storage fault
///    while charging leaves the settlement open on purpose: the sweeper
///    surfaces it instead of the attempt vanishing unbilled.
///
/// # Errors
///
/// See [`BillingError`].
pub async fn with_credits<S, T, E, F, Fut>(
    ledger: &Ledger<S>,
    user_id: UserId,
    operation: Operation,
    metadata: TransactionMetadata,
    handler: F,
) -> Result<Billed<T>, BillingError<E>>
where
    S: Store,
    F: FnOnce(UserId) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let check = ledger.check_credits(&user_id, operation);

    if check.is_free {
        let value = handler(user_id).await.map_err(BillingError::Handler)?;
        return Ok(Billed {
            value,
            outcome: BillingOutcome::Free,
        });
    }

    if !check.has_credits {
        tracing::debug!(
            user_id = %user_id,
            operation = %operation,
            deficit = check.deficit,
            "Short-circuiting underfunded request"
        );
        return Err(BillingError::InsufficientFunds(check));
    }

    let attempt = ledger
        .begin_settlement(&user_id, operation)
        .map_err(BillingError::Ledger)?;

    match handler(user_id).await {
        Ok(value) => match ledger.deduct_credits(&user_id, operation, metadata, Some(&attempt)) {
            Ok(Deduction::Applied {
                new_balance,
                transaction_id,
            }) => {
                resolve_quietly(ledger, &attempt);
                Ok(Billed {
                    value,
                    outcome: BillingOutcome::Charged {
                        new_balance,
                        transaction_id,
                        cost: operation.cost(),
                    },
                })
            }
            Ok(Deduction::InsufficientFunds { balance, required }) => {
                tracing::warn!(
                    user_id = %user_id,
                    operation = %operation,
                    balance,
                    required,
                    "Handler succeeded but debit lost the race; delivering unbilled"
                );
                resolve_quietly(ledger, &attempt);
                Ok(Billed {
                    value,
                    outcome: BillingOutcome::ChargeFailed { balance, required },
                })
            }
            Ok(Deduction::Free) => {
                // Paid path never yields Free; keep the result coherent anyway.
                resolve_quietly(ledger, &attempt);
                Ok(Billed {
                    value,
                    outcome: BillingOutcome::Free,
                })
            }
            Err(e) => {
                // The charge may or may not have landed; the open settlement
                // record is the recovery signal.
                tracing::error!(
                    user_id = %user_id,
                    operation = %operation,
                    attempt = %attempt,
                    error = %e,
                    "Ledger fault while charging; leaving settlement open"
                );
                Err(BillingError::Ledger(e))
            }
        },
        Err(err) => {
            // Nothing was charged: the debit only runs in the success arm.
            // The settlement closes with no transaction.
            resolve_quietly(ledger, &attempt);
            Err(BillingError::Handler(err))
        }
    }
}

/// Compensate an already-charged attempt whose delivery failed.
///
/// For call sites that charge via [`Ledger::deduct_credits`] and only then
/// deliver the result: when delivery fails, this refunds the charge (capped
/// at one refund per attempt) and closes the attempt's settlement record if
/// one is open.
///
/// # Errors
///
/// Returns [`LedgerError`] as [`Ledger::refund_credits`] does; a
/// [`LedgerError::DuplicateAttempt`] means the attempt was already
/// compensated.
pub fn refund_failed_operation<S: Store>(
    ledger: &Ledger<S>,
    user_id: &UserId,
    operation: Operation,
    reason: &str,
    attempt: Option<&AttemptId>,
) -> Result<RefundOutcome, LedgerError> {
    let outcome = ledger.refund_credits(user_id, operation, reason, attempt)?;
    if let Some(attempt) = attempt {
        ledger.resolve_settlement(attempt)?;
    }
    Ok(outcome)
}

/// Resolve a settlement, downgrading failures to a log line: the record is
/// bookkeeping, and a leftover one only costs a sweeper warning.
fn resolve_quietly<S: Store>(ledger: &Ledger<S>, attempt: &AttemptId) {
    if let Err(e) = ledger.resolve_settlement(attempt) {
        tracing::warn!(attempt = %attempt, error = %e, "Failed to resolve settlement record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    use atelier_ledger_store::RocksStore;
    use chrono::Utc;

    fn test_ledger() -> (Ledger, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (Ledger::new(store), dir)
    }

    fn seed(ledger: &Ledger, user_id: &UserId, amount: i64) {
        ledger.grant_credits(user_id, amount, "test", None).unwrap();
    }

    #[tokio::test]
    async fn charges_after_successful_handler() {
        let (ledger, _dir) = test_ledger();
        let user_id = UserId::generate();
        seed(&ledger, &user_id, 10);

        let billed = with_credits(
            &ledger,
            user_id,
            Operation::MusicGenerateV5,
            TransactionMetadata::None,
            |_| async { Ok::<_, String>("track.mp3") },
        )
        .await
        .unwrap();

        assert_eq!(billed.value, "track.mp3");
        assert!(matches!(
            billed.outcome,
            BillingOutcome::Charged {
                new_balance: 4,
                cost: 6,
                ..
            }
        ));
        assert_eq!(ledger.get_balance(&user_id).unwrap(), 4);
    }

    #[tokio::test]
    async fn short_circuits_underfunded_request() {
        let (ledger, _dir) = test_ledger();
        let user_id = UserId::generate();
        seed(&ledger, &user_id, 3);

        let mut handler_ran = false;
        let result = with_credits(
            &ledger,
            user_id,
            Operation::MusicGenerateV5,
            TransactionMetadata::None,
            |_| {
                handler_ran = true;
                async { Ok::<_, String>(()) }
            },
        )
        .await;

        match result {
            Err(BillingError::InsufficientFunds(check)) => {
                assert_eq!(check.current_balance, 3);
                assert_eq!(check.required, 6);
                assert_eq!(check.deficit, 3);
            }
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }
        assert!(!handler_ran, "handler must not run when underfunded");
        assert_eq!(ledger.get_balance(&user_id).unwrap(), 3);
    }

    #[tokio::test]
    async fn free_operation_skips_billing_entirely() {
        let (ledger, _dir) = test_ledger();
        let user_id = UserId::generate();

        let billed = with_credits(
            &ledger,
            user_id,
            Operation::ChatBasic,
            TransactionMetadata::None,
            |_| async { Ok::<_, String>("hello") },
        )
        .await
        .unwrap();

        assert!(matches!(billed.outcome, BillingOutcome::Free));
        assert!(ledger
            .transaction_history(&user_id, 10, 0)
            .unwrap()
            .is_empty());
        assert!(ledger.open_settlements(Utc::now()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_handler_is_never_charged() {
        let (ledger, _dir) = test_ledger();
        let user_id = UserId::generate();
        seed(&ledger, &user_id, 50);

        let result = with_credits(
            &ledger,
            user_id,
            Operation::ImageUltra,
            TransactionMetadata::None,
            |_| async { Err::<(), _>("upstream 500".to_string()) },
        )
        .await;

        assert!(matches!(result, Err(BillingError::Handler(ref e)) if e == "upstream 500"));
        assert_eq!(ledger.get_balance(&user_id).unwrap(), 50);
        // One transaction only: the seed grant. No debit, no refund.
        assert_eq!(ledger.transaction_history(&user_id, 10, 0).unwrap().len(), 1);
        // Settlement closed with no charge.
        assert!(ledger.open_settlements(Utc::now()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn race_lost_deduct_delivers_with_billing_failure_flag() {
        let (ledger, _dir) = test_ledger();
        let user_id = UserId::generate();
        seed(&ledger, &user_id, 40);

        // The handler itself drains the balance, simulating a concurrent
        // spend between check and deduct.
        let draining = ledger.clone();
        let billed = with_credits(
            &ledger,
            user_id,
            Operation::VideoGen4_10s,
            TransactionMetadata::None,
            move |uid| async move {
                draining
                    .deduct_credits(
                        &uid,
                        Operation::ImageUltra,
                        TransactionMetadata::None,
                        None,
                    )
                    .unwrap();
                Ok::<_, String>("clip.mp4")
            },
        )
        .await
        .unwrap();

        assert_eq!(billed.value, "clip.mp4");
        assert_eq!(
            billed.outcome,
            BillingOutcome::ChargeFailed {
                balance: 5,
                required: 40
            }
        );
        // The concurrent spend stands; the lost debit wrote nothing.
        assert_eq!(ledger.get_balance(&user_id).unwrap(), 5);
    }

    #[tokio::test]
    async fn settlement_resolved_after_charge() {
        let (ledger, _dir) = test_ledger();
        let user_id = UserId::generate();
        seed(&ledger, &user_id, 10);

        with_credits(
            &ledger,
            user_id,
            Operation::MusicGenerateV5,
            TransactionMetadata::None,
            |_| async { Ok::<_, String>(()) },
        )
        .await
        .unwrap();

        assert!(ledger.open_settlements(Utc::now()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn refund_failed_operation_compensates_once() {
        let (ledger, _dir) = test_ledger();
        let user_id = UserId::generate();
        seed(&ledger, &user_id, 50);

        // A call site charged up-front, then delivery failed.
        let attempt = ledger.begin_settlement(&user_id, Operation::VideoGen4_5s).unwrap();
        ledger
            .deduct_credits(
                &user_id,
                Operation::VideoGen4_5s,
                TransactionMetadata::None,
                Some(&attempt),
            )
            .unwrap();
        assert_eq!(ledger.get_balance(&user_id).unwrap(), 30);

        let outcome = refund_failed_operation(
            &ledger,
            &user_id,
            Operation::VideoGen4_5s,
            "delivery failed",
            Some(&attempt),
        )
        .unwrap();
        assert!(matches!(outcome, RefundOutcome::Applied { new_balance: 50, .. }));
        assert!(ledger.open_settlements(Utc::now()).unwrap().is_empty());

        // A second compensation for the same attempt is refused.
        let err = refund_failed_operation(
            &ledger,
            &user_id,
            Operation::VideoGen4_5s,
            "delivery failed again",
            Some(&attempt),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateAttempt(_)));
        assert_eq!(ledger.get_balance(&user_id).unwrap(), 50);
    }
}
