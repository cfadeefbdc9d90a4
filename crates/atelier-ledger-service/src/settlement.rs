//! Background sweep over open settlement records.
//!
//! A settlement record is opened before a paid handler runs and resolved
//! when the attempt reaches a terminal disposition. Records that outlive
//! the stale threshold mean a process died (or a store fault hit) in the
//! gap between "work finished" and "billing resolved". The sweeper only
//! surfaces them: it never charges from a stale record, because the ledger
//! cannot prove the work succeeded. Disposition is operator-driven via the
//! settlements endpoints.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::state::AppState;

/// Run the sweeper until the process exits.
pub async fn run_sweeper(state: Arc<AppState>) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(state.config.settlement_sweep_seconds));
    // The first tick fires immediately; that gives a startup report of
    // anything left over from a previous run.
    loop {
        interval.tick().await;
        sweep_once(&state);
    }
}

/// One sweep pass. Returns how many stale settlements were found.
pub fn sweep_once(state: &AppState) -> usize {
    let cutoff = Utc::now() - chrono::Duration::seconds(state.config.settlement_stale_seconds);

    match state.ledger.open_settlements(cutoff) {
        Ok(stale) => {
            for settlement in &stale {
                tracing::warn!(
                    attempt = %settlement.attempt_id,
                    user_id = %settlement.user_id,
                    operation = %settlement.operation,
                    started_at = %settlement.started_at,
                    "Stale settlement: attempt never reached a terminal transaction"
                );
            }
            stale.len()
        }
        Err(e) => {
            tracing::error!(error = %e, "Settlement sweep failed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    use atelier_ledger_core::{Operation, UserId};
    use atelier_ledger_store::RocksStore;

    use crate::config::ServiceConfig;

    fn test_state(stale_seconds: i64) -> (AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let config = ServiceConfig {
            settlement_stale_seconds: stale_seconds,
            ..ServiceConfig::default()
        };
        (AppState::new(store, config), dir)
    }

    #[test]
    fn fresh_settlements_are_not_stale() {
        let (state, _dir) = test_state(600);
        let user_id = UserId::generate();

        state
            .ledger
            .begin_settlement(&user_id, Operation::VideoGen4_10s)
            .unwrap();

        assert_eq!(sweep_once(&state), 0);
    }

    #[test]
    fn old_settlements_are_reported() {
        // Threshold of zero: everything open counts as stale.
        let (state, _dir) = test_state(0);
        let user_id = UserId::generate();

        let attempt = state
            .ledger
            .begin_settlement(&user_id, Operation::VideoGen4_10s)
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(sweep_once(&state), 1);

        state.ledger.resolve_settlement(&attempt).unwrap();
        assert_eq!(sweep_once(&state), 0);
    }
}
