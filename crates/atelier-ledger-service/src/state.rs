//! Application state.

use std::sync::Arc;

use atelier_ledger_store::RocksStore;

use crate::config::ServiceConfig;
use crate::ledger::Ledger;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The ledger over the storage backend.
    pub ledger: Ledger<RocksStore>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not set - service endpoints will reject all requests");
        }

        Self {
            ledger: Ledger::new(store),
            config,
        }
    }
}
