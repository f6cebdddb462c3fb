//! Application state shared across all request handlers.

use std::sync::Arc;

use coinjar_core::LedgerService;

use crate::config::Config;

/// Shared application state available to all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The authoritative device ledger.
    pub ledger: LedgerService,

    /// Application configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Create application state with a fresh in-memory ledger.
    pub fn new(config: Config) -> Self {
        let ledger = LedgerService::in_memory(config.idempotency_window);

        tracing::info!(
            idempotency_window = config.idempotency_window,
            "in-memory ledger initialized"
        );

        Self::with_ledger(config, ledger)
    }

    /// Create application state around an existing ledger service.
    pub fn with_ledger(config: Config, ledger: LedgerService) -> Self {
        Self {
            ledger,
            config: Arc::new(config),
        }
    }
}
