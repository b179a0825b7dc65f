use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::config::LedgerConfig;
use crate::observability::Metrics;

/// Shared state of the coordination service.
///
/// The mutex serializes every ledger-touching request; holding it across
/// "find next open, mark, persist" is what makes a lease atomic.
#[derive(Clone)]
pub struct ServiceState {
    pub ledger_dir: Arc<PathBuf>,
    pub ledger: Arc<LedgerConfig>,
    pub accepted_clients: Arc<Vec<String>>,
    pub metrics: Arc<Metrics>,
    guard: Arc<Mutex<()>>,
}

impl ServiceState {
    pub fn new(ledger_dir: PathBuf, ledger: LedgerConfig, accepted_clients: Vec<String>) -> Self {
        Self {
            ledger_dir: Arc::new(ledger_dir),
            ledger: Arc::new(ledger),
            accepted_clients: Arc::new(accepted_clients),
            metrics: Arc::new(Metrics::new()),
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().await
    }
}
