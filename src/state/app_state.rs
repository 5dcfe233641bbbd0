// Application state management
// Holds the orchestrator and the cancellation tokens of in-flight runs

use crate::session::SessionStore;
use crate::workflow::{Orchestrator, RunId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Shared state of the HTTP server
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    active_runs: RwLock<HashMap<RunId, CancellationToken>>,
}

impl AppState {
    /// Create state around an orchestrator
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            active_runs: RwLock::new(HashMap::new()),
        }
    }

    /// The orchestrator runs are executed on
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Session store shared by all runs
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        self.orchestrator.store()
    }

    /// Register a new run and return its cancellation token
    pub async fn register_run(&self, run_id: RunId) -> CancellationToken {
        let token = CancellationToken::new();
        self.active_runs.write().await.insert(run_id, token.clone());
        tracing::debug!(run_id = %run_id, "Registered active run");
        token
    }

    /// Forget a finished run
    pub async fn finish_run(&self, run_id: RunId) {
        self.active_runs.write().await.remove(&run_id);
        tracing::debug!(run_id = %run_id, "Run no longer active");
    }

    /// Cancel an active run; returns `false` if the run is not active
    pub async fn cancel_run(&self, run_id: RunId) -> bool {
        match self.active_runs.read().await.get(&run_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(run_id = %run_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Ids of runs currently executing
    pub async fn active_run_ids(&self) -> Vec<RunId> {
        self.active_runs.read().await.keys().copied().collect()
    }
}
