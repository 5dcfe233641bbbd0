//! Run inspection API handlers
//!
//! Read, cancel and purge per-run session state, plus the health and
//! configuration endpoints.

use crate::error::AppError;
use crate::session::SessionKey;
use crate::state::AppState;
use crate::workflow::{OrchestratorConfig, RunId};
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Session snapshot of one run
#[derive(Serialize, Debug)]
pub struct RunSnapshot {
    /// Run identifier
    pub run_id: RunId,
    /// Whether the run is still executing
    pub active: bool,
    /// Every stored entry, keyed by name
    pub entries: BTreeMap<SessionKey, Value>,
}

/// Result of a purge request
#[derive(Serialize, Debug)]
pub struct PurgeResponse {
    /// Run identifier
    pub run_id: RunId,
    /// Number of entries removed
    pub removed: usize,
}

/// Result of a cancel request
#[derive(Serialize, Debug)]
pub struct CancelResponse {
    /// Run identifier
    pub run_id: RunId,
    /// Always `true`; unknown runs answer 404 instead
    pub cancelled: bool,
}

/// Health check response
#[derive(Serialize, Debug)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Number of runs currently executing
    pub active_runs: usize,
}

fn parse_run_id(raw: &str) -> Result<RunId, AppError> {
    raw.parse()
        .map_err(|e| AppError::InvalidRequest(format!("Invalid run id '{}': {}", raw, e)))
}

/// GET /api/health - Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_runs: state.active_run_ids().await.len(),
    })
}

/// GET /api/config - Effective orchestrator configuration
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<OrchestratorConfig> {
    Json(state.orchestrator().config().clone())
}

/// GET /api/runs/:id - Session state of a run
///
/// # Returns
/// * `Ok(Json<RunSnapshot>)` - Stored entries
/// * `Err(AppError)` - Invalid id, unknown run, or store failure
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunSnapshot>, AppError> {
    let run_id = parse_run_id(&id)?;
    let entries = state.store().entries(run_id).await?;
    if entries.is_empty() {
        return Err(AppError::RunNotFound(id));
    }

    let active = state.active_run_ids().await.contains(&run_id);
    Ok(Json(RunSnapshot {
        run_id,
        active,
        entries,
    }))
}

/// DELETE /api/runs/:id - Purge the session state of a finished run
pub async fn delete_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PurgeResponse>, AppError> {
    let run_id = parse_run_id(&id)?;
    if state.active_run_ids().await.contains(&run_id) {
        return Err(AppError::InvalidRequest(format!(
            "Run {} is still active; cancel it first",
            run_id
        )));
    }

    let removed = state.store().purge(run_id).await?;
    tracing::info!(run_id = %run_id, removed, "Purged run state");
    Ok(Json(PurgeResponse { run_id, removed }))
}

/// POST /api/runs/:id/cancel - Request cancellation of an active run
///
/// The run still finalizes and produces an `error` report.
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    let run_id = parse_run_id(&id)?;
    if !state.cancel_run(run_id).await {
        return Err(AppError::RunNotFound(id));
    }
    Ok(Json(CancelResponse {
        run_id,
        cancelled: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionStore;
    use crate::stages::{HttpCollaborator, LocalChannelProvider};
    use crate::workflow::{Collaborators, Orchestrator};

    fn state() -> Arc<AppState> {
        // Never contacted by these tests
        let offline = Arc::new(HttpCollaborator::new("http://127.0.0.1:9"));
        let orchestrator = Orchestrator::new(
            Collaborators {
                extraction: offline.clone(),
                retrieval: offline.clone(),
                filling: offline,
                channels: Arc::new(LocalChannelProvider::new()),
            },
            Arc::new(InMemorySessionStore::new()),
            OrchestratorConfig::default(),
        )
        .unwrap();
        Arc::new(AppState::new(Arc::new(orchestrator)))
    }

    #[tokio::test]
    async fn test_get_run_returns_stored_entries() {
        let state = state();
        let run_id = RunId::new();
        state
            .store()
            .put(run_id, SessionKey::User, serde_json::json!("alice"))
            .await
            .unwrap();

        let Json(snapshot) = get_run(State(state), Path(run_id.to_string()))
            .await
            .unwrap();
        assert_eq!(snapshot.run_id, run_id);
        assert!(!snapshot.active);
        assert_eq!(
            snapshot.entries.get(&SessionKey::User),
            Some(&serde_json::json!("alice"))
        );
    }

    #[tokio::test]
    async fn test_get_run_unknown_and_invalid_ids() {
        let state = state();
        let unknown = get_run(State(state.clone()), Path(RunId::new().to_string())).await;
        assert!(matches!(unknown, Err(AppError::RunNotFound(_))));

        let invalid = get_run(State(state), Path("not-a-uuid".to_string())).await;
        assert!(matches!(invalid, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_delete_run_purges_entries() {
        let state = state();
        let run_id = RunId::new();
        for key in [SessionKey::User, SessionKey::Url] {
            state
                .store()
                .put(run_id, key, serde_json::json!("x"))
                .await
                .unwrap();
        }

        let Json(purged) = delete_run(State(state.clone()), Path(run_id.to_string()))
            .await
            .unwrap();
        assert_eq!(purged.removed, 2);
        assert!(state.store().entries(run_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_run_refuses_active_run() {
        let state = state();
        let run_id = RunId::new();
        state.register_run(run_id).await;

        let result = delete_run(State(state), Path(run_id.to_string())).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_cancel_run() {
        let state = state();
        let run_id = RunId::new();
        let token = state.register_run(run_id).await;

        let Json(response) = cancel_run(State(state.clone()), Path(run_id.to_string()))
            .await
            .unwrap();
        assert!(response.cancelled);
        assert!(token.is_cancelled());

        state.finish_run(run_id).await;
        let again = cancel_run(State(state), Path(run_id.to_string())).await;
        assert!(matches!(again, Err(AppError::RunNotFound(_))));
    }

    #[tokio::test]
    async fn test_health_and_config() {
        let state = state();
        state.register_run(RunId::new()).await;

        let Json(health) = health(State(state.clone())).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.active_runs, 1);

        let Json(config) = get_config(State(state)).await;
        assert_eq!(config, OrchestratorConfig::default());
    }
}
