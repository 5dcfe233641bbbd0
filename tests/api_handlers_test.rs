//! Integration tests for the HTTP handlers
//!
//! Handlers are called directly with axum extractors; collaborators are
//! in-process fakes.

use async_trait::async_trait;
use axum::{
    body::to_bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use job_application_backend::api::{self, constants::RUN_ID_HEADER, ApplyRequest};
use job_application_backend::error::AppError;
use job_application_backend::session::{InMemorySessionStore, SessionKey};
use job_application_backend::stages::types::{
    CollaboratorStatus, ExtractionRequest, ExtractionResponse, FieldEntry, FilledEntry,
    FillingPayload, FillingRequest, FillingResponse, Payload, RetrievalRequest, RetrievalResponse,
};
use job_application_backend::stages::{
    AutomationChannel, CollaboratorError, ExtractionBackend, FillingBackend, LocalChannelProvider,
    RetrievalBackend,
};
use job_application_backend::state::AppState;
use job_application_backend::workflow::{
    Collaborators, FinalReport, Orchestrator, OrchestratorConfig, RunStatus,
};
use std::sync::Arc;

/// Finds "Full Name" and "Email", knows only the name, fills what it gets
struct Applicant;

#[async_trait]
impl ExtractionBackend for Applicant {
    async fn extract(
        &self,
        _channel: &AutomationChannel,
        _request: &ExtractionRequest,
    ) -> Result<ExtractionResponse, CollaboratorError> {
        Ok(ExtractionResponse {
            status: CollaboratorStatus::Success,
            response: Payload::Data(vec![
                FieldEntry::Label("Full Name".to_string()),
                FieldEntry::Label("Email".to_string()),
            ]),
            url: None,
        })
    }
}

#[async_trait]
impl RetrievalBackend for Applicant {
    async fn retrieve(
        &self,
        _request: &RetrievalRequest,
    ) -> Result<RetrievalResponse, CollaboratorError> {
        let mut map = serde_json::Map::new();
        map.insert("Full Name".to_string(), "Alice Smith".into());
        Ok(RetrievalResponse {
            status: CollaboratorStatus::Success,
            response: Payload::Data(map),
        })
    }
}

#[async_trait]
impl FillingBackend for Applicant {
    async fn fill(
        &self,
        _channel: &AutomationChannel,
        request: &FillingRequest,
    ) -> Result<FillingResponse, CollaboratorError> {
        Ok(FillingResponse {
            status: CollaboratorStatus::Success,
            response: Payload::Data(FillingPayload {
                filled_fields: request
                    .data
                    .iter()
                    .map(|(field, value)| FilledEntry {
                        field: field.clone(),
                        value: value.clone(),
                    })
                    .collect(),
                unfilled_fields: Vec::new(),
            }),
        })
    }
}

fn create_test_state() -> Arc<AppState> {
    let applicant = Arc::new(Applicant);
    let orchestrator = Orchestrator::new(
        Collaborators {
            extraction: applicant.clone(),
            retrieval: applicant.clone(),
            filling: applicant,
            channels: Arc::new(LocalChannelProvider::new()),
        },
        Arc::new(InMemorySessionStore::new()),
        OrchestratorConfig::default(),
    )
    .unwrap();
    Arc::new(AppState::new(Arc::new(orchestrator)))
}

fn alice() -> ApplyRequest {
    ApplyRequest::Text {
        request: "Apply for alice: https://example.com/apply".to_string(),
    }
}

#[tokio::test]
async fn test_apply_returns_report_and_run_id() {
    let state = create_test_state();

    let response = api::apply(State(state.clone()), Json(alice()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let run_id = response
        .headers()
        .get(RUN_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap();

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let report: FinalReport = serde_json::from_slice(&body).unwrap();
    assert_eq!(report.status, RunStatus::Partial);
    assert_eq!(report.metadata.total_fields, 2);
    assert_eq!(report.metadata.filled_count, 1);

    // Finished runs are no longer active but their state is inspectable
    assert!(state.active_run_ids().await.is_empty());
    let Json(snapshot) = api::get_run(State(state.clone()), Path(run_id.clone()))
        .await
        .unwrap();
    assert!(!snapshot.active);
    assert_eq!(
        snapshot.entries.get(&SessionKey::Status),
        Some(&serde_json::json!("partial"))
    );

    let Json(purged) = api::delete_run(State(state.clone()), Path(run_id.clone()))
        .await
        .unwrap();
    assert_eq!(purged.removed, snapshot.entries.len());

    let gone = api::get_run(State(state), Path(run_id)).await;
    assert!(matches!(gone, Err(AppError::RunNotFound(_))));
}

#[tokio::test]
async fn test_apply_with_invalid_request_still_returns_report() {
    let state = create_test_state();

    let response = api::apply(
        State(state),
        Json(ApplyRequest::Structured {
            user: String::new(),
            url: "not a url".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let report: FinalReport = serde_json::from_slice(&body).unwrap();
    assert_eq!(report.status, RunStatus::Error);
    assert_eq!(report.response.errors.len(), 2);
}

#[tokio::test]
async fn test_apply_stream_emits_progress_report_and_done() {
    let state = create_test_state();

    let response = api::apply_stream(State(state), Json(alice()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    assert!(response.headers().contains_key(RUN_ID_HEADER));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    let events: Vec<&str> = text
        .split("\n\n")
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| chunk.trim_start_matches("data: "))
        .collect();

    assert_eq!(events.last(), Some(&"[DONE]"));
    let report: FinalReport = serde_json::from_str(events[events.len() - 2]).unwrap();
    assert_eq!(report.status, RunStatus::Partial);

    let states: Vec<String> = events[..events.len() - 2]
        .iter()
        .map(|event| {
            let value: serde_json::Value = serde_json::from_str(event).unwrap();
            value["state"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(
        states,
        vec![
            "CAPTURING_INPUT",
            "EXTRACTING",
            "RETRIEVING",
            "FILLING",
            "FINALIZED"
        ]
    );
}

#[tokio::test]
async fn test_cancel_unknown_run_is_not_found() {
    let state = create_test_state();
    let result = api::cancel_run(
        State(state),
        Path("6f1c1f0e-2b7a-4a55-9d0e-3f4f1c1f0e2b".to_string()),
    )
    .await;

    let error = result.unwrap_err();
    assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
}
