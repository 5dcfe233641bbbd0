//! Apply API handlers
//!
//! Entry points that start a workflow run. Runs execute on their own task so
//! a client that disconnects mid-run does not leave the run half-finished;
//! only an explicit cancel request stops it early.
//!
//! The streaming variant uses SSE (Server-Sent Events) to push one event
//! per state transition, then the final report, then `[DONE]`.

use crate::api::constants::{RUN_ID_HEADER, SSE_DONE_SIGNAL, SSE_ERROR_PREFIX};
use crate::error::AppError;
use crate::state::AppState;
use crate::workflow::{FinalReport, RunContext, RunId, RunRequest};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Helper function to format a stream into SSE (Server-Sent Events) format
///
/// Takes a stream of `Result<String, axum::Error>` and converts it to SSE format
/// where each item is formatted as "data: <content>\n\n"
fn format_sse_stream(
    stream: impl futures_util::Stream<Item = Result<String, axum::Error>> + Send + 'static,
) -> impl futures_util::Stream<Item = Result<String, std::io::Error>> {
    stream.map(|event_result| {
        let sse_text = match event_result {
            Ok(data) => format!("data: {}\n\n", data),
            Err(e) => format!("data: {} {}\n\n", SSE_ERROR_PREFIX, e),
        };
        Ok::<_, std::io::Error>(sse_text)
    })
}

/// Apply request body: free text or an explicit user and URL
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ApplyRequest {
    /// `{"request": "Apply for alice: https://example.com/apply"}`
    Text {
        /// Free-text request
        request: String,
    },
    /// `{"user": "alice", "url": "https://example.com/apply"}`
    Structured {
        /// User identifier
        user: String,
        /// Target URL
        url: String,
    },
}

impl From<ApplyRequest> for RunRequest {
    fn from(request: ApplyRequest) -> Self {
        match request {
            ApplyRequest::Text { request } => RunRequest::Text(request),
            ApplyRequest::Structured { user, url } => RunRequest::Structured { user, url },
        }
    }
}

/// Register the run and execute it on its own task
async fn spawn_run(
    state: &Arc<AppState>,
    request: ApplyRequest,
    progress: Option<UnboundedSender<crate::workflow::ProgressEvent>>,
) -> (RunId, JoinHandle<FinalReport>) {
    let run_id = RunId::new();
    let cancel = state.register_run(run_id).await;

    let mut ctx = RunContext::new().with_run_id(run_id).with_cancel(cancel);
    if let Some(progress) = progress {
        ctx = ctx.with_progress(progress);
    }

    let state = state.clone();
    let handle = tokio::spawn(async move {
        let report = state
            .orchestrator()
            .run_with(RunRequest::from(request), ctx)
            .await;
        state.finish_run(run_id).await;
        report
    });
    (run_id, handle)
}

/// POST /api/apply - Run the workflow and return the final report
///
/// # Arguments
/// * `State(state)` - Application state
/// * `Json(request)` - Free-text or structured apply request
///
/// # Returns
/// * `Ok(Response)` - The FinalReport as JSON, with the run id in `x-run-id`
/// * `Err(AppError)` - If the run task panicked
pub async fn apply(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ApplyRequest>,
) -> Result<Response, AppError> {
    let (run_id, handle) = spawn_run(&state, request, None).await;
    tracing::info!(run_id = %run_id, "Apply request accepted");

    let report = handle
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Run task failed: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(RUN_ID_HEADER, run_id.to_string())],
        Json(report),
    )
        .into_response())
}

/// POST /api/apply/stream - Run the workflow, streaming progress via SSE
///
/// Emits one JSON event per state transition, then the FinalReport, then
/// `[DONE]`.
///
/// # Returns
/// * `Ok(Response)` - SSE stream
/// * `Err(AppError)` - If the response could not be built
pub async fn apply_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ApplyRequest>,
) -> Result<Response, AppError> {
    use async_stream::stream;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let (run_id, handle) = spawn_run(&state, request, Some(tx)).await;
    tracing::info!(run_id = %run_id, "Streaming apply request accepted");

    let stream = stream! {
        // The sender lives in the run context, so this ends when the run does
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok::<String, axum::Error>(json),
                Err(e) => yield Ok::<String, axum::Error>(format!("{} {}", SSE_ERROR_PREFIX, e)),
            }
        }

        match handle.await {
            Ok(report) => match serde_json::to_string(&report) {
                Ok(json) => yield Ok::<String, axum::Error>(json),
                Err(e) => yield Ok::<String, axum::Error>(format!("{} {}", SSE_ERROR_PREFIX, e)),
            },
            Err(e) => {
                yield Ok::<String, axum::Error>(format!("{} Run task failed: {}", SSE_ERROR_PREFIX, e));
            }
        }
        yield Ok::<String, axum::Error>(SSE_DONE_SIGNAL.to_string());
    };

    // Convert stream to SSE format
    let sse_stream = format_sse_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header(RUN_ID_HEADER, run_id.to_string())
        .body(Body::from_stream(sse_stream))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_request_accepts_both_shapes() {
        let text: ApplyRequest =
            serde_json::from_str(r#"{"request": "Apply for alice: https://example.com/apply"}"#)
                .unwrap();
        assert_eq!(
            RunRequest::from(text),
            RunRequest::Text("Apply for alice: https://example.com/apply".to_string())
        );

        let structured: ApplyRequest =
            serde_json::from_str(r#"{"user": "alice", "url": "https://example.com/apply"}"#)
                .unwrap();
        assert_eq!(
            RunRequest::from(structured),
            RunRequest::Structured {
                user: "alice".to_string(),
                url: "https://example.com/apply".to_string()
            }
        );
    }

    #[test]
    fn test_apply_request_rejects_unknown_shape() {
        assert!(serde_json::from_str::<ApplyRequest>(r#"{"goal": "x"}"#).is_err());
    }

    #[tokio::test]
    async fn test_sse_formatting() {
        let events = futures_util::stream::iter(vec![
            Ok::<String, axum::Error>("{\"state\":\"EXTRACTING\"}".to_string()),
            Ok(SSE_DONE_SIGNAL.to_string()),
        ]);
        let formatted: Vec<String> = format_sse_stream(events)
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(formatted[0], "data: {\"state\":\"EXTRACTING\"}\n\n");
        assert_eq!(formatted[1], "data: [DONE]\n\n");
    }
}
