//! Extraction stage adapter
//!
//! Discovers the form fields on the target page. Navigation timeouts and
//! page-load failures are transient; malformed targets are fatal.

use crate::retry::RetryPolicy;
use crate::stages::channel::AutomationChannel;
use crate::stages::collaborators::ExtractionBackend;
use crate::stages::error::CollaboratorError;
use crate::stages::result::StageResult;
use crate::stages::types::{CollaboratorStatus, ExtractionRequest, FieldEntry, Payload};
use crate::workflow::types::{FieldRecord, Stage};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Adapter between the orchestrator and the extraction collaborator
#[derive(Clone)]
pub struct ExtractionAdapter {
    backend: Arc<dyn ExtractionBackend>,
    timeout: Duration,
}

impl ExtractionAdapter {
    /// Create an adapter bounding each call by `timeout`
    pub fn new(backend: Arc<dyn ExtractionBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Run the stage under `policy`
    pub async fn execute(
        &self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        channel: &AutomationChannel,
        url: &str,
    ) -> StageResult<Vec<FieldRecord>> {
        let operation = policy
            .attempt(
                Stage::Extraction,
                cancel,
                move || self.invoke(channel, url),
                CollaboratorError::classify,
            )
            .await;
        StageResult::from_operation(Stage::Extraction, operation)
    }

    /// One call to the collaborator
    pub async fn invoke(
        &self,
        channel: &AutomationChannel,
        url: &str,
    ) -> Result<Vec<FieldRecord>, CollaboratorError> {
        check_target(url)?;

        let request = ExtractionRequest {
            url: url.to_string(),
        };
        tracing::debug!(url = %url, channel = %channel, "Requesting form fields");

        let response = tokio::time::timeout(self.timeout, self.backend.extract(channel, &request))
            .await
            .map_err(|_| {
                CollaboratorError::Timeout(format!(
                    "page did not load within {}s",
                    self.timeout.as_secs_f64()
                ))
            })??;

        match (response.status, response.response) {
            (CollaboratorStatus::Success, Payload::Data(entries)) => {
                let fields = normalize_fields(entries);
                tracing::info!(url = %url, field_count = fields.len(), "Extracted form fields");
                Ok(fields)
            }
            (CollaboratorStatus::Success, Payload::Message(text)) => Err(
                CollaboratorError::Protocol(format!("expected a field list, got: {}", text)),
            ),
            (CollaboratorStatus::Error, Payload::Message(message)) => {
                Err(CollaboratorError::from_message(&message))
            }
            (CollaboratorStatus::Error, Payload::Data(_)) => Err(CollaboratorError::Rejected(
                "extraction reported an error without a message".to_string(),
            )),
        }
    }
}

/// Reject anything that is not an absolute http(s) URL with a host
fn check_target(url: &str) -> Result<(), CollaboratorError> {
    let parsed = Url::parse(url)
        .map_err(|e| CollaboratorError::InvalidTarget(format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(CollaboratorError::InvalidTarget(url.to_string()));
    }
    Ok(())
}

/// Trim labels, drop empty ones, keep the first of any duplicates
fn normalize_fields(entries: Vec<FieldEntry>) -> Vec<FieldRecord> {
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(entries.len());

    for entry in entries {
        let record = match entry {
            FieldEntry::Label(label) => FieldRecord::new(label.trim()),
            FieldEntry::Detailed {
                label,
                input_type,
                required,
            } => FieldRecord {
                label: label.trim().to_string(),
                input_type: input_type
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
                required,
            },
        };
        if record.label.is_empty() || !seen.insert(record.label.clone()) {
            continue;
        }
        fields.push(record);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::types::ExtractionResponse;
    use crate::workflow::types::RunId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedExtraction {
        responses: Mutex<Vec<Result<ExtractionResponse, CollaboratorError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedExtraction {
        fn new(responses: Vec<Result<ExtractionResponse, CollaboratorError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ExtractionBackend for ScriptedExtraction {
        async fn extract(
            &self,
            _channel: &AutomationChannel,
            _request: &ExtractionRequest,
        ) -> Result<ExtractionResponse, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().remove(0)
        }
    }

    struct SlowExtraction;

    #[async_trait]
    impl ExtractionBackend for SlowExtraction {
        async fn extract(
            &self,
            _channel: &AutomationChannel,
            _request: &ExtractionRequest,
        ) -> Result<ExtractionResponse, CollaboratorError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(CollaboratorError::Rejected("unreachable".to_string()))
        }
    }

    fn fields(labels: &[&str]) -> ExtractionResponse {
        ExtractionResponse {
            status: CollaboratorStatus::Success,
            response: Payload::Data(
                labels
                    .iter()
                    .map(|l| FieldEntry::Label(l.to_string()))
                    .collect(),
            ),
            url: None,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, 2, Duration::from_millis(1)).unwrap()
    }

    fn channel() -> AutomationChannel {
        AutomationChannel::new("test-channel", RunId::new())
    }

    #[tokio::test]
    async fn test_labels_are_trimmed_and_deduplicated() {
        let backend = ScriptedExtraction::new(vec![Ok(fields(&[
            " Full Name ",
            "Email",
            "",
            "Email",
            "Phone",
        ]))]);
        let adapter = ExtractionAdapter::new(backend, Duration::from_secs(5));

        let result = adapter
            .invoke(&channel(), "https://example.com/apply")
            .await
            .unwrap();
        let labels: Vec<&str> = result.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["Full Name", "Email", "Phone"]);
    }

    #[tokio::test]
    async fn test_malformed_url_fails_without_calling_backend() {
        let backend = ScriptedExtraction::new(Vec::new());
        let adapter = ExtractionAdapter::new(backend.clone(), Duration::from_secs(5));

        let result = adapter
            .execute(&fast_policy(), &CancellationToken::new(), &channel(), "not a url")
            .await;

        assert!(!result.ok);
        assert_eq!(result.attempts, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(result.error.unwrap().contains("invalid target"));
    }

    #[tokio::test]
    async fn test_page_load_failure_is_retried() {
        let backend = ScriptedExtraction::new(vec![
            Ok(ExtractionResponse {
                status: CollaboratorStatus::Error,
                response: Payload::Message("net::ERR_CONNECTION_RESET".to_string()),
                url: None,
            }),
            Ok(fields(&["Full Name", "Email"])),
        ]);
        let adapter = ExtractionAdapter::new(backend.clone(), Duration::from_secs(5));

        let result = adapter
            .execute(
                &fast_policy(),
                &CancellationToken::new(),
                &channel(),
                "https://example.com/apply",
            )
            .await;

        assert!(result.ok);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.data.unwrap().len(), 2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejection_stops_after_one_call() {
        let backend = ScriptedExtraction::new(vec![Ok(ExtractionResponse {
            status: CollaboratorStatus::Error,
            response: Payload::Message("Form requires login".to_string()),
            url: None,
        })]);
        let adapter = ExtractionAdapter::new(backend.clone(), Duration::from_secs(5));

        let result = adapter
            .execute(
                &fast_policy(),
                &CancellationToken::new(),
                &channel(),
                "https://example.com/apply",
            )
            .await;

        assert!(!result.ok);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_page_times_out_as_transient() {
        let adapter = ExtractionAdapter::new(Arc::new(SlowExtraction), Duration::from_millis(10));

        let error = adapter
            .invoke(&channel(), "https://example.com/apply")
            .await
            .unwrap_err();

        assert!(matches!(error, CollaboratorError::Timeout(_)));
        assert_eq!(error.classify(), crate::retry::FailureClass::Transient);
    }
}
