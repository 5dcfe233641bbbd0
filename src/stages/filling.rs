//! Filling stage adapter
//!
//! Writes retrieved values into the form. Individual fields that cannot be
//! filled are per-field outcomes; the stage only fails when the external
//! call itself does not complete.

use crate::retry::RetryPolicy;
use crate::stages::channel::AutomationChannel;
use crate::stages::collaborators::FillingBackend;
use crate::stages::error::CollaboratorError;
use crate::stages::result::StageResult;
use crate::stages::types::{CollaboratorStatus, FillingPayload, FillingRequest, Payload, UnfilledEntry};
use crate::workflow::types::{FillOutcome, FillReason, Stage};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Adapter between the orchestrator and the filling collaborator
#[derive(Clone)]
pub struct FillingAdapter {
    backend: Arc<dyn FillingBackend>,
    timeout: Duration,
}

impl FillingAdapter {
    /// Create an adapter bounding each call by `timeout`
    pub fn new(backend: Arc<dyn FillingBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Run the stage under `policy`
    pub async fn execute(
        &self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        channel: &AutomationChannel,
        url: &str,
        data: &BTreeMap<String, String>,
    ) -> StageResult<Vec<FillOutcome>> {
        let operation = policy
            .attempt(
                Stage::Filling,
                cancel,
                move || self.invoke(channel, url, data),
                CollaboratorError::classify,
            )
            .await;
        StageResult::from_operation(Stage::Filling, operation)
    }

    /// One call to the collaborator
    pub async fn invoke(
        &self,
        channel: &AutomationChannel,
        url: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<Vec<FillOutcome>, CollaboratorError> {
        let request = FillingRequest {
            url: url.to_string(),
            data: data.clone(),
        };
        tracing::debug!(url = %url, channel = %channel, fields = data.len(), "Submitting form data");

        let response = tokio::time::timeout(self.timeout, self.backend.fill(channel, &request))
            .await
            .map_err(|_| {
                CollaboratorError::Timeout(format!(
                    "form filling did not complete within {}s",
                    self.timeout.as_secs_f64()
                ))
            })??;

        match (response.status, response.response) {
            (CollaboratorStatus::Success, Payload::Data(payload)) => {
                let outcomes = collect_outcomes(payload, data);
                tracing::info!(
                    url = %url,
                    filled = outcomes.iter().filter(|o| o.filled).count(),
                    attempted = outcomes.len(),
                    "Form filling completed"
                );
                Ok(outcomes)
            }
            (CollaboratorStatus::Success, Payload::Message(text)) => Err(
                CollaboratorError::Protocol(format!("expected filled/unfilled lists, got: {}", text)),
            ),
            (CollaboratorStatus::Error, Payload::Message(message)) => {
                Err(CollaboratorError::from_message(&message))
            }
            (CollaboratorStatus::Error, Payload::Data(_)) => Err(CollaboratorError::Rejected(
                "filling reported an error without a message".to_string(),
            )),
        }
    }
}

/// One outcome per reported or submitted field
///
/// A field reported filled wins over the same field reported unfilled.
/// Submitted fields the collaborator never mentions count as unfilled with
/// reason `other`.
fn collect_outcomes(payload: FillingPayload, data: &BTreeMap<String, String>) -> Vec<FillOutcome> {
    let mut seen = HashSet::new();
    let mut outcomes = Vec::new();

    for entry in payload.filled_fields {
        let label = entry.field.trim().to_string();
        if label.is_empty() || !seen.insert(label.clone()) {
            continue;
        }
        let value = if entry.value.is_empty() {
            data.get(&label).cloned().unwrap_or_default()
        } else {
            entry.value
        };
        outcomes.push(FillOutcome::filled(label, value));
    }

    for entry in payload.unfilled_fields {
        let (label, reason) = match entry {
            UnfilledEntry::Label(label) => (label, None),
            UnfilledEntry::Detailed { field, reason } => (field, reason),
        };
        let label = label.trim().to_string();
        if label.is_empty() || !seen.insert(label.clone()) {
            continue;
        }
        let reason = match reason {
            Some(code) => FillReason::parse(&code),
            None if data.contains_key(&label) => FillReason::ElementNotFound,
            None => FillReason::NoData,
        };
        outcomes.push(FillOutcome::unfilled(label, reason));
    }

    for label in data.keys() {
        if seen.insert(label.clone()) {
            tracing::warn!(field = %label, "Filling collaborator did not report submitted field");
            outcomes.push(FillOutcome::unfilled(label.clone(), FillReason::Other));
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::types::{FilledEntry, FillingResponse};
    use crate::workflow::types::RunId;
    use async_trait::async_trait;

    struct FixedFilling(Result<FillingResponse, CollaboratorError>);

    #[async_trait]
    impl FillingBackend for FixedFilling {
        async fn fill(
            &self,
            _channel: &AutomationChannel,
            _request: &FillingRequest,
        ) -> Result<FillingResponse, CollaboratorError> {
            self.0.clone()
        }
    }

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_unfilled_fields_are_outcomes_not_failures() {
        let backend = FixedFilling(Ok(FillingResponse {
            status: CollaboratorStatus::Success,
            response: Payload::Data(FillingPayload {
                filled_fields: vec![FilledEntry {
                    field: "Full Name".to_string(),
                    value: "Alice Smith".to_string(),
                }],
                unfilled_fields: vec![
                    UnfilledEntry::Label("Email".to_string()),
                    UnfilledEntry::Label("Phone".to_string()),
                    UnfilledEntry::Detailed {
                        field: "Resume".to_string(),
                        reason: Some("timeout".to_string()),
                    },
                ],
            }),
        }));
        let adapter = FillingAdapter::new(Arc::new(backend), Duration::from_secs(5));
        let channel = AutomationChannel::new("c", RunId::new());

        let result = adapter
            .execute(
                &RetryPolicy::default(),
                &CancellationToken::new(),
                &channel,
                "https://example.com/apply",
                &data(&[("Full Name", "Alice Smith"), ("Phone", "555-0100")]),
            )
            .await;

        assert!(result.ok);
        let outcomes = result.data.unwrap();
        assert_eq!(outcomes[0], FillOutcome::filled("Full Name", "Alice Smith"));
        assert_eq!(outcomes[1], FillOutcome::unfilled("Email", FillReason::NoData));
        assert_eq!(
            outcomes[2],
            FillOutcome::unfilled("Phone", FillReason::ElementNotFound)
        );
        assert_eq!(outcomes[3], FillOutcome::unfilled("Resume", FillReason::Timeout));
    }

    #[test]
    fn test_unreported_and_empty_values() {
        let payload = FillingPayload {
            filled_fields: vec![FilledEntry {
                field: "Full Name".to_string(),
                value: String::new(),
            }],
            unfilled_fields: Vec::new(),
        };
        let outcomes = collect_outcomes(
            payload,
            &data(&[("Full Name", "Alice Smith"), ("Email", "alice@example.com")]),
        );

        assert_eq!(outcomes[0], FillOutcome::filled("Full Name", "Alice Smith"));
        assert_eq!(outcomes[1], FillOutcome::unfilled("Email", FillReason::Other));
    }

    #[tokio::test]
    async fn test_error_status_fails_the_stage() {
        let backend = FixedFilling(Ok(FillingResponse {
            status: CollaboratorStatus::Error,
            response: Payload::Message("Form requires login".to_string()),
        }));
        let adapter = FillingAdapter::new(Arc::new(backend), Duration::from_secs(5));
        let channel = AutomationChannel::new("c", RunId::new());

        let result = adapter
            .execute(
                &RetryPolicy::default(),
                &CancellationToken::new(),
                &channel,
                "https://example.com/apply",
                &BTreeMap::new(),
            )
            .await;

        assert!(!result.ok);
        assert!(result.error.unwrap().contains("filling failed"));
    }
}
