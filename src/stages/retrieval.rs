//! Retrieval stage adapter
//!
//! Asks the knowledge store for the applicant's value of every extracted
//! field. Finding nothing is a valid, successful answer.

use crate::retry::RetryPolicy;
use crate::stages::collaborators::RetrievalBackend;
use crate::stages::error::CollaboratorError;
use crate::stages::result::StageResult;
use crate::stages::types::{CollaboratorStatus, Payload, RetrievalRequest};
use crate::workflow::types::{FieldRecord, RetrievedValue, Stage};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retrieved values keyed by extracted field label
pub type RetrievedData = BTreeMap<String, RetrievedValue>;

/// Adapter between the orchestrator and the retrieval collaborator
#[derive(Clone)]
pub struct RetrievalAdapter {
    backend: Arc<dyn RetrievalBackend>,
    timeout: Duration,
}

impl RetrievalAdapter {
    /// Create an adapter bounding each call by `timeout`
    pub fn new(backend: Arc<dyn RetrievalBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Run the stage under `policy`
    pub async fn execute(
        &self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        user: &str,
        fields: &[FieldRecord],
    ) -> StageResult<RetrievedData> {
        let operation = policy
            .attempt(
                Stage::Retrieval,
                cancel,
                move || self.invoke(user, fields),
                CollaboratorError::classify,
            )
            .await;
        StageResult::from_operation(Stage::Retrieval, operation)
    }

    /// One call to the collaborator
    pub async fn invoke(
        &self,
        user: &str,
        fields: &[FieldRecord],
    ) -> Result<RetrievedData, CollaboratorError> {
        let request = RetrievalRequest {
            user: user.to_string(),
            query_text: build_query(user, fields),
        };

        let response = tokio::time::timeout(self.timeout, self.backend.retrieve(&request))
            .await
            .map_err(|_| {
                CollaboratorError::Timeout(format!(
                    "retrieval did not answer within {}s",
                    self.timeout.as_secs_f64()
                ))
            })??;

        match (response.status, response.response) {
            (CollaboratorStatus::Success, Payload::Data(values)) => {
                let data = match_values(fields, values);
                tracing::info!(
                    user = %user,
                    requested = fields.len(),
                    matched = data.len(),
                    "Retrieved applicant data"
                );
                Ok(data)
            }
            (CollaboratorStatus::Success, Payload::Message(text)) => {
                tracing::debug!(user = %user, answer = %text, "Retrieval answered without data");
                Ok(RetrievedData::new())
            }
            (CollaboratorStatus::Error, Payload::Message(message)) => {
                Err(CollaboratorError::from_message(&message))
            }
            (CollaboratorStatus::Error, Payload::Data(_)) => Err(CollaboratorError::Rejected(
                "retrieval reported an error without a message".to_string(),
            )),
        }
    }
}

/// Query text naming the user and every requested field label
pub fn build_query(user: &str, fields: &[FieldRecord]) -> String {
    let labels: Vec<&str> = fields.iter().map(|f| f.label.as_str()).collect();
    format!(
        "Retrieve the following information for user '{}': {}",
        user,
        labels.join(", ")
    )
}

/// Attach collaborator values to extracted labels
///
/// Exact label matches win over case-insensitive ones; keys that match no
/// extracted field are dropped.
fn match_values(fields: &[FieldRecord], values: Map<String, Value>) -> RetrievedData {
    let mut data = RetrievedData::new();
    let mut loose = Vec::new();

    for (key, raw) in values {
        let key = key.trim().to_string();
        if fields.iter().any(|f| f.label == key) {
            data.insert(key.clone(), to_retrieved(key, raw));
        } else {
            loose.push((key, raw));
        }
    }

    for (key, raw) in loose {
        let Some(field) = fields
            .iter()
            .find(|f| f.label.eq_ignore_ascii_case(&key))
        else {
            tracing::debug!(label = %key, "Dropping retrieved value for unknown field");
            continue;
        };
        if !data.contains_key(&field.label) {
            data.insert(field.label.clone(), to_retrieved(field.label.clone(), raw));
        }
    }
    data
}

fn to_retrieved(label: String, raw: Value) -> RetrievedValue {
    match raw {
        Value::Object(mut object) => {
            let value = object.remove("value").and_then(scalar_text);
            let note = object
                .remove("source")
                .or_else(|| object.remove("confidence"))
                .and_then(scalar_text);
            RetrievedValue { label, value, note }
        }
        other => RetrievedValue {
            label,
            value: scalar_text(other),
            note: None,
        },
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.into_iter().filter_map(scalar_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::types::RetrievalResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedRetrieval {
        response: Result<RetrievalResponse, CollaboratorError>,
        seen: Mutex<Vec<RetrievalRequest>>,
    }

    #[async_trait]
    impl RetrievalBackend for FixedRetrieval {
        async fn retrieve(
            &self,
            request: &RetrievalRequest,
        ) -> Result<RetrievalResponse, CollaboratorError> {
            self.seen.lock().unwrap().push(request.clone());
            self.response.clone()
        }
    }

    fn adapter(response: Result<RetrievalResponse, CollaboratorError>) -> (RetrievalAdapter, Arc<FixedRetrieval>) {
        let backend = Arc::new(FixedRetrieval {
            response,
            seen: Mutex::new(Vec::new()),
        });
        (
            RetrievalAdapter::new(backend.clone(), Duration::from_secs(5)),
            backend,
        )
    }

    fn data(value: Value) -> RetrievalResponse {
        RetrievalResponse {
            status: CollaboratorStatus::Success,
            response: Payload::Data(value.as_object().cloned().unwrap()),
        }
    }

    fn fields() -> Vec<FieldRecord> {
        vec![
            FieldRecord::new("Full Name"),
            FieldRecord::new("Email"),
            FieldRecord::new("Years of Experience"),
        ]
    }

    #[test]
    fn test_query_lists_every_label() {
        let query = build_query("alice", &fields());
        assert!(query.contains("'alice'"));
        assert!(query.contains("Full Name, Email, Years of Experience"));
    }

    #[tokio::test]
    async fn test_values_are_matched_and_normalized() {
        let (adapter, backend) = adapter(Ok(data(json!({
            "Full Name": "Alice Smith",
            "email": {"value": "alice@example.com", "source": "resume.pdf"},
            "Years of Experience": 7,
            "Favourite Colour": "blue"
        }))));

        let result = adapter.invoke("alice", &fields()).await.unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result["Full Name"].value.as_deref(), Some("Alice Smith"));
        assert_eq!(result["Email"].value.as_deref(), Some("alice@example.com"));
        assert_eq!(result["Email"].note.as_deref(), Some("resume.pdf"));
        assert_eq!(result["Years of Experience"].value.as_deref(), Some("7"));
        assert!(!result.contains_key("Favourite Colour"));
        assert_eq!(backend.seen.lock().unwrap()[0].user, "alice");
    }

    #[tokio::test]
    async fn test_exact_match_wins_over_case_insensitive() {
        let (adapter, _) = adapter(Ok(data(json!({
            "EMAIL": "loose@example.com",
            "Email": "exact@example.com"
        }))));

        let result = adapter.invoke("alice", &fields()).await.unwrap();
        assert_eq!(result["Email"].value.as_deref(), Some("exact@example.com"));
    }

    #[tokio::test]
    async fn test_empty_result_is_success() {
        let (adapter, _) = adapter(Ok(data(json!({}))));
        let result = adapter
            .execute(
                &RetryPolicy::default(),
                &CancellationToken::new(),
                "alice",
                &fields(),
            )
            .await;

        assert!(result.ok);
        assert!(result.data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_null_value_is_absent() {
        let (adapter, _) = adapter(Ok(data(json!({"Full Name": null}))));
        let result = adapter.invoke("alice", &fields()).await.unwrap();
        assert_eq!(result["Full Name"].value, None);
    }

    #[tokio::test]
    async fn test_error_status_is_classified() {
        let (adapter, _) = adapter(Ok(RetrievalResponse {
            status: CollaboratorStatus::Error,
            response: Payload::Message("corpus not found for user".to_string()),
        }));
        let error = adapter.invoke("alice", &fields()).await.unwrap_err();
        assert!(matches!(error, CollaboratorError::Rejected(_)));
    }
}
