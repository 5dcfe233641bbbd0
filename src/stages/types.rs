//! Collaborator wire types
//!
//! Structs that mirror the JSON exchanged with the extraction, retrieval
//! and filling collaborators. Every response carries a `status` and a
//! `response` that is either the stage payload or an error message.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Top-level status reported by a collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorStatus {
    /// The call succeeded and `response` holds the payload
    Success,
    /// The call failed and `response` holds an error message
    Error,
}

/// Either the stage payload or an error message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload<T> {
    /// Stage data
    Data(T),
    /// Error message (or an unexpected plain-text answer)
    Message(String),
}

/// Extraction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// Page to inspect
    pub url: String,
}

/// One discovered field as reported by the collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldEntry {
    /// Plain label
    Label(String),
    /// Label with optional hints
    Detailed {
        /// Visible label
        #[serde(alias = "name", alias = "field")]
        label: String,
        /// Input type hint
        #[serde(default, alias = "type")]
        input_type: Option<String>,
        /// Required flag, when known
        #[serde(default)]
        required: Option<bool>,
    },
}

/// Extraction response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    /// Outcome of the call
    pub status: CollaboratorStatus,
    /// Discovered fields or error message
    pub response: Payload<Vec<FieldEntry>>,
    /// Page that was inspected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Retrieval request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// User whose data is requested
    pub user: String,
    /// Natural-language query enumerating the requested field labels
    pub query_text: String,
}

/// Retrieval response
///
/// Values may be strings, numbers, booleans, `null`, or objects carrying a
/// `value` plus an optional `source`/`confidence` note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResponse {
    /// Outcome of the call
    pub status: CollaboratorStatus,
    /// Field label to value mapping or error message
    pub response: Payload<Map<String, Value>>,
}

/// Filling request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillingRequest {
    /// Page holding the form
    pub url: String,
    /// Field label to value mapping (only fields with data)
    pub data: BTreeMap<String, String>,
}

/// A field the collaborator reports as filled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledEntry {
    /// Field label
    pub field: String,
    /// Value written
    #[serde(default)]
    pub value: String,
}

/// A field the collaborator reports as unfilled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnfilledEntry {
    /// Plain label
    Label(String),
    /// Label with a reason code
    Detailed {
        /// Field label
        field: String,
        /// Reason code (`no_data`, `element_not_found`, `timeout`, `other`)
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Filling payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FillingPayload {
    /// Filled fields
    #[serde(default)]
    pub filled_fields: Vec<FilledEntry>,
    /// Unfilled fields
    #[serde(default)]
    pub unfilled_fields: Vec<UnfilledEntry>,
}

/// Filling response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillingResponse {
    /// Outcome of the call
    pub status: CollaboratorStatus,
    /// Filling payload or error message
    pub response: Payload<FillingPayload>,
}
