//! Workflow data model
//!
//! Types shared by the orchestrator, the stage adapters and the result
//! aggregator: run identity, the run state machine, and the per-field
//! records produced by each stage.

use crate::workflow::error::TransitionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generate a new random run identifier (UUID v4)
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Position of a run in the orchestration state machine
///
/// `Init` is the only initial state and `Finalized` the only terminal one.
/// States are strictly ordered and none is ever re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    /// Run accepted, nothing done yet
    Init,
    /// Parsing user identifier and URL from the request
    CapturingInput,
    /// Discovering form fields
    Extracting,
    /// Looking up applicant data for the discovered fields
    Retrieving,
    /// Writing retrieved data into the form
    Filling,
    /// Final status set, report built
    Finalized,
}

impl WorkflowState {
    /// Stable uppercase name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Init => "INIT",
            WorkflowState::CapturingInput => "CAPTURING_INPUT",
            WorkflowState::Extracting => "EXTRACTING",
            WorkflowState::Retrieving => "RETRIEVING",
            WorkflowState::Filling => "FILLING",
            WorkflowState::Finalized => "FINALIZED",
        }
    }

    fn ordinal(self) -> u8 {
        match self {
            WorkflowState::Init => 0,
            WorkflowState::CapturingInput => 1,
            WorkflowState::Extracting => 2,
            WorkflowState::Retrieving => 3,
            WorkflowState::Filling => 4,
            WorkflowState::Finalized => 5,
        }
    }

    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// Every non-initial state may jump straight to `Finalized` (abort paths);
    /// otherwise only the immediate successor is reachable.
    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        match (self, next) {
            (WorkflowState::Finalized, _) => false,
            (WorkflowState::Init, WorkflowState::Finalized) => false,
            (_, WorkflowState::Finalized) => true,
            _ => next.ordinal() == self.ordinal() + 1,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every extracted field was filled
    Success,
    /// Run completed but at least one field is unfilled
    Partial,
    /// Run aborted (validation, extraction, filling or cancellation)
    Error,
}

impl RunStatus {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three external stages a run delegates to collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Form field discovery
    Extraction,
    /// Applicant data lookup
    Retrieval,
    /// Form filling
    Filling,
}

impl Stage {
    /// Lowercase name of the stage
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Retrieval => "retrieval",
            Stage::Filling => "filling",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of the pipeline
///
/// Mutated only by the orchestrator; becomes immutable once a final status is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRun {
    id: RunId,
    user: String,
    url: String,
    state: WorkflowState,
    status: Option<RunStatus>,
}

impl WorkflowRun {
    /// Create a run in the `Init` state
    pub fn new(id: RunId) -> Self {
        Self {
            id,
            user: String::new(),
            url: String::new(),
            state: WorkflowState::Init,
            status: None,
        }
    }

    /// Run identifier
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Captured user identifier (empty until captured)
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Captured target URL (empty until captured)
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current state machine position
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Final status, `None` while the run is still in progress
    pub fn status(&self) -> Option<RunStatus> {
        self.status
    }

    /// Record the captured user identifier and URL
    pub fn capture(&mut self, user: &str, url: &str) -> Result<(), TransitionError> {
        if self.state != WorkflowState::CapturingInput {
            return Err(TransitionError::NotCapturing(self.state));
        }
        self.user = user.to_string();
        self.url = url.to_string();
        Ok(())
    }

    /// Move to the next state
    pub fn advance(&mut self, next: WorkflowState) -> Result<(), TransitionError> {
        if self.status.is_some() {
            return Err(TransitionError::AlreadyFinalized);
        }
        if next == WorkflowState::Finalized {
            return Err(TransitionError::MissingStatus);
        }
        if !self.state.can_transition_to(next) {
            return Err(TransitionError::Invalid {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Enter `Finalized` with the given status
    pub fn finalize(&mut self, status: RunStatus) -> Result<(), TransitionError> {
        if self.status.is_some() {
            return Err(TransitionError::AlreadyFinalized);
        }
        if !self.state.can_transition_to(WorkflowState::Finalized) {
            return Err(TransitionError::Invalid {
                from: self.state,
                to: WorkflowState::Finalized,
            });
        }
        self.state = WorkflowState::Finalized;
        self.status = Some(status);
        Ok(())
    }
}

/// One form field discovered during extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRecord {
    /// Visible label of the field
    pub label: String,
    /// Input type hint (e.g. "email", "file"), if the collaborator reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    /// Whether the field is required; `None` when unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl FieldRecord {
    /// Field with only a label
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            input_type: None,
            required: None,
        }
    }
}

/// Retrieval result for one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedValue {
    /// Label of the extracted field this value belongs to
    pub label: String,
    /// Retrieved value; `None` means the store knows the field but has no value
    pub value: Option<String>,
    /// Opaque confidence or source note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Why a field was left unfilled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillReason {
    /// No value was retrieved for the field
    NoData,
    /// The form element could not be located within the wait timeout
    ElementNotFound,
    /// Filling the element timed out
    Timeout,
    /// Any other reason
    Other,
}

impl FillReason {
    /// Wire name of the reason code
    pub fn as_str(&self) -> &'static str {
        match self {
            FillReason::NoData => "no_data",
            FillReason::ElementNotFound => "element_not_found",
            FillReason::Timeout => "timeout",
            FillReason::Other => "other",
        }
    }

    /// Lenient parse of a collaborator-provided reason; unknown codes map to `Other`
    pub fn parse(reason: &str) -> Self {
        match reason.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "no_data" | "missing_data" => FillReason::NoData,
            "element_not_found" | "not_found" => FillReason::ElementNotFound,
            "timeout" | "timed_out" => FillReason::Timeout,
            _ => FillReason::Other,
        }
    }
}

impl fmt::Display for FillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of attempting to fill one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillOutcome {
    /// Field label
    pub label: String,
    /// Whether the field was filled
    pub filled: bool,
    /// Value written into the field, if filled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Reason code when not filled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FillReason>,
}

impl FillOutcome {
    /// A successfully filled field
    pub fn filled(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            filled: true,
            value: Some(value.into()),
            reason: None,
        }
    }

    /// A field left unfilled for `reason`
    pub fn unfilled(label: impl Into<String>, reason: FillReason) -> Self {
        Self {
            label: label.into(),
            filled: false,
            value: None,
            reason: Some(reason),
        }
    }
}
