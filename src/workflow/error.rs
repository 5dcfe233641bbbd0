//! Workflow error taxonomy
//!
//! Errors raised while capturing input, configuring the orchestrator,
//! driving the state machine, and resolving stages. None of these cross the
//! run boundary: the orchestrator turns each of them into an entry of the
//! final report's `errors` list.

use crate::retry::RetryError;
use crate::stages::CollaboratorError;
use crate::workflow::types::{Stage, WorkflowState};
use thiserror::Error;

/// Request rejected before any collaborator is called
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// No user identifier found (or empty after trim)
    #[error("Validation error: missing user identifier in request")]
    MissingUser,

    /// No URL found (or empty after trim)
    #[error("Validation error: missing target URL in request")]
    MissingUrl,

    /// URL present but not an absolute http(s) URL
    #[error("Validation error: '{0}' is not an absolute http(s) URL")]
    InvalidUrl(String),

    /// Request text exceeds the configured maximum length
    #[error("Validation error: request too long ({length} > {max} characters)")]
    RequestTooLong {
        /// Length of the rejected request
        length: usize,
        /// Configured maximum
        max: usize,
    },
}

/// Invalid orchestrator or retry configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Maximum attempt count must be at least one
    #[error("Configuration error: max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(i64),

    /// Backoff multiplier must be at least one
    #[error("Configuration error: exp_base must be > 0")]
    InvalidExpBase,

    /// A timeout was configured as zero
    #[error("Configuration error: {0} must be > 0")]
    ZeroTimeout(&'static str),

    /// Maximum request length must be at least one
    #[error("Configuration error: max_request_length must be > 0")]
    InvalidMaxRequestLength,

    /// A value could not be parsed
    #[error("Configuration error: invalid value '{value}' for {key}")]
    InvalidValue {
        /// Setting name
        key: &'static str,
        /// Raw value that failed to parse
        value: String,
    },
}

/// Illegal state machine move
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The requested move skips or re-enters a state
    #[error("Invalid workflow transition from {from} to {to}")]
    Invalid {
        /// Current state
        from: WorkflowState,
        /// Requested state
        to: WorkflowState,
    },

    /// The run already has a final status
    #[error("Workflow run is already finalized")]
    AlreadyFinalized,

    /// `Finalized` must be entered through `finalize` with a status
    #[error("Finalizing a run requires a status")]
    MissingStatus,

    /// Input can only be captured while in `CapturingInput`
    #[error("Input can only be captured in CAPTURING_INPUT (current state: {0})")]
    NotCapturing(WorkflowState),
}

/// Stage-level failure after the retry policy has resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageFailure {
    /// The collaborator returned a non-retryable failure
    #[error("{stage} failed: {source}")]
    Fatal {
        /// Failed stage
        stage: Stage,
        /// Number of calls made
        attempts: u32,
        /// Last collaborator error
        source: CollaboratorError,
    },

    /// Every allowed attempt failed with a transient error
    #[error("{stage} failed after {attempts} attempts: {source}")]
    Exhausted {
        /// Failed stage
        stage: Stage,
        /// Number of calls made
        attempts: u32,
        /// Last collaborator error
        source: CollaboratorError,
    },

    /// The caller cancelled the run
    #[error("Run cancelled by caller during {stage} stage")]
    Cancelled {
        /// Stage that was pending or in flight
        stage: Stage,
    },
}

impl StageFailure {
    /// Attach the stage to a retry engine failure
    pub fn from_retry(stage: Stage, error: RetryError<CollaboratorError>) -> Self {
        match error {
            RetryError::Fatal { error, attempts } => StageFailure::Fatal {
                stage,
                attempts,
                source: error,
            },
            RetryError::Exhausted { error, attempts } => StageFailure::Exhausted {
                stage,
                attempts,
                source: error,
            },
            RetryError::Cancelled { .. } => StageFailure::Cancelled { stage },
        }
    }

    /// Whether this failure is a caller cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(self, StageFailure::Cancelled { .. })
    }
}

/// Missing or incomplete applicant data
///
/// Reported in the final `errors` list but never changes a stage outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartialDataError {
    /// Retrieval failed and the run continued with no data
    #[error("Partial data: retrieval failed, continuing without applicant data ({0})")]
    RetrievalFailed(String),

    /// Some fields had no retrieved value
    #[error("Partial data: no data available for fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_messages_name_the_stage() {
        let exhausted = StageFailure::from_retry(
            Stage::Extraction,
            RetryError::Exhausted {
                error: CollaboratorError::Timeout("navigation".to_string()),
                attempts: 5,
            },
        );
        let message = exhausted.to_string();
        assert!(message.contains("extraction"));
        assert!(message.contains("5 attempts"));

        let cancelled =
            StageFailure::from_retry(Stage::Filling, RetryError::Cancelled { attempts: 0 });
        assert!(cancelled.is_cancellation());
        assert!(cancelled.to_string().contains("cancelled"));
    }

    #[test]
    fn test_missing_fields_lists_labels() {
        let error = PartialDataError::MissingFields(vec!["Email".into(), "Phone".into()]);
        assert_eq!(
            error.to_string(),
            "Partial data: no data available for fields: Email, Phone"
        );
    }
}
