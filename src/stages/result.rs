//! Uniform stage result shape

use crate::retry::OperationResult;
use crate::stages::error::CollaboratorError;
use crate::workflow::error::StageFailure;
use crate::workflow::types::Stage;
use serde::Serialize;

/// Resolved outcome of one stage: `{ok, data, error}`
///
/// `data` is present exactly when `ok` is true; `error` carries the message
/// of the final failed attempt otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult<T> {
    /// Whether the stage's external call completed
    pub ok: bool,
    /// Normalized stage output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of calls the retry engine made
    pub attempts: u32,
    #[serde(skip)]
    failure: Option<StageFailure>,
}

impl<T> StageResult<T> {
    /// Successful stage
    pub fn success(data: T, attempts: u32) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            attempts,
            failure: None,
        }
    }

    /// Failed stage
    pub fn failure(failure: StageFailure, attempts: u32) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(failure.to_string()),
            attempts,
            failure: Some(failure),
        }
    }

    /// Resolve a retry engine result for `stage`
    pub fn from_operation(stage: Stage, operation: OperationResult<T, CollaboratorError>) -> Self {
        let attempts = operation.calls() as u32;
        for attempt in &operation.attempts {
            tracing::debug!(
                stage = %attempt.stage,
                attempt = attempt.attempt,
                outcome = ?attempt.outcome,
                wait_ms = attempt.wait.map(|w| w.as_millis() as u64),
                "Stage attempt"
            );
        }
        match operation.outcome {
            Ok(data) => Self::success(data, attempts),
            Err(error) => Self::failure(StageFailure::from_retry(stage, error), attempts),
        }
    }

    /// Typed failure, when the stage did not succeed
    pub fn stage_failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    /// Whether the stage stopped because the caller cancelled the run
    pub fn is_cancelled(&self) -> bool {
        self.failure
            .as_ref()
            .map(StageFailure::is_cancellation)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{AttemptOutcome, RetryError, StageAttempt};

    #[test]
    fn test_exhausted_operation_becomes_failed_stage() {
        let operation: OperationResult<Vec<String>, CollaboratorError> = OperationResult {
            outcome: Err(RetryError::Exhausted {
                error: CollaboratorError::RateLimited("HTTP 429".to_string()),
                attempts: 2,
            }),
            attempts: vec![
                StageAttempt {
                    stage: Stage::Extraction,
                    attempt: 1,
                    outcome: AttemptOutcome::TransientError,
                    wait: Some(std::time::Duration::from_millis(1)),
                },
                StageAttempt {
                    stage: Stage::Extraction,
                    attempt: 2,
                    outcome: AttemptOutcome::TransientError,
                    wait: None,
                },
            ],
        };

        let result = StageResult::from_operation(Stage::Extraction, operation);
        assert!(!result.ok);
        assert!(result.data.is_none());
        assert_eq!(result.attempts, 2);
        let message = result.error.as_deref().unwrap();
        assert!(message.contains("extraction failed after 2 attempts"));
        assert!(!result.is_cancelled());
    }

    #[test]
    fn test_cancelled_operation_is_flagged() {
        let operation: OperationResult<(), CollaboratorError> = OperationResult {
            outcome: Err(RetryError::Cancelled { attempts: 0 }),
            attempts: Vec::new(),
        };
        let result = StageResult::from_operation(Stage::Filling, operation);
        assert!(result.is_cancelled());
        assert!(matches!(
            result.stage_failure(),
            Some(StageFailure::Cancelled {
                stage: Stage::Filling
            })
        ));
    }

    #[test]
    fn test_serialized_shape_omits_internal_failure() {
        let result = StageResult::success(vec!["Email".to_string()], 1);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["data"][0], "Email");
        assert!(json.get("error").is_none());
        assert!(json.get("failure").is_none());
    }
}
