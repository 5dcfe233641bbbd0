//! Retry module
//!
//! Exponential backoff around external collaborator calls. Each stage call
//! made by the orchestrator goes through [`RetryPolicy::attempt`].

pub mod policy;

pub use policy::{
    AttemptOutcome, FailureClass, OperationResult, RetryError, RetryPolicy, StageAttempt,
};
