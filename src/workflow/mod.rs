//! Workflow module
//!
//! Data model, request capture, the orchestrator state machine and the
//! result aggregator.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod request;
pub mod types;

pub use aggregator::{aggregate, FilledField, FinalReport, ReportBody, ReportMetadata, StageOutputs};
pub use config::{OrchestratorConfig, RetrievalFailurePolicy};
pub use error::{ConfigurationError, PartialDataError, StageFailure, TransitionError, ValidationError};
pub use orchestrator::{Collaborators, Orchestrator, ProgressEvent, RunContext};
pub use request::{CapturedInput, RejectedInput, RunRequest};
pub use types::{
    FieldRecord, FillOutcome, FillReason, RetrievedValue, RunId, RunStatus, Stage, WorkflowRun,
    WorkflowState,
};
