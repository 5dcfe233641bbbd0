//! Workflow orchestrator
//!
//! Drives one run through `INIT → CAPTURING_INPUT → EXTRACTING → RETRIEVING
//! → FILLING → FINALIZED`. Every external call goes through the retry
//! policy, every transition is written to the session store, and every
//! failure ends up in the final report instead of crossing the run boundary.

use crate::retry::RetryPolicy;
use crate::session::{SessionKey, SessionStore};
use crate::stages::{
    AutomationChannel, ChannelProvider, CollaboratorError, ExtractionAdapter, ExtractionBackend,
    FillingAdapter, FillingBackend, RetrievalAdapter, RetrievalBackend, StageResult,
};
use crate::workflow::aggregator::{aggregate, FinalReport, StageOutputs};
use crate::workflow::config::{OrchestratorConfig, RetrievalFailurePolicy};
use crate::workflow::error::{ConfigurationError, PartialDataError, TransitionError};
use crate::workflow::request::RunRequest;
use crate::workflow::types::{RunId, Stage, WorkflowRun, WorkflowState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// The external services a run talks to
#[derive(Clone)]
pub struct Collaborators {
    /// Form discovery
    pub extraction: Arc<dyn ExtractionBackend>,
    /// Knowledge retrieval
    pub retrieval: Arc<dyn RetrievalBackend>,
    /// Form submission
    pub filling: Arc<dyn FillingBackend>,
    /// Automation channel source
    pub channels: Arc<dyn ChannelProvider>,
}

/// Progress notification emitted on every state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Run the event belongs to
    pub run_id: RunId,
    /// State just entered
    pub state: WorkflowState,
    /// Human-readable description
    pub message: String,
}

/// Per-run caller context: identity, cancellation and progress reporting
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    run_id: RunId,
    cancel: CancellationToken,
    progress: Option<UnboundedSender<ProgressEvent>>,
}

impl RunContext {
    /// Context with a fresh run id, a new token and no progress channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-chosen run id
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    /// Cancel the run when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send a [`ProgressEvent`] on every transition
    pub fn with_progress(mut self, progress: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run identifier
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Cancellation token of the run
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn emit(&self, state: WorkflowState, message: String) {
        if let Some(progress) = &self.progress {
            // A dropped receiver only means nobody is listening any more
            let _ = progress.send(ProgressEvent {
                run_id: self.run_id,
                state,
                message,
            });
        }
    }
}

/// State machine driving runs through the three stages
pub struct Orchestrator {
    extraction: ExtractionAdapter,
    retrieval: RetrievalAdapter,
    filling: FillingAdapter,
    channels: Arc<dyn ChannelProvider>,
    store: Arc<dyn SessionStore>,
    config: OrchestratorConfig,
    policy: RetryPolicy,
}

impl Orchestrator {
    /// Build an orchestrator after validating `config`
    pub fn new(
        collaborators: Collaborators,
        store: Arc<dyn SessionStore>,
        config: OrchestratorConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let policy = config.retry_policy()?;

        Ok(Self {
            extraction: ExtractionAdapter::new(
                collaborators.extraction,
                config.extraction_timeout(),
            ),
            retrieval: RetrievalAdapter::new(collaborators.retrieval, config.retrieval_timeout()),
            filling: FillingAdapter::new(collaborators.filling, config.filling_timeout()),
            channels: collaborators.channels,
            store,
            config,
            policy,
        })
    }

    /// Effective configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Session store the runs write to
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run a free-text request such as "Apply for alice: https://example.com/apply"
    pub async fn run(&self, request: &str) -> FinalReport {
        self.run_with(RunRequest::from(request), RunContext::new())
            .await
    }

    /// Run a request under a caller-supplied context
    ///
    /// Never fails: every problem is reported in the returned report.
    pub async fn run_with(&self, request: RunRequest, ctx: RunContext) -> FinalReport {
        let span = tracing::info_span!("workflow_run", run_id = %ctx.run_id());
        self.drive(request, &ctx).instrument(span).await
    }

    async fn drive(&self, request: RunRequest, ctx: &RunContext) -> FinalReport {
        tracing::info!("Workflow run started");

        let mut run = WorkflowRun::new(ctx.run_id());
        let mut outputs = StageOutputs::default();
        let mut channel = None;

        if let Err(error) = self
            .pipeline(&mut run, ctx, &request, &mut outputs, &mut channel)
            .await
        {
            tracing::error!(error = %error, "Workflow state machine rejected a transition");
            outputs.abort(error);
        }

        self.finalize(run, ctx, outputs, channel).await
    }

    async fn pipeline(
        &self,
        run: &mut WorkflowRun,
        ctx: &RunContext,
        request: &RunRequest,
        outputs: &mut StageOutputs,
        channel_slot: &mut Option<AutomationChannel>,
    ) -> Result<(), TransitionError> {
        let cancel = ctx.cancel_token();

        // Capture input; nothing external is called if this fails
        self.enter(run, ctx, WorkflowState::CapturingInput, "Capturing user and URL".to_string())
            .await?;
        let input = match request.capture(self.config.max_request_length) {
            Ok(input) => input,
            Err(rejected) => {
                tracing::warn!(errors = rejected.errors.len(), "Request failed validation");
                outputs.user = rejected.user.unwrap_or_default();
                outputs.url = rejected.url.unwrap_or_default();
                for error in rejected.errors {
                    outputs.abort(error);
                }
                return Ok(());
            }
        };
        run.capture(&input.user, &input.url)?;
        outputs.user = input.user.clone();
        outputs.url = input.url.clone();
        self.persist(run.id(), SessionKey::User, &input.user).await;
        self.persist(run.id(), SessionKey::Url, &input.url).await;

        // Extraction, preceded by acquiring the run's automation channel
        self.enter(
            run,
            ctx,
            WorkflowState::Extracting,
            format!("Extracting form fields from {}", input.url),
        )
        .await?;

        let run_id = run.id();
        let opened = self
            .policy
            .attempt(
                Stage::Extraction,
                cancel,
                move || self.open_channel(run_id),
                CollaboratorError::classify,
            )
            .await;
        let opened = StageResult::from_operation(Stage::Extraction, opened);
        let channel = match (opened.data, opened.error) {
            (Some(channel), _) => &*channel_slot.insert(channel),
            (None, error) => {
                outputs.abort(format!(
                    "Automation channel unavailable: {}",
                    error.unwrap_or_else(|| "unknown error".to_string())
                ));
                return Ok(());
            }
        };

        let extraction = self
            .extraction
            .execute(&self.policy, cancel, channel, &input.url)
            .await;
        self.persist(run.id(), SessionKey::Extraction, &extraction).await;
        outputs.fields = match (extraction.data, extraction.error) {
            (Some(fields), _) => fields,
            (None, error) => {
                outputs.abort(error.unwrap_or_default());
                return Ok(());
            }
        };
        self.persist_draft(run.id(), outputs).await;

        if outputs.fields.is_empty() {
            tracing::warn!(url = %input.url, "Extraction found no form fields");
            outputs.push_error(format!("Extraction found no form fields at {}", input.url));
            return Ok(());
        }

        // Retrieval never aborts under the default policy
        self.enter(
            run,
            ctx,
            WorkflowState::Retrieving,
            format!(
                "Retrieving data for {} fields for {}",
                outputs.fields.len(),
                input.user
            ),
        )
        .await?;
        let retrieval = self
            .retrieval
            .execute(&self.policy, cancel, &input.user, &outputs.fields)
            .await;
        self.persist(run.id(), SessionKey::Retrieval, &retrieval).await;

        let cancelled = retrieval.is_cancelled();
        match (retrieval.data, retrieval.error) {
            (Some(data), _) => {
                if data.is_empty() {
                    tracing::info!(user = %input.user, "Retrieval found no applicant data");
                }
                outputs.retrieved = data;
            }
            (None, error) => {
                let error = error.unwrap_or_default();
                if cancelled {
                    outputs.abort(error);
                    return Ok(());
                }
                match self.config.retrieval_failure_policy {
                    RetrievalFailurePolicy::Continue => {
                        tracing::warn!(error = %error, "Retrieval failed, continuing with no data");
                        outputs.push_error(PartialDataError::RetrievalFailed(error));
                    }
                    RetrievalFailurePolicy::Abort => {
                        outputs.abort(error);
                        return Ok(());
                    }
                }
            }
        }
        self.persist_draft(run.id(), outputs).await;

        // Filling runs even with an empty mapping
        let data: BTreeMap<String, String> = outputs
            .retrieved
            .iter()
            .filter_map(|(label, retrieved)| {
                retrieved.value.clone().map(|value| (label.clone(), value))
            })
            .collect();
        self.enter(
            run,
            ctx,
            WorkflowState::Filling,
            format!("Filling {} of {} fields", data.len(), outputs.fields.len()),
        )
        .await?;
        let filling = self
            .filling
            .execute(&self.policy, cancel, channel, &input.url, &data)
            .await;
        self.persist(run.id(), SessionKey::Filling, &filling).await;

        match (filling.data, filling.error) {
            (Some(outcomes), _) => outputs.fill_outcomes = Some(outcomes),
            (None, error) => outputs.abort(error.unwrap_or_default()),
        }
        self.persist_draft(run.id(), outputs).await;
        Ok(())
    }

    async fn finalize(
        &self,
        mut run: WorkflowRun,
        ctx: &RunContext,
        outputs: StageOutputs,
        channel: Option<AutomationChannel>,
    ) -> FinalReport {
        if let Some(channel) = channel {
            // Keep the page open only when there is filled work to review
            let reviewable = !outputs.aborted && outputs.fill_outcomes.is_some();
            if !reviewable || !self.config.keep_channel_open {
                if let Err(error) = self.channels.release(channel).await {
                    tracing::warn!(error = %error, "Failed to release automation channel");
                }
            } else {
                tracing::info!(channel = %channel, "Leaving automation channel open for review");
            }
        }

        let report = aggregate(&outputs);
        if let Err(error) = run.finalize(report.status) {
            tracing::error!(error = %error, "Could not finalize workflow run");
        }

        self.persist(run.id(), SessionKey::Report, &report).await;
        self.persist(run.id(), SessionKey::Status, &report.status).await;
        self.persist(run.id(), SessionKey::State, &WorkflowState::Finalized)
            .await;
        ctx.emit(
            WorkflowState::Finalized,
            format!("Run finished with status {}", report.status),
        );

        tracing::info!(
            status = %report.status,
            filled_count = report.metadata.filled_count,
            total_fields = report.metadata.total_fields,
            errors = report.response.errors.len(),
            "Workflow run finished"
        );
        report
    }

    async fn enter(
        &self,
        run: &mut WorkflowRun,
        ctx: &RunContext,
        next: WorkflowState,
        message: String,
    ) -> Result<(), TransitionError> {
        run.advance(next)?;
        tracing::info!(state = %next, "{}", message);
        self.persist(run.id(), SessionKey::State, &next).await;
        ctx.emit(next, message);
        Ok(())
    }

    async fn open_channel(&self, run_id: RunId) -> Result<AutomationChannel, CollaboratorError> {
        let timeout = self.config.channel_connect_timeout();
        tokio::time::timeout(timeout, self.channels.open(run_id))
            .await
            .map_err(|_| {
                CollaboratorError::Timeout(format!(
                    "automation channel not established within {}s",
                    timeout.as_secs_f64()
                ))
            })?
    }

    /// Report as it stands after the latest stage, for mid-run inspection
    async fn persist_draft(&self, run_id: RunId, outputs: &StageOutputs) {
        self.persist(run_id, SessionKey::Report, &aggregate(outputs))
            .await;
    }

    /// Best-effort write: failures are logged, never propagated
    async fn persist<T: Serialize + ?Sized>(&self, run_id: RunId, key: SessionKey, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "Failed to encode session entry");
                return;
            }
        };
        if let Err(error) = self.store.put(run_id, key, value).await {
            tracing::warn!(key = %key, error = %error, "Failed to write session entry");
        }
    }
}
