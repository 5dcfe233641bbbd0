//! Result aggregator
//!
//! Folds the per-stage outputs of a run into the one [`FinalReport`] the
//! caller receives. Aggregation is a pure function of its input: running it
//! twice on the same outputs serializes to the same bytes.

use crate::stages::RetrievedData;
use crate::workflow::error::PartialDataError;
use crate::workflow::types::{FieldRecord, FillOutcome, FillReason, RunStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One filled field in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilledField {
    /// Field label
    pub field: String,
    /// Value written into the form
    pub value: String,
}

/// `response` section of the report
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportBody {
    /// Filled fields with their values
    pub filled_fields: Vec<FilledField>,
    /// Labels of extracted fields that were not filled
    pub unfilled_fields: Vec<String>,
    /// Every error message gathered during the run
    pub errors: Vec<String>,
}

/// `metadata` section of the report
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Captured user identifier (empty if none was found)
    pub user: String,
    /// Captured URL (empty if none was found)
    pub url: String,
    /// Number of extracted fields
    pub total_fields: usize,
    /// Number of filled fields
    pub filled_count: usize,
}

/// The single canonical output of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReport {
    /// Definitive run status
    pub status: RunStatus,
    /// Field results and errors
    pub response: ReportBody,
    /// Run summary
    pub metadata: ReportMetadata,
}

/// Everything a run produced, as input to [`aggregate`]
#[derive(Debug, Clone, Default)]
pub struct StageOutputs {
    /// Captured user identifier
    pub user: String,
    /// Captured URL
    pub url: String,
    /// Extracted fields in page order (empty if Extraction never succeeded)
    pub fields: Vec<FieldRecord>,
    /// Retrieved values keyed by label
    pub retrieved: RetrievedData,
    /// Filling outcomes; `None` if Filling never completed
    pub fill_outcomes: Option<Vec<FillOutcome>>,
    /// Stage-level error messages in the order they occurred
    pub errors: Vec<String>,
    /// Whether the run took an abort path
    pub aborted: bool,
}

impl StageOutputs {
    /// Outputs for a run identified by `user` and `url`
    pub fn new(user: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Record a stage-level error
    pub fn push_error(&mut self, error: impl ToString) {
        self.errors.push(error.to_string());
    }

    /// Record an abort and its reason
    pub fn abort(&mut self, error: impl ToString) {
        self.aborted = true;
        self.push_error(error);
    }
}

/// Build the final report
///
/// Fields are reported in extraction order. Status is `error` on any abort
/// path, `success` when every extracted field was filled, and `partial`
/// otherwise, including runs that filled nothing for lack of data.
pub fn aggregate(outputs: &StageOutputs) -> FinalReport {
    let mut body = ReportBody {
        errors: outputs.errors.clone(),
        ..ReportBody::default()
    };

    let outcomes: HashMap<&str, &FillOutcome> = outputs
        .fill_outcomes
        .iter()
        .flatten()
        .map(|o| (o.label.as_str(), o))
        .collect();
    let extracted: HashSet<&str> = outputs.fields.iter().map(|f| f.label.as_str()).collect();

    let mut no_data = Vec::new();
    let mut field_errors = Vec::new();

    for field in &outputs.fields {
        match outcomes.get(field.label.as_str()) {
            Some(outcome) if outcome.filled => body.filled_fields.push(FilledField {
                field: field.label.clone(),
                value: outcome.value.clone().unwrap_or_default(),
            }),
            Some(outcome) => {
                body.unfilled_fields.push(field.label.clone());
                match outcome.reason.unwrap_or(FillReason::Other) {
                    FillReason::NoData => no_data.push(field.label.clone()),
                    reason => field_errors.push(format!(
                        "Field '{}' not filled: {}",
                        field.label, reason
                    )),
                }
            }
            None => {
                body.unfilled_fields.push(field.label.clone());
                // Only a completed Filling stage says anything about missing data
                if outputs.fill_outcomes.is_some() && !has_value(&outputs.retrieved, &field.label) {
                    no_data.push(field.label.clone());
                }
            }
        }
    }

    if let Some(fill_outcomes) = &outputs.fill_outcomes {
        for stray in fill_outcomes.iter().filter(|o| !extracted.contains(o.label.as_str())) {
            tracing::warn!(field = %stray.label, "Ignoring outcome for a field that was never extracted");
        }
    }

    if !no_data.is_empty() {
        body.errors
            .push(PartialDataError::MissingFields(no_data).to_string());
    }
    body.errors.extend(field_errors);

    let total_fields = outputs.fields.len();
    let filled_count = body.filled_fields.len();
    let status = if outputs.aborted {
        RunStatus::Error
    } else if total_fields > 0 && filled_count == total_fields {
        RunStatus::Success
    } else {
        RunStatus::Partial
    };

    FinalReport {
        status,
        response: body,
        metadata: ReportMetadata {
            user: outputs.user.clone(),
            url: outputs.url.clone(),
            total_fields,
            filled_count,
        },
    }
}

fn has_value(retrieved: &RetrievedData, label: &str) -> bool {
    retrieved
        .get(label)
        .map(|v| v.value.is_some())
        .unwrap_or(false)
}
