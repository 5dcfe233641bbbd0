//! Orchestrator configuration
//!
//! Centralized configuration for the orchestration core: retry schedule,
//! per-stage timeouts, and run-level policies.

use crate::retry::RetryPolicy;
use crate::workflow::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What to do when the Retrieval stage fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalFailurePolicy {
    /// Log the failure and fill with an empty mapping
    #[default]
    Continue,
    /// Finalize the run with `error` before Filling
    Abort,
}

impl RetrievalFailurePolicy {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalFailurePolicy::Continue => "continue",
            RetrievalFailurePolicy::Abort => "abort",
        }
    }
}

impl fmt::Display for RetrievalFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalFailurePolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(RetrievalFailurePolicy::Continue),
            "abort" => Ok(RetrievalFailurePolicy::Abort),
            _ => Err(ConfigurationError::InvalidValue {
                key: "RETRIEVAL_FAILURE_POLICY",
                value: s.to_string(),
            }),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestratorConfig {
    /// Maximum calls per stage operation
    pub max_attempts: i64,
    /// Backoff multiplier
    pub exp_base: u32,
    /// Delay after the first failed attempt, in milliseconds
    pub initial_delay_ms: u64,
    /// Page-load timeout for Extraction, in seconds
    pub extraction_timeout_secs: u64,
    /// Answer timeout for Retrieval, in seconds
    pub retrieval_timeout_secs: u64,
    /// Completion timeout for Filling, in seconds
    pub filling_timeout_secs: u64,
    /// Timeout for establishing the automation channel, in seconds
    pub channel_connect_timeout_secs: u64,
    /// Continue or abort when Retrieval fails
    pub retrieval_failure_policy: RetrievalFailurePolicy,
    /// Leave the automation channel open after Filling so the page can be reviewed
    pub keep_channel_open: bool,
    /// Maximum request length in characters
    pub max_request_length: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            exp_base: RetryPolicy::DEFAULT_EXP_BASE,
            initial_delay_ms: RetryPolicy::DEFAULT_INITIAL_DELAY.as_millis() as u64,
            extraction_timeout_secs: 60,
            retrieval_timeout_secs: 30,
            filling_timeout_secs: 120,
            channel_connect_timeout_secs: 60,
            retrieval_failure_policy: RetrievalFailurePolicy::Continue,
            keep_channel_open: true,
            max_request_length: 10000, // 10KB
        }
    }
}

impl OrchestratorConfig {
    /// Check every knob, returning the first problem found
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.retry_policy()?;

        let timeouts = [
            ("extraction_timeout_secs", self.extraction_timeout_secs),
            ("retrieval_timeout_secs", self.retrieval_timeout_secs),
            ("filling_timeout_secs", self.filling_timeout_secs),
            ("channel_connect_timeout_secs", self.channel_connect_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigurationError::ZeroTimeout(*name));
        }

        if self.max_request_length == 0 {
            return Err(ConfigurationError::InvalidMaxRequestLength);
        }
        Ok(())
    }

    /// Retry policy shared by every stage
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigurationError> {
        RetryPolicy::new(
            self.max_attempts,
            self.exp_base,
            Duration::from_millis(self.initial_delay_ms),
        )
    }

    /// Extraction page-load timeout
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    /// Retrieval answer timeout
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    /// Filling completion timeout
    pub fn filling_timeout(&self) -> Duration {
        Duration::from_secs(self.filling_timeout_secs)
    }

    /// Automation channel connect timeout
    pub fn channel_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_connect_timeout_secs)
    }
}
