//! Automation channel handle
//!
//! A run owns exactly one channel to the browser backend for its whole
//! lifetime. The handle is passed by reference into the Extraction and
//! Filling collaborators and handed back to its provider by value when the
//! run releases it, so it can never be driven after release.

use crate::stages::error::CollaboratorError;
use crate::workflow::types::RunId;
use async_trait::async_trait;
use std::fmt;
use uuid::Uuid;

/// Run-owned handle to a browser automation session
#[derive(Debug, PartialEq, Eq)]
pub struct AutomationChannel {
    id: String,
    run_id: RunId,
}

impl AutomationChannel {
    /// Wrap a channel id issued for `run_id`
    pub fn new(id: impl Into<String>, run_id: RunId) -> Self {
        Self {
            id: id.into(),
            run_id,
        }
    }

    /// Provider-issued channel id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run owning this channel
    pub fn run_id(&self) -> RunId {
        self.run_id
    }
}

impl fmt::Display for AutomationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Source of automation channels
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Obtain a fresh channel for `run_id`
    async fn open(&self, run_id: RunId) -> Result<AutomationChannel, CollaboratorError>;

    /// Give the channel back; the handle is consumed
    async fn release(&self, channel: AutomationChannel) -> Result<(), CollaboratorError>;
}

/// Provider that mints channel ids locally without a remote handshake
///
/// Used when the automation backend manages sessions implicitly per request.
#[derive(Debug, Default, Clone)]
pub struct LocalChannelProvider;

impl LocalChannelProvider {
    /// Create the provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelProvider for LocalChannelProvider {
    async fn open(&self, run_id: RunId) -> Result<AutomationChannel, CollaboratorError> {
        let channel = AutomationChannel::new(format!("local-{}", Uuid::new_v4()), run_id);
        tracing::debug!(run_id = %run_id, channel = %channel, "Opened local automation channel");
        Ok(channel)
    }

    async fn release(&self, channel: AutomationChannel) -> Result<(), CollaboratorError> {
        tracing::debug!(run_id = %channel.run_id(), channel = %channel, "Released local automation channel");
        Ok(())
    }
}
