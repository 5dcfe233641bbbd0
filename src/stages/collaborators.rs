//! External collaborator contracts
//!
//! The orchestrator only ever talks to these traits. The HTTP clients in
//! [`crate::stages::http`] implement them for remote services; tests plug in
//! in-process fakes.

use crate::stages::channel::AutomationChannel;
use crate::stages::error::CollaboratorError;
use crate::stages::types::{
    ExtractionRequest, ExtractionResponse, FillingRequest, FillingResponse, RetrievalRequest,
    RetrievalResponse,
};
use async_trait::async_trait;

/// Form discovery service
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Inspect the page at `request.url` through `channel` and list its fields
    async fn extract(
        &self,
        channel: &AutomationChannel,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResponse, CollaboratorError>;
}

/// Knowledge retrieval service
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Answer the query for the given user
    async fn retrieve(
        &self,
        request: &RetrievalRequest,
    ) -> Result<RetrievalResponse, CollaboratorError>;
}

/// Form submission service
#[async_trait]
pub trait FillingBackend: Send + Sync {
    /// Write `request.data` into the form at `request.url` through `channel`
    async fn fill(
        &self,
        channel: &AutomationChannel,
        request: &FillingRequest,
    ) -> Result<FillingResponse, CollaboratorError>;
}
