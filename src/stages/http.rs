//! HTTP collaborator clients
//!
//! JSON-over-HTTP implementations of the collaborator contracts. Each
//! service is addressed by a base URL; the automation channel id travels in
//! the `x-automation-channel` header.

use crate::stages::channel::{AutomationChannel, ChannelProvider};
use crate::stages::collaborators::{ExtractionBackend, FillingBackend, RetrievalBackend};
use crate::stages::error::CollaboratorError;
use crate::stages::types::{
    ExtractionRequest, ExtractionResponse, FillingRequest, FillingResponse, RetrievalRequest,
    RetrievalResponse,
};
use crate::workflow::types::RunId;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Header carrying the automation channel id
pub const CHANNEL_HEADER: &str = "x-automation-channel";

/// Client for one collaborator service
#[derive(Debug, Clone)]
pub struct HttpCollaborator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCollaborator {
    /// Create a client for the service at `base_url`
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client sharing an existing connection pool
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Service base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<Req, Resp>(
        &self,
        path: &str,
        channel: Option<&AutomationChannel>,
        body: &Req,
    ) -> Result<Resp, CollaboratorError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, channel = ?channel.map(AutomationChannel::id), "Calling collaborator");

        let mut request = self.client.post(&url).json(body);
        if let Some(channel) = channel {
            request = request.header(CHANNEL_HEADER, channel.id());
        }

        let response = request.send().await.map_err(transport_error)?;
        decode(response).await
    }
}

#[async_trait]
impl ExtractionBackend for HttpCollaborator {
    async fn extract(
        &self,
        channel: &AutomationChannel,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResponse, CollaboratorError> {
        self.post_json("/extract", Some(channel), request).await
    }
}

#[async_trait]
impl RetrievalBackend for HttpCollaborator {
    async fn retrieve(
        &self,
        request: &RetrievalRequest,
    ) -> Result<RetrievalResponse, CollaboratorError> {
        self.post_json("/retrieve", None, request).await
    }
}

#[async_trait]
impl FillingBackend for HttpCollaborator {
    async fn fill(
        &self,
        channel: &AutomationChannel,
        request: &FillingRequest,
    ) -> Result<FillingResponse, CollaboratorError> {
        self.post_json("/fill", Some(channel), request).await
    }
}

#[derive(Debug, Serialize)]
struct OpenChannelRequest {
    run_id: RunId,
}

#[derive(Debug, Deserialize)]
struct OpenChannelResponse {
    #[serde(alias = "id")]
    channel_id: String,
}

/// Channel provider backed by the automation service's session endpoints
#[derive(Debug, Clone)]
pub struct HttpChannelProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChannelProvider {
    /// Create a provider for the automation service at `base_url`
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a provider sharing an existing connection pool
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChannelProvider for HttpChannelProvider {
    async fn open(&self, run_id: RunId) -> Result<AutomationChannel, CollaboratorError> {
        let url = format!("{}/channels", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&OpenChannelRequest { run_id })
            .send()
            .await
            .map_err(transport_error)?;
        let opened: OpenChannelResponse = decode(response).await?;

        tracing::info!(run_id = %run_id, channel = %opened.channel_id, "Opened automation channel");
        Ok(AutomationChannel::new(opened.channel_id, run_id))
    }

    async fn release(&self, channel: AutomationChannel) -> Result<(), CollaboratorError> {
        let url = format!("{}/channels/{}", self.base_url, channel.id());
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(CollaboratorError::from_status(status.as_u16(), &body));
        }

        tracing::info!(run_id = %channel.run_id(), channel = %channel, "Released automation channel");
        Ok(())
    }
}

fn transport_error(error: reqwest::Error) -> CollaboratorError {
    if error.is_timeout() {
        CollaboratorError::Timeout(error.to_string())
    } else {
        CollaboratorError::Unavailable {
            status: None,
            message: error.to_string(),
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CollaboratorError> {
    let status = response.status();
    if !status.is_success() {
        let status_code = status.as_u16();
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());

        tracing::error!(
            status_code = status_code,
            error_body = %error_body,
            "Collaborator returned error status"
        );
        return Err(CollaboratorError::from_status(status_code, &error_body));
    }

    let body = response
        .text()
        .await
        .map_err(|e| CollaboratorError::Protocol(format!("Failed to read response body: {}", e)))?;

    serde_json::from_str(&body).map_err(|e| {
        CollaboratorError::Protocol(format!(
            "Failed to parse collaborator response: {} - Response body: {}",
            e, body
        ))
    })
}
