//! Session state data models
//!
//! Typed keys for per-run state, the persisted row layout, and store errors.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use thiserror::Error;

/// What a stored value holds
///
/// Keys are scoped by run id, so two concurrent runs writing the same key
/// never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKey {
    /// Captured user identifier
    User,
    /// Captured target URL
    Url,
    /// Current state machine position
    State,
    /// Final run status
    Status,
    /// Raw extraction stage output
    Extraction,
    /// Raw retrieval stage output
    Retrieval,
    /// Raw filling stage output
    Filling,
    /// Final report
    Report,
}

impl SessionKey {
    /// Every key, in a stable order
    pub const ALL: [SessionKey; 8] = [
        SessionKey::User,
        SessionKey::Url,
        SessionKey::State,
        SessionKey::Status,
        SessionKey::Extraction,
        SessionKey::Retrieval,
        SessionKey::Filling,
        SessionKey::Report,
    ];

    /// Physical key name
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::User => "user",
            SessionKey::Url => "url",
            SessionKey::State => "state",
            SessionKey::Status => "status",
            SessionKey::Extraction => "extraction",
            SessionKey::Retrieval => "retrieval",
            SessionKey::Filling => "filling",
            SessionKey::Report => "report",
        }
    }

    /// Parse a physical key name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.as_str() == name)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionEntry {
    /// Run the entry belongs to
    pub run_id: String,
    /// Physical key name
    pub key: String,
    /// JSON-encoded value
    pub value: String,
    /// When the entry was last written (Unix timestamp)
    pub updated_at: i64,
}

/// Errors raised by session store backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend storage failure
    #[error("Session store backend error: {0}")]
    Backend(String),

    /// Value could not be encoded or decoded
    #[error("Session store serialization error: {0}")]
    Serialization(String),
}
