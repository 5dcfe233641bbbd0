//! Collaborator error types
//!
//! Every failure of an external collaborator is normalized into a
//! [`CollaboratorError`] and classified transient or fatal for the retry engine.

use crate::retry::FailureClass;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Status code quoted as an HTTP status ("HTTP 503", "status: 429", "HTTP/1.1 502")
/// or leading the message ("503 Service Unavailable")
static QUOTED_STATUS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:\b(?:http(?:/\d(?:\.\d)?)?|status(?:\s+code)?|code)\s*[:=]?\s*|^\s*)(429|50[0234])\b",
    )
    .expect("status regex should compile")
});

/// Failure reported by (or while talking to) an external collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The collaborator is rate limiting us (HTTP 429)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The collaborator is temporarily unavailable (HTTP 500/502/503/504, connection refused)
    #[error("service unavailable{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Unavailable {
        /// HTTP status, when the failure came from a response
        status: Option<u16>,
        /// Error detail
        message: String,
    },

    /// Navigation, page load or request timeout
    #[error("timed out: {0}")]
    Timeout(String),

    /// The page could not be loaded
    #[error("page failed to load: {0}")]
    PageLoad(String),

    /// Malformed or unreachable target (e.g. invalid URL)
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// The collaborator refused the request permanently
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The collaborator answered with something we could not decode
    #[error("malformed collaborator response: {0}")]
    Protocol(String),
}

impl CollaboratorError {
    /// Retry classification of this failure
    pub fn classify(&self) -> FailureClass {
        match self {
            CollaboratorError::RateLimited(_)
            | CollaboratorError::Unavailable { .. }
            | CollaboratorError::Timeout(_)
            | CollaboratorError::PageLoad(_) => FailureClass::Transient,
            CollaboratorError::InvalidTarget(_)
            | CollaboratorError::Rejected(_)
            | CollaboratorError::Protocol(_) => FailureClass::Fatal,
        }
    }

    /// Map a non-success HTTP status to an error
    ///
    /// 429 is rate limiting; 500/502/503/504 are temporary unavailability;
    /// anything else is a permanent rejection.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            429 => CollaboratorError::RateLimited(format!("HTTP 429: {}", body)),
            500 | 502 | 503 | 504 => CollaboratorError::Unavailable {
                status: Some(status),
                message: body.to_string(),
            },
            _ => CollaboratorError::Rejected(format!("HTTP {}: {}", status, body)),
        }
    }

    /// Classify a free-text error message returned in a `status: "error"` payload
    pub fn from_message(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        let status = QUOTED_STATUS
            .captures(&lowered)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str());

        if mentions(&lowered, &["invalid url", "malformed url", "err_invalid_url", "invalid_url"]) {
            CollaboratorError::InvalidTarget(message.to_string())
        } else if status == Some("429")
            || mentions(&lowered, &["rate limit", "too many requests", "resource_exhausted"])
        {
            CollaboratorError::RateLimited(message.to_string())
        } else if mentions(&lowered, &["timeout", "timed out"]) {
            CollaboratorError::Timeout(message.to_string())
        } else if status.is_some()
            || mentions(
                &lowered,
                &["unavailable", "overloaded", "bad gateway", "internal server error"],
            )
        {
            CollaboratorError::Unavailable {
                status: None,
                message: message.to_string(),
            }
        } else if mentions(&lowered, &["net::err", "failed to load", "page load", "navigation failed"]) {
            CollaboratorError::PageLoad(message.to_string())
        } else {
            CollaboratorError::Rejected(message.to_string())
        }
    }
}

fn mentions(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
