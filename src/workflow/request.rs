//! Request capture
//!
//! Turns a caller request into a validated `(user, url)` pair. Free-text
//! requests look like "Apply for alice: https://example.com/apply".

use crate::workflow::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static URL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bhttps?://\S+").expect("url regex should compile"));

static FOR_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bfor\s+([A-Za-z0-9_.@-]+)").expect("for-phrase regex should compile")
});

static USER_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\buser\s*[:=]\s*([A-Za-z0-9_.@-]+)").expect("user regex should compile")
});

const TRAILING_URL_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '>', '"', '\''];

/// Words that follow "for" without naming a user ("for the role at ...")
const NOT_A_USER: &[&str] = &[
    "the", "this", "that", "a", "an", "me", "my", "job", "position", "role",
];

/// Caller input for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunRequest {
    /// Free-text request containing a user reference and a URL
    Text(String),
    /// Already separated user identifier and URL
    Structured {
        /// User identifier
        user: String,
        /// Target URL
        url: String,
    },
}

impl From<&str> for RunRequest {
    fn from(text: &str) -> Self {
        RunRequest::Text(text.to_string())
    }
}

impl From<String> for RunRequest {
    fn from(text: String) -> Self {
        RunRequest::Text(text)
    }
}

/// Validated run input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedInput {
    /// Trimmed, non-empty user identifier
    pub user: String,
    /// Absolute http(s) URL
    pub url: String,
}

/// Input that failed validation, with whatever could be recovered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedInput {
    /// User identifier, if one was found
    pub user: Option<String>,
    /// URL text, if one was found
    pub url: Option<String>,
    /// Every validation problem
    pub errors: Vec<ValidationError>,
}

impl RunRequest {
    /// Length of the request in characters
    pub fn char_len(&self) -> usize {
        match self {
            RunRequest::Text(text) => text.chars().count(),
            RunRequest::Structured { user, url } => user.chars().count() + url.chars().count(),
        }
    }

    /// Extract and validate the user identifier and URL
    pub fn capture(&self, max_request_length: usize) -> Result<CapturedInput, RejectedInput> {
        let length = self.char_len();
        if length > max_request_length {
            return Err(RejectedInput {
                user: None,
                url: None,
                errors: vec![ValidationError::RequestTooLong {
                    length,
                    max: max_request_length,
                }],
            });
        }

        let (user, url) = match self {
            RunRequest::Text(text) => parse_text(text),
            RunRequest::Structured { user, url } => (non_empty(user), non_empty(url)),
        };
        validate(user, url)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Find the user identifier and URL in free text
fn parse_text(text: &str) -> (Option<String>, Option<String>) {
    let url_match = URL_TOKEN.find(text);
    let url = url_match
        .map(|m| m.as_str().trim_end_matches(TRAILING_URL_PUNCTUATION).to_string())
        .filter(|u| !u.is_empty());

    let (before, after) = match url_match {
        Some(m) => (&text[..m.start()], &text[m.end()..]),
        None => (text, ""),
    };

    let user = for_phrases(before)
        .last()
        .cloned()
        .or_else(|| for_phrases(after).first().cloned())
        .or_else(|| {
            USER_ASSIGNMENT
                .captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| clean_user(m.as_str()))
        });

    (user, url)
}

fn for_phrases(text: &str) -> Vec<String> {
    FOR_PHRASE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| clean_user(m.as_str()))
        .filter(|name| !NOT_A_USER.contains(&name.to_ascii_lowercase().as_str()))
        .collect()
}

fn clean_user(raw: &str) -> Option<String> {
    non_empty(raw.trim_end_matches([':', ',', '.']))
}

fn validate(user: Option<String>, url: Option<String>) -> Result<CapturedInput, RejectedInput> {
    let mut errors = Vec::new();

    if user.is_none() {
        errors.push(ValidationError::MissingUser);
    }
    match url.as_deref() {
        None => errors.push(ValidationError::MissingUrl),
        Some(raw) if !is_absolute_http(raw) => {
            errors.push(ValidationError::InvalidUrl(raw.to_string()))
        }
        Some(_) => {}
    }

    match (user, url) {
        (Some(user), Some(url)) if errors.is_empty() => Ok(CapturedInput { user, url }),
        (user, url) => Err(RejectedInput { user, url, errors }),
    }
}

fn is_absolute_http(raw: &str) -> bool {
    Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}
