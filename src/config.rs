//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults.

use crate::workflow::config::{OrchestratorConfig, RetrievalFailurePolicy};
use crate::workflow::error::ConfigurationError;
use std::env;
use std::str::FromStr;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Session store configuration
    pub session: SessionConfig,
    /// Collaborator service endpoints
    pub services: ServiceConfig,
    /// Orchestration knobs
    pub orchestrator: OrchestratorConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Which session store backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    /// Process-local map, lost on restart
    Memory,
    /// SQLite database file
    Sqlite,
}

impl FromStr for SessionBackend {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(SessionBackend::Memory),
            "sqlite" => Ok(SessionBackend::Sqlite),
            _ => Err(ConfigurationError::InvalidValue {
                key: "SESSION_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

/// Session store configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Selected backend
    pub backend: SessionBackend,
    /// SQLite database path (used by the `sqlite` backend)
    pub db_path: String,
}

/// Collaborator service endpoints
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the form extraction service
    pub extraction_url: String,
    /// Base URL of the knowledge retrieval service
    pub retrieval_url: String,
    /// Base URL of the form filling service
    pub filling_url: String,
    /// Base URL of the automation channel service; channels are minted locally when unset
    pub automation_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = OrchestratorConfig::default();

        let orchestrator = OrchestratorConfig {
            max_attempts: parse_or(&lookup, "RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            exp_base: parse_or(&lookup, "RETRY_EXP_BASE", defaults.exp_base)?,
            initial_delay_ms: parse_or(&lookup, "RETRY_INITIAL_DELAY_MS", defaults.initial_delay_ms)?,
            extraction_timeout_secs: parse_or(
                &lookup,
                "EXTRACTION_TIMEOUT_SECS",
                defaults.extraction_timeout_secs,
            )?,
            retrieval_timeout_secs: parse_or(
                &lookup,
                "RETRIEVAL_TIMEOUT_SECS",
                defaults.retrieval_timeout_secs,
            )?,
            filling_timeout_secs: parse_or(
                &lookup,
                "FILLING_TIMEOUT_SECS",
                defaults.filling_timeout_secs,
            )?,
            channel_connect_timeout_secs: parse_or(
                &lookup,
                "CHANNEL_CONNECT_TIMEOUT_SECS",
                defaults.channel_connect_timeout_secs,
            )?,
            retrieval_failure_policy: match lookup("RETRIEVAL_FAILURE_POLICY") {
                Some(raw) => raw.parse()?,
                None => RetrievalFailurePolicy::default(),
            },
            keep_channel_open: parse_or(&lookup, "KEEP_CHANNEL_OPEN", defaults.keep_channel_open)?,
            max_request_length: parse_or(
                &lookup,
                "MAX_REQUEST_LENGTH",
                defaults.max_request_length,
            )?,
        };
        orchestrator.validate()?;

        Ok(Self {
            server: ServerConfig {
                port: lookup("PORT")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            },
            session: SessionConfig {
                backend: match lookup("SESSION_BACKEND") {
                    Some(raw) => raw.parse()?,
                    None => SessionBackend::Memory,
                },
                db_path: lookup("SESSION_DB_PATH").unwrap_or_else(|| {
                    // Default to ~/.job-application or current directory
                    if let Some(home) = env::var_os("HOME") {
                        format!("{}/.job-application/sessions.db", home.to_string_lossy())
                    } else {
                        ".job-application/sessions.db".to_string()
                    }
                }),
            },
            services: ServiceConfig {
                extraction_url: lookup("EXTRACTION_SERVICE_URL")
                    .unwrap_or_else(|| "http://127.0.0.1:8001".to_string()),
                retrieval_url: lookup("RETRIEVAL_SERVICE_URL")
                    .unwrap_or_else(|| "http://127.0.0.1:8002".to_string()),
                filling_url: lookup("FILLING_SERVICE_URL")
                    .unwrap_or_else(|| "http://127.0.0.1:8001".to_string()),
                automation_url: lookup("AUTOMATION_SERVICE_URL").filter(|u| !u.trim().is_empty()),
            },
            orchestrator,
        })
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigurationError::InvalidValue {
                key,
                value: raw.clone(),
            }),
        None => Ok(default),
    }
}
