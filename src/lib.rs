//! Job Application Backend Library
//!
//! Orchestrates "apply for <user> at <url>" runs: form field extraction,
//! knowledge retrieval and form filling, with retries, per-run session state
//! and a final aggregated report.
//! The HTTP server binary is in `src/main.rs`.

pub mod api;
pub mod config;
pub mod error;
pub mod retry;
/// Per-run session state storage
pub mod session;
pub mod stages;
/// Application state management
///
/// Handles the shared orchestrator and the registry of in-flight runs.
pub mod state;
pub mod workflow;
