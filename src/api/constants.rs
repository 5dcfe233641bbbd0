//! API constants
//!
//! Centralized constants used by the HTTP handlers.

/// SSE stream termination signal
pub const SSE_DONE_SIGNAL: &str = "[DONE]";

/// SSE error prefix
pub const SSE_ERROR_PREFIX: &str = "[ERROR]";

/// Response header carrying the id of the run that produced a report
pub const RUN_ID_HEADER: &str = "x-run-id";
