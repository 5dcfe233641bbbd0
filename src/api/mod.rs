//! API module
//!
//! Contains HTTP request handlers for starting and inspecting workflow runs

pub mod apply;
pub mod constants;
pub mod runs;

pub use apply::{apply, apply_stream, ApplyRequest};
pub use runs::{cancel_run, delete_run, get_config, get_run, health};
