// State management module
// Handles the shared orchestrator and the registry of active runs

pub mod app_state;

pub use app_state::AppState;
