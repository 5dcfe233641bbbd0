//! Stage adapters module
//!
//! Thin typed contracts between the orchestrator and the three external
//! collaborators (Extraction, Retrieval, Filling), plus the automation
//! channel handle shared by Extraction and Filling.

pub mod channel;
pub mod collaborators;
pub mod error;
pub mod extraction;
pub mod filling;
pub mod http;
pub mod result;
pub mod retrieval;
pub mod types;

pub use channel::{AutomationChannel, ChannelProvider, LocalChannelProvider};
pub use collaborators::{ExtractionBackend, FillingBackend, RetrievalBackend};
pub use error::CollaboratorError;
pub use extraction::ExtractionAdapter;
pub use filling::FillingAdapter;
pub use http::{HttpChannelProvider, HttpCollaborator};
pub use result::StageResult;
pub use retrieval::{build_query, RetrievalAdapter, RetrievedData};
