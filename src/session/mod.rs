//! Session state module
//!
//! Per-run key/value state holding captured inputs and raw stage outputs.
//! Writes are best-effort from the orchestrator's point of view: a failing
//! store degrades observability, never the run itself.

pub mod db;
pub mod memory;
pub mod models;

pub use db::SqliteSessionStore;
pub use memory::InMemorySessionStore;
pub use models::{SessionEntry, SessionKey, StoreError};

use crate::workflow::types::RunId;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Run-scoped key/value store
///
/// Implementations must support concurrent access from independent runs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write `value` under `(run_id, key)`, replacing any previous value
    async fn put(&self, run_id: RunId, key: SessionKey, value: Value) -> Result<(), StoreError>;

    /// Read the value under `(run_id, key)`
    async fn get(&self, run_id: RunId, key: SessionKey) -> Result<Option<Value>, StoreError>;

    /// Snapshot of every entry of a run
    async fn entries(&self, run_id: RunId) -> Result<BTreeMap<SessionKey, Value>, StoreError>;

    /// Delete every entry of a run, returning how many were removed
    async fn purge(&self, run_id: RunId) -> Result<usize, StoreError>;
}
