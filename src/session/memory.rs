//! In-memory session store
//!
//! Process-local backend used by default and in tests. State is lost on
//! restart.

use crate::session::models::{SessionKey, StoreError};
use crate::session::SessionStore;
use crate::workflow::types::RunId;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Session store backed by a map of runs
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    runs: RwLock<HashMap<RunId, BTreeMap<SessionKey, Value>>>,
}

impl InMemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs with at least one entry
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn put(&self, run_id: RunId, key: SessionKey, value: Value) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        runs.entry(run_id).or_default().insert(key, value);
        Ok(())
    }

    async fn get(&self, run_id: RunId, key: SessionKey) -> Result<Option<Value>, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).and_then(|entries| entries.get(&key)).cloned())
    }

    async fn entries(&self, run_id: RunId) -> Result<BTreeMap<SessionKey, Value>, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned().unwrap_or_default())
    }

    async fn purge(&self, run_id: RunId) -> Result<usize, StoreError> {
        let mut runs = self.runs.write().await;
        Ok(runs.remove(&run_id).map(|entries| entries.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_then_get() {
        let store = InMemorySessionStore::new();
        let run = RunId::new();
        store.put(run, SessionKey::User, json!("alice")).await.unwrap();

        assert_eq!(
            store.get(run, SessionKey::User).await.unwrap(),
            Some(json!("alice"))
        );
        assert_eq!(store.get(run, SessionKey::Url).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_runs_are_isolated() {
        let store = InMemorySessionStore::new();
        let first = RunId::new();
        let second = RunId::new();
        store.put(first, SessionKey::User, json!("alice")).await.unwrap();
        store.put(second, SessionKey::User, json!("bob")).await.unwrap();

        assert_eq!(
            store.get(first, SessionKey::User).await.unwrap(),
            Some(json!("alice"))
        );
        assert_eq!(
            store.get(second, SessionKey::User).await.unwrap(),
            Some(json!("bob"))
        );
    }

    #[tokio::test]
    async fn test_purge_removes_only_that_run() {
        let store = InMemorySessionStore::new();
        let first = RunId::new();
        let second = RunId::new();
        store.put(first, SessionKey::User, json!("alice")).await.unwrap();
        store.put(first, SessionKey::Url, json!("https://a.example")).await.unwrap();
        store.put(second, SessionKey::User, json!("bob")).await.unwrap();

        assert_eq!(store.purge(first).await.unwrap(), 2);
        assert!(store.entries(first).await.unwrap().is_empty());
        assert_eq!(store.entries(second).await.unwrap().len(), 1);
        assert_eq!(store.purge(first).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_do_not_interfere() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let run = RunId::new();
                store
                    .put(run, SessionKey::User, json!(format!("user-{}", i)))
                    .await
                    .unwrap();
                store
                    .put(run, SessionKey::State, json!("EXTRACTING"))
                    .await
                    .unwrap();
                (run, i)
            }));
        }

        for handle in handles {
            let (run, i) = handle.await.unwrap();
            let entries = store.entries(run).await.unwrap();
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[&SessionKey::User], json!(format!("user-{}", i)));
        }
        assert_eq!(store.run_count().await, 16);
    }
}
