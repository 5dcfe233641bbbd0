//! SQLite session store
//!
//! Durable backend so a crashed or resumed run can be inspected without
//! re-querying collaborators.

use crate::session::models::{SessionEntry, SessionKey, StoreError};
use crate::session::SessionStore;
use crate::workflow::types::RunId;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Session store backed by a SQLite connection pool
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (or create) the database and run migrations
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file, or a `sqlite:` URL
    ///
    /// # Returns
    /// * `Ok(SqliteSessionStore)` if successful
    /// * `Err(StoreError)` if the directory, connection or migrations failed
    pub async fn new(db_path: &str) -> Result<Self, StoreError> {
        if !db_path.starts_with("sqlite:") {
            if let Some(parent) = PathBuf::from(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::Backend(format!("Failed to create db directory: {}", e))
                    })?;
                }
            }
        }

        let connection_string = if db_path.starts_with("sqlite:") {
            db_path.to_string()
        } else {
            format!("sqlite:{}", db_path)
        };

        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| StoreError::Backend(format!("Invalid database path: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect to database: {}", e)))?;

        info!("Connected to session database at: {}", db_path);

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running session store migrations...");

        let migration_sql = include_str!("../../migrations/001_create_session_state.sql");

        // Strip comments and split into individual statements
        let mut cleaned_sql = String::new();
        for line in migration_sql.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }
            let without_comments = match trimmed.find("--") {
                Some(comment_pos) => &trimmed[..comment_pos],
                None => trimmed,
            };
            cleaned_sql.push_str(without_comments.trim());
            cleaned_sql.push(' ');
        }

        let statements: Vec<&str> = cleaned_sql
            .split(';')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    StoreError::Backend(format!(
                        "Migration failed: {} - Statement: {}",
                        e,
                        statement.chars().take(100).collect::<String>()
                    ))
                })?;
        }

        info!("Session store migrations completed successfully");
        Ok(())
    }

    /// Get the database pool
    #[allow(dead_code)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn put(&self, run_id: RunId, key: SessionKey, value: Value) -> Result<(), StoreError> {
        let encoded =
            serde_json::to_string(&value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let updated_at = chrono::Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO session_state (run_id, key, value, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(run_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(run_id.to_string())
        .bind(key.as_str())
        .bind(encoded)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("Failed to write session entry: {}", e)))?;

        debug!(run_id = %run_id, key = %key, "Stored session entry");
        Ok(())
    }

    async fn get(&self, run_id: RunId, key: SessionKey) -> Result<Option<Value>, StoreError> {
        let entry = sqlx::query_as::<_, SessionEntry>(
            "SELECT run_id, key, value, updated_at FROM session_state WHERE run_id = ? AND key = ?",
        )
        .bind(run_id.to_string())
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("Failed to read session entry: {}", e)))?;

        entry
            .map(|entry| {
                serde_json::from_str(&entry.value)
                    .map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .transpose()
    }

    async fn entries(&self, run_id: RunId) -> Result<BTreeMap<SessionKey, Value>, StoreError> {
        let rows = sqlx::query_as::<_, SessionEntry>(
            "SELECT run_id, key, value, updated_at FROM session_state WHERE run_id = ? ORDER BY key ASC",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("Failed to read session entries: {}", e)))?;

        let mut entries = BTreeMap::new();
        for row in rows {
            let Some(key) = SessionKey::parse(&row.key) else {
                warn!(run_id = %run_id, key = %row.key, "Skipping unknown session key");
                continue;
            };
            let value = serde_json::from_str(&row.value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            entries.insert(key, value);
        }
        Ok(entries)
    }

    async fn purge(&self, run_id: RunId) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM session_state WHERE run_id = ?")
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to purge run: {}", e)))?;

        debug!(run_id = %run_id, removed = result.rows_affected(), "Purged run");
        Ok(result.rows_affected() as usize)
    }
}
