// Repository pattern - isolates the persisted token slot
use rusqlite::params;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::db::DbPool;
use crate::error::{ClientError, ClientResult};

pub const TOKEN_KEY: &str = "auth_token";

/// A namespaced key-value slot that survives restarts.
pub trait TokenRepository: Send + Sync {
    fn load(&self, namespace: &str, key: &str) -> ClientResult<Option<String>>;

    /// Idempotent upsert
    fn save(&self, namespace: &str, key: &str, value: &str) -> ClientResult<()>;

    /// Returns whether a value was present
    fn remove(&self, namespace: &str, key: &str) -> ClientResult<bool>;
}

/// SQLite implementation
pub struct SqliteTokenRepository {
    pool: DbPool,
}

impl SqliteTokenRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl TokenRepository for SqliteTokenRepository {
    fn load(&self, namespace: &str, key: &str) -> ClientResult<Option<String>> {
        let conn = self.pool.get()?;

        let result: Result<String, rusqlite::Error> = conn.query_row(
            "SELECT value FROM preferences WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, namespace: &str, key: &str, value: &str) -> ClientResult<()> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO preferences (namespace, key, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(namespace, key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![namespace, key, value],
        )?;

        Ok(())
    }

    fn remove(&self, namespace: &str, key: &str) -> ClientResult<bool> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "DELETE FROM preferences WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;

        Ok(rows > 0)
    }
}

/// In-process implementation for tests and offline mode.
#[derive(Default)]
pub struct MemoryTokenRepository {
    slots: Mutex<HashMap<(String, String), String>>,
}

impl MemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenRepository for MemoryTokenRepository {
    fn load(&self, namespace: &str, key: &str) -> ClientResult<Option<String>> {
        let slots = self
            .slots
            .lock()
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        Ok(slots.get(&(namespace.to_string(), key.to_string())).cloned())
    }

    fn save(&self, namespace: &str, key: &str, value: &str) -> ClientResult<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        slots.insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn remove(&self, namespace: &str, key: &str) -> ClientResult<bool> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        Ok(slots
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }
}
