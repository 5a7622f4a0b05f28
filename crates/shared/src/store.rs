//! Persistent key-value store.
//!
//! Values are JSON documents kept in the `storage` table. Every write that
//! changes a key is published as a [`StorageChange`] so that in-memory views
//! (such as the loaded API key) can follow edits made elsewhere.

use crate::Database;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A single key transition
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    /// `None` when the key was removed
    pub new_value: Option<Value>,
}

/// Shared handle to the key-value store
#[derive(Clone)]
pub struct KeyValueStore {
    db: Arc<Mutex<Database>>,
    changes: broadcast::Sender<StorageChange>,
}

impl KeyValueStore {
    /// Create a store on top of an opened database
    pub fn new(db: Database) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            db: Arc::new(Mutex::new(db)),
            changes,
        }
    }

    /// Store backed by a fresh in-memory database
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| anyhow!("Storage lock poisoned"))
    }

    /// Subscribe to changes made after this call
    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    /// Read the raw JSON value for a key
    pub fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        let db = self.lock()?;
        read_value(&db, key)
    }

    /// Read and deserialize the value for a key
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key)? {
            Some(value) => {
                let parsed = serde_json::from_value(value)
                    .with_context(|| format!("Failed to decode stored value for {}", key))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// Insert or replace the value for a key
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let new_value = serde_json::to_value(value).context("Failed to serialize stored value")?;

        let old_value = {
            let db = self.lock()?;
            let old_value = read_value(&db, key)?;

            db.conn()
                .execute(
                    "INSERT INTO storage (key, value, updated_at)
                     VALUES (?1, ?2, CURRENT_TIMESTAMP)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![key, new_value.to_string()],
                )
                .with_context(|| format!("Failed to store value for {}", key))?;

            old_value
        };

        debug!(key = key, "Stored value");

        if old_value.as_ref() != Some(&new_value) {
            self.publish(StorageChange {
                key: key.to_string(),
                old_value,
                new_value: Some(new_value),
            });
        }

        Ok(())
    }

    /// Remove a key, returning whether it existed
    pub fn remove(&self, key: &str) -> Result<bool> {
        let old_value = {
            let db = self.lock()?;
            let old_value = read_value(&db, key)?;
            if old_value.is_some() {
                db.conn()
                    .execute("DELETE FROM storage WHERE key = ?1", params![key])
                    .with_context(|| format!("Failed to remove {}", key))?;
            }
            old_value
        };

        let existed = old_value.is_some();
        if existed {
            debug!(key = key, "Removed value");
            self.publish(StorageChange {
                key: key.to_string(),
                old_value,
                new_value: None,
            });
        }

        Ok(existed)
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Result<Vec<String>> {
        let db = self.lock()?;
        let mut stmt = db
            .conn()
            .prepare("SELECT key FROM storage ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("Failed to list storage keys")?;
        Ok(keys)
    }

    /// All stored key/value pairs, sorted by key
    pub fn entries(&self) -> Result<Vec<(String, Value)>> {
        let db = self.lock()?;
        let mut stmt = db
            .conn()
            .prepare("SELECT key, value FROM storage ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list storage entries")?;

        rows.into_iter()
            .map(|(key, raw)| -> Result<(String, Value)> {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt stored value for {}", key))?;
                Ok((key, value))
            })
            .collect()
    }

    fn publish(&self, change: StorageChange) {
        // No subscribers is not an error
        let _ = self.changes.send(change);
    }
}

fn read_value(db: &Database, key: &str) -> Result<Option<Value>> {
    let raw: Option<String> = db
        .conn()
        .query_row(
            "SELECT value FROM storage WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("Failed to read {}", key))?;

    raw.map(|raw| {
        serde_json::from_str(&raw).with_context(|| format!("Corrupt stored value for {}", key))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_set_get_remove() -> Result<()> {
        let store = KeyValueStore::in_memory()?;

        assert_eq!(store.get::<String>("apiKey")?, None);

        store.set("apiKey", &"secret")?;
        assert_eq!(store.get::<String>("apiKey")?, Some("secret".to_string()));

        assert!(store.remove("apiKey")?);
        assert!(!store.remove("apiKey")?);
        assert_eq!(store.get_raw("apiKey")?, None);

        Ok(())
    }

    #[test]
    fn test_set_overwrites() -> Result<()> {
        let store = KeyValueStore::in_memory()?;

        store.set("21087", &json!({"cooldown": true}))?;
        store.set("21087", &json!({"id": 555}))?;

        assert_eq!(store.get_raw("21087")?, Some(json!({"id": 555})));
        assert_eq!(store.keys()?, vec!["21087".to_string()]);

        Ok(())
    }

    #[test]
    fn test_changes_are_published() -> Result<()> {
        let store = KeyValueStore::in_memory()?;
        let mut rx = store.subscribe();

        store.set("apiKey", &"first")?;
        store.set("apiKey", &"first")?; // unchanged, not published
        store.remove("apiKey")?;

        let first = rx.try_recv()?;
        assert_eq!(first.key, "apiKey");
        assert_eq!(first.old_value, None);
        assert_eq!(first.new_value, Some(json!("first")));

        let removed = rx.try_recv()?;
        assert_eq!(removed.old_value, Some(json!("first")));
        assert_eq!(removed.new_value, None);

        assert!(rx.try_recv().is_err());

        Ok(())
    }

    #[test]
    fn test_persists_across_reopen() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("storage.db");

        KeyValueStore::new(Database::open(&path)?).set("tv:12345", &json!({"id": 9}))?;

        let store = KeyValueStore::new(Database::open(&path)?);
        let entries = store.entries()?;
        assert_eq!(entries, vec![("tv:12345".to_string(), json!({"id": 9}))]);

        Ok(())
    }
}
