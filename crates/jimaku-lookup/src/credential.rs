//! In-memory view of the subtitle service API key.
//!
//! The key is loaded once from the store and then kept in sync by applying
//! storage changes, so edits made by the settings surface take effect
//! without a restart.

use anyhow::Result;
use shared::{KeyValueStore, StorageChange, API_KEY};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shared credential context
#[derive(Clone)]
pub struct Credentials {
    current: Arc<RwLock<Option<String>>>,
    store: KeyValueStore,
}

impl Credentials {
    /// Load the stored API key, if any
    pub fn load(store: KeyValueStore) -> Result<Self> {
        let current: Option<String> = store.get(API_KEY)?;
        debug!(authenticated = current.is_some(), "Loaded credentials");
        Ok(Self {
            current: Arc::new(RwLock::new(current)),
            store,
        })
    }

    /// Current API key
    pub fn get(&self) -> Option<String> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Replace the in-memory key without touching the store
    pub fn set(&self, api_key: Option<String>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = api_key;
    }

    /// Forget the key in memory and in the store
    pub fn clear(&self) -> Result<()> {
        self.set(None);
        self.store.remove(API_KEY)?;
        info!("Credentials cleared");
        Ok(())
    }

    /// The store the key is persisted in
    pub fn store(&self) -> &KeyValueStore {
        &self.store
    }

    /// Mirror a storage change into memory; other keys are ignored
    pub fn apply_change(&self, change: &StorageChange) {
        if change.key != API_KEY {
            return;
        }

        let api_key = change
            .new_value
            .as_ref()
            .and_then(|v| v.as_str())
            .map(str::to_string);

        debug!(authenticated = api_key.is_some(), "API key changed");
        self.set(api_key);
    }

    /// Keep the in-memory key in sync with the store until it is dropped
    pub fn watch(&self) -> JoinHandle<()> {
        let this = self.clone();
        let mut changes = self.store.subscribe();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => this.apply_change(&change),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Storage changes lagged, reloading API key");
                        match this.store.get::<String>(API_KEY) {
                            Ok(api_key) => this.set(api_key),
                            Err(e) => warn!(error = %e, "Failed to reload API key"),
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_and_clear() -> Result<()> {
        let store = KeyValueStore::in_memory()?;
        store.set(API_KEY, &"secret")?;

        let credentials = Credentials::load(store.clone())?;
        assert_eq!(credentials.get().as_deref(), Some("secret"));

        credentials.clear()?;
        assert!(!credentials.is_authenticated());
        assert_eq!(store.get_raw(API_KEY)?, None);

        Ok(())
    }

    #[test]
    fn test_apply_change() -> Result<()> {
        let credentials = Credentials::load(KeyValueStore::in_memory()?)?;
        assert!(!credentials.is_authenticated());

        credentials.apply_change(&StorageChange {
            key: "21087".to_string(),
            old_value: None,
            new_value: Some(json!({"id": 1})),
        });
        assert!(!credentials.is_authenticated());

        credentials.apply_change(&StorageChange {
            key: API_KEY.to_string(),
            old_value: None,
            new_value: Some(json!("fresh")),
        });
        assert_eq!(credentials.get().as_deref(), Some("fresh"));

        credentials.apply_change(&StorageChange {
            key: API_KEY.to_string(),
            old_value: Some(json!("fresh")),
            new_value: None,
        });
        assert_eq!(credentials.get(), None);

        Ok(())
    }

    #[tokio::test]
    async fn test_watch_follows_store() -> Result<()> {
        let store = KeyValueStore::in_memory()?;
        let credentials = Credentials::load(store.clone())?;
        let watcher = credentials.watch();

        store.set(API_KEY, &"from-settings")?;
        for _ in 0..100 {
            if credentials.is_authenticated() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(credentials.get().as_deref(), Some("from-settings"));

        watcher.abort();
        Ok(())
    }
}
