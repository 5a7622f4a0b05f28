//! Lookup cache with self-expiring cooldown entries.
//!
//! Positive results are stored permanently. Negative results are stored as
//! cooldown entries; each one owns a scheduled removal task whose abort
//! handle is kept next to the key, so overwriting the key cancels it.

use anyhow::{Context, Result};
use chrono::Utc;
use shared::{CacheEntry, KeyValueStore, API_KEY};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

struct PendingExpiry {
    generation: u64,
    handle: AbortHandle,
}

/// Cache manager for lookup results
#[derive(Clone)]
pub struct CacheManager {
    store: KeyValueStore,
    cooldown: Duration,
    timers: Arc<Mutex<HashMap<String, PendingExpiry>>>,
    generation: Arc<AtomicU64>,
}

impl CacheManager {
    /// Create a new cache manager
    pub fn new(store: KeyValueStore, cooldown: Duration) -> Self {
        Self {
            store,
            cooldown,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get the cache entry for a key
    ///
    /// Cooldowns whose recorded expiry has already passed are purged and
    /// reported as a miss.
    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entry: Option<CacheEntry> = self.store.get(key)?;

        match entry {
            Some(entry) if entry.is_cooldown() && is_expired(&entry) => {
                debug!(key = key, "Cooldown already expired");
                self.remove_if_cooldown(key)?;
                Ok(None)
            }
            Some(entry) => {
                debug!(key = key, cooldown = entry.is_cooldown(), "Cache hit");
                Ok(Some(entry))
            }
            None => {
                debug!(key = key, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Store a positive result
    pub fn set_found(&self, key: &str, id: u64) -> Result<()> {
        self.cancel_expiry(key);
        self.store.set(key, &CacheEntry::Found { id })?;
        info!(key = key, entry_id = id, "Cached subtitle entry");
        Ok(())
    }

    /// Store a cooldown entry and schedule its removal
    ///
    /// Must be called from within a Tokio runtime.
    pub fn set_cooldown(&self, key: &str) -> Result<()> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.cooldown).context("Cooldown out of range")?;

        self.cancel_expiry(key);
        self.store.set(key, &CacheEntry::cooldown_until(expires_at))?;
        self.schedule_expiry(key, self.cooldown);

        info!(key = key, expires_at = %expires_at, "Lookup cooling down");
        Ok(())
    }

    /// Delete the entry for a key only if it is still a cooldown
    pub fn remove_if_cooldown(&self, key: &str) -> Result<bool> {
        let entry: Option<CacheEntry> = self.store.get(key)?;
        match entry {
            Some(entry) if entry.is_cooldown() => {
                self.store.remove(key)?;
                debug!(key = key, "Cooldown removed");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Re-arm removal tasks for cooldowns persisted by an earlier process
    ///
    /// Must be called from within a Tokio runtime. Returns the number of
    /// cooldowns still pending.
    pub fn restore_cooldowns(&self) -> Result<usize> {
        let now = Utc::now();
        let mut pending = 0;

        for (key, value) in self.store.entries()? {
            if key == API_KEY {
                continue;
            }
            let Ok(entry) = serde_json::from_value::<CacheEntry>(value) else {
                warn!(key = %key, "Skipping unreadable cache entry");
                continue;
            };
            if !entry.is_cooldown() {
                continue;
            }

            // Entries without an expiry get a full cooldown from now
            let remaining = match entry.expires_at() {
                Some(at) => (at - now).to_std().ok(),
                None => Some(self.cooldown),
            };

            match remaining {
                Some(delay) if !delay.is_zero() => {
                    self.schedule_expiry(&key, delay);
                    pending += 1;
                }
                _ => {
                    self.remove_if_cooldown(&key)?;
                }
            }
        }

        if pending > 0 {
            info!(pending, "Restored cooldown timers");
        }
        Ok(pending)
    }

    /// Remove every cache entry, leaving settings in place
    pub fn clear(&self) -> Result<usize> {
        for (_, pending) in self.timers().drain() {
            pending.handle.abort();
        }

        let mut removed = 0;
        for key in self.store.keys()? {
            if key != API_KEY && self.store.remove(&key)? {
                removed += 1;
            }
        }

        info!(removed, "Cache cleared");
        Ok(removed)
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();

        for (key, value) in self.store.entries()? {
            if key == API_KEY {
                continue;
            }
            match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) if entry.is_cooldown() => stats.cooling_down += 1,
                Ok(_) => stats.found += 1,
                Err(_) => stats.unreadable += 1,
            }
        }
        stats.pending_expiries = self.timers().len();

        Ok(stats)
    }

    fn schedule_expiry(&self, key: &str, delay: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let this = self.clone();
        let owned_key = key.to_string();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = this.remove_if_cooldown(&owned_key) {
                warn!(key = %owned_key, error = %e, "Failed to expire cooldown");
            }
            this.forget_expiry(&owned_key, generation);
        });

        let previous = self.timers().insert(
            key.to_string(),
            PendingExpiry {
                generation,
                handle: task.abort_handle(),
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    fn cancel_expiry(&self, key: &str) {
        if let Some(pending) = self.timers().remove(key) {
            pending.handle.abort();
            debug!(key = key, "Cancelled pending cooldown expiry");
        }
    }

    fn forget_expiry(&self, key: &str, generation: u64) {
        let mut timers = self.timers();
        if timers.get(key).map(|p| p.generation) == Some(generation) {
            timers.remove(key);
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<String, PendingExpiry>> {
        // The map holds only abort handles; a poisoned guard is still usable
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn is_expired(entry: &CacheEntry) -> bool {
    entry.expires_at().is_some_and(|at| at <= Utc::now())
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub found: usize,
    pub cooling_down: usize,
    pub unreadable: usize,
    pub pending_expiries: usize,
}
