//! Lookup of subtitle entries behind the persistent cache.

use crate::api::{ApiError, DeepLinks, JimakuClient, SearchField, SearchOutcome};
use crate::cache::CacheManager;
use crate::classifier::MediaReference;
use crate::credential::Credentials;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use shared::CacheEntry;
use tracing::{debug, info, warn};

/// How a classified page is turned into a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Link known without asking the service
    Direct(String),
    /// Search the service by external id, cached under `key`
    Search { field: SearchField, key: String },
}

impl Lookup {
    pub fn for_reference(reference: &MediaReference, links: &DeepLinks) -> Self {
        match reference {
            MediaReference::AnilistId { id } => Lookup::Search {
                field: SearchField::AnilistId,
                key: id.to_string(),
            },
            MediaReference::AnilistUser { username } => {
                Lookup::Direct(links.anilist_user(username))
            }
            MediaReference::Tmdb { kind, id } => Lookup::Search {
                field: SearchField::TmdbId,
                key: format!("{}:{}", kind, id),
            },
        }
    }
}

/// What a cache snapshot says about a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedLookup {
    CoolingDown,
    Found(u64),
    Miss,
}

impl From<Option<&CacheEntry>> for CachedLookup {
    fn from(entry: Option<&CacheEntry>) -> Self {
        match entry {
            Some(entry) if entry.is_cooldown() => CachedLookup::CoolingDown,
            Some(entry) => entry.entry_id().map_or(CachedLookup::Miss, CachedLookup::Found),
            None => CachedLookup::Miss,
        }
    }
}

/// Resolves lookup keys to deep links
pub struct LookupManager {
    client: JimakuClient,
    cache: CacheManager,
    credentials: Credentials,
    links: DeepLinks,
}

impl LookupManager {
    pub fn new(client: JimakuClient, cache: CacheManager, credentials: Credentials) -> Self {
        let links = client.links();
        Self {
            client,
            cache,
            credentials,
            links,
        }
    }

    pub fn links(&self) -> &DeepLinks {
        &self.links
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Resolve a classified page to a link, if the service has an entry
    pub async fn resolve_reference(&self, reference: &MediaReference) -> Result<Option<String>> {
        match Lookup::for_reference(reference, &self.links) {
            Lookup::Direct(url) => Ok(Some(url)),
            Lookup::Search { field, key } => self.resolve(field, &key).await,
        }
    }

    /// Resolve a lookup key to an entry link
    ///
    /// Negative outcomes cool the key down. A 401 additionally clears the
    /// stored API key. Transport failures are returned as errors and leave
    /// both the cache and the key untouched.
    pub async fn resolve(&self, field: SearchField, cache_key: &str) -> Result<Option<String>> {
        let cached = self.cache.get(cache_key)?;
        match CachedLookup::from(cached.as_ref()) {
            CachedLookup::CoolingDown => {
                debug!(key = cache_key, "Lookup suppressed by cooldown");
                return Ok(None);
            }
            CachedLookup::Found(id) => return Ok(Some(self.links.entry(id))),
            CachedLookup::Miss => {}
        }

        let Some(api_key) = self.credentials.get() else {
            debug!(key = cache_key, "No API key, skipping lookup");
            return Ok(None);
        };

        match self.client.search(field, cache_key, &api_key).await {
            Ok(SearchOutcome::Rejected(status)) => {
                if status == StatusCode::UNAUTHORIZED {
                    warn!(key = cache_key, "API key rejected by subtitle service");
                    self.credentials.clear()?;
                } else {
                    warn!(key = cache_key, status = %status, "Lookup failed");
                }
                self.cache.set_cooldown(cache_key)?;
                Ok(None)
            }
            Ok(SearchOutcome::Entries(entries)) => match entries.first() {
                Some(entry) => {
                    info!(
                        key = cache_key,
                        entry_id = entry.id,
                        name = entry.name.as_deref().unwrap_or_default(),
                        "Found subtitle entry"
                    );
                    self.cache.set_found(cache_key, entry.id)?;
                    Ok(Some(self.links.entry(entry.id)))
                }
                None => {
                    debug!(key = cache_key, "No subtitle entry");
                    self.cache.set_cooldown(cache_key)?;
                    Ok(None)
                }
            },
            Err(ApiError::Decode(e)) => {
                warn!(key = cache_key, error = %e, "Unreadable search response");
                self.cache.set_cooldown(cache_key)?;
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("Lookup for {} failed", cache_key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TmdbKind;
    use shared::KeyValueStore;
    use std::time::Duration;

    fn manager(store: &KeyValueStore) -> Result<LookupManager> {
        // Nothing listens here; any request would fail as a transport error
        let client = JimakuClient::new("http://127.0.0.1:9", "test", Duration::from_secs(1), 729)?;
        let cache = CacheManager::new(store.clone(), Duration::from_secs(600));
        let credentials = Credentials::load(store.clone())?;
        Ok(LookupManager::new(client, cache, credentials))
    }

    #[test]
    fn test_lookup_for_reference() {
        let links = DeepLinks::new("https://jimaku.cc");

        assert_eq!(
            Lookup::for_reference(&MediaReference::AnilistId { id: 21087 }, &links),
            Lookup::Search {
                field: SearchField::AnilistId,
                key: "21087".to_string()
            }
        );
        assert_eq!(
            Lookup::for_reference(
                &MediaReference::Tmdb {
                    kind: TmdbKind::Movie,
                    id: 603
                },
                &links
            ),
            Lookup::Search {
                field: SearchField::TmdbId,
                key: "movie:603".to_string()
            }
        );
        assert_eq!(
            Lookup::for_reference(
                &MediaReference::AnilistUser {
                    username: "someuser".to_string()
                },
                &links
            ),
            Lookup::Direct("https://jimaku.cc/anilist/someuser".to_string())
        );
    }

    #[test]
    fn test_cached_lookup() {
        assert_eq!(CachedLookup::from(None), CachedLookup::Miss);
        assert_eq!(
            CachedLookup::from(Some(&CacheEntry::Found { id: 4 })),
            CachedLookup::Found(4)
        );
        assert_eq!(
            CachedLookup::from(Some(&CacheEntry::Cooldown {
                cooldown: true,
                expires_at: None
            })),
            CachedLookup::CoolingDown
        );
        assert_eq!(
            CachedLookup::from(Some(&CacheEntry::Cooldown {
                cooldown: false,
                expires_at: None
            })),
            CachedLookup::Miss
        );
    }

    #[tokio::test]
    async fn test_cache_hits_skip_network() -> Result<()> {
        let store = KeyValueStore::in_memory()?;
        let manager = manager(&store)?;
        manager.cache().set_found("21087", 555)?;
        manager.cache().set_cooldown("tv:1")?;

        assert_eq!(
            manager.resolve(SearchField::AnilistId, "21087").await?,
            Some("http://127.0.0.1:9/entry/555".to_string())
        );
        assert_eq!(manager.resolve(SearchField::TmdbId, "tv:1").await?, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_username_needs_no_lookup() -> Result<()> {
        let store = KeyValueStore::in_memory()?;
        let manager = manager(&store)?;

        let url = manager
            .resolve_reference(&MediaReference::AnilistUser {
                username: "someuser".to_string(),
            })
            .await?;
        assert_eq!(url.as_deref(), Some("http://127.0.0.1:9/anilist/someuser"));

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_key_skips_lookup() -> Result<()> {
        let store = KeyValueStore::in_memory()?;
        let manager = manager(&store)?;

        assert_eq!(manager.resolve(SearchField::AnilistId, "1").await?, None);
        // No cooldown is recorded when nothing was asked
        assert_eq!(store.get_raw("1")?, None);

        Ok(())
    }
}
