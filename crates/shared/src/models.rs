//! Data models persisted in the key-value store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage key holding the subtitle service API key
pub const API_KEY: &str = "apiKey";

/// Cached outcome of a subtitle lookup, stored under the lookup key
/// (`"21087"` for a catalog id, `"tv:12345"` for a database reference).
///
/// Serialized as `{"id": 555}` or `{"cooldown": true, "expires_at": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheEntry {
    /// Negative result; suppresses lookups until it is removed
    Cooldown {
        cooldown: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
    },
    /// Remote entry found; never expires on its own
    Found { id: u64 },
}

impl CacheEntry {
    pub fn cooldown_until(expires_at: DateTime<Utc>) -> Self {
        CacheEntry::Cooldown {
            cooldown: true,
            expires_at: Some(expires_at),
        }
    }

    pub fn is_cooldown(&self) -> bool {
        matches!(self, CacheEntry::Cooldown { cooldown: true, .. })
    }

    /// Remote entry id for positive entries
    pub fn entry_id(&self) -> Option<u64> {
        match self {
            CacheEntry::Found { id } => Some(*id),
            CacheEntry::Cooldown { .. } => None,
        }
    }

    /// Expiry of a cooldown entry, if it carries one
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            CacheEntry::Cooldown { expires_at, .. } => *expires_at,
            CacheEntry::Found { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_found_wire_format() {
        let entry = CacheEntry::Found { id: 555 };
        assert_eq!(serde_json::to_string(&entry).unwrap(), r#"{"id":555}"#);
        assert_eq!(entry.entry_id(), Some(555));
        assert!(!entry.is_cooldown());
    }

    #[test]
    fn test_cooldown_wire_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let entry = CacheEntry::cooldown_until(at);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["cooldown"], true);
        assert_eq!(entry.expires_at(), Some(at));

        let parsed: CacheEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_bare_cooldown_is_accepted() {
        // Entries written without an expiry still count as cooldowns
        let parsed: CacheEntry = serde_json::from_str(r#"{"cooldown":true}"#).unwrap();
        assert!(parsed.is_cooldown());
        assert_eq!(parsed.expires_at(), None);
    }
}
