//! Jimaku API response types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// External id field accepted by the search endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    AnilistId,
    TmdbId,
}

impl SearchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchField::AnilistId => "anilist_id",
            SearchField::TmdbId => "tmdb_id",
        }
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subtitle entry as returned by `/api/entries/search`
///
/// Only `id` is relied upon; the rest is kept for logging and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub english_name: Option<String>,
    #[serde(default)]
    pub japanese_name: Option<String>,
    #[serde(default)]
    pub anilist_id: Option<u64>,
    #[serde(default)]
    pub tmdb_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_minimal() {
        let entries: Vec<Entry> = serde_json::from_str(r#"[{"id": 555}]"#).unwrap();
        assert_eq!(entries[0].id, 555);
        assert_eq!(entries[0].name, None);
    }

    #[test]
    fn test_entry_ignores_unknown_fields() {
        let entry: Entry = serde_json::from_str(
            r#"{
                "id": 729,
                "name": "Sousou no Frieren",
                "flags": 4,
                "last_modified": "2024-03-22T12:00:00Z",
                "anilist_id": 154587,
                "tmdb_id": "tv:209867"
            }"#,
        )
        .unwrap();
        assert_eq!(entry.anilist_id, Some(154587));
        assert_eq!(entry.tmdb_id.as_deref(), Some("tv:209867"));
    }

    #[test]
    fn test_search_field_names() {
        assert_eq!(SearchField::AnilistId.as_str(), "anilist_id");
        assert_eq!(SearchField::TmdbId.to_string(), "tmdb_id");
    }
}
