//! URL classification for supported metadata sites.
//!
//! Three matchers are tried in a fixed order against the start of the URL:
//! AniList anime pages, AniList user pages, then TMDB tv/movie pages.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static ANILIST_ANIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://anilist\.co/anime/(\d+)/").expect("valid regex"));

static ANILIST_USER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://anilist\.co/user/([^/]+)/").expect("valid regex"));

static TMDB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://(?:www\.)?themoviedb\.org/(tv|movie)/(\d+)(?:-[a-zA-Z0-9\-]+)?(?:/.*)?")
        .expect("valid regex")
});

/// TMDB media kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TmdbKind {
    Tv,
    Movie,
}

impl TmdbKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TmdbKind::Tv => "tv",
            TmdbKind::Movie => "movie",
        }
    }
}

impl fmt::Display for TmdbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page recognised by the classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaReference {
    /// AniList anime page
    AnilistId { id: u64 },
    /// AniList user profile
    AnilistUser { username: String },
    /// TMDB tv show or movie page
    Tmdb { kind: TmdbKind, id: u64 },
}

impl fmt::Display for MediaReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaReference::AnilistId { id } => write!(f, "anilist:{}", id),
            MediaReference::AnilistUser { username } => write!(f, "anilist-user:{}", username),
            MediaReference::Tmdb { kind, id } => write!(f, "tmdb:{}:{}", kind, id),
        }
    }
}

/// Extract the AniList anime id from a URL
pub fn anilist_id(url: &str) -> Option<u64> {
    let caps = ANILIST_ANIME.captures(url)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Extract the AniList username from a profile URL
pub fn anilist_username(url: &str) -> Option<String> {
    let caps = ANILIST_USER.captures(url)?;
    Some(caps.get(1)?.as_str().to_string())
}

/// Extract the TMDB kind and id from a URL
pub fn tmdb_reference(url: &str) -> Option<(TmdbKind, u64)> {
    let caps = TMDB.captures(url)?;
    let kind = match caps.get(1)?.as_str() {
        "tv" => TmdbKind::Tv,
        "movie" => TmdbKind::Movie,
        _ => return None,
    };
    let id = caps.get(2)?.as_str().parse().ok()?;
    Some((kind, id))
}

/// Classify a URL, trying the matchers in priority order
pub fn classify(url: &str) -> Option<MediaReference> {
    if let Some(id) = anilist_id(url) {
        return Some(MediaReference::AnilistId { id });
    }
    if let Some(username) = anilist_username(url) {
        return Some(MediaReference::AnilistUser { username });
    }
    tmdb_reference(url).map(|(kind, id)| MediaReference::Tmdb { kind, id })
}
