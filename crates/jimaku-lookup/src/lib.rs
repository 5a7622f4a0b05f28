//! Subtitle lookup for anime and TV/movie metadata pages.
//!
//! Recognises AniList and TMDB page URLs, looks the referenced media up on
//! Jimaku behind a persistent cache with cooldowns for failed lookups, and
//! drives a per-tab indicator that links to the matching subtitle entry.

pub mod api;
pub mod cache;
pub mod classifier;
pub mod credential;
pub mod resolver;
pub mod settings;
pub mod tab;

pub use api::{ApiError, DeepLinks, Entry, JimakuClient, SearchField, SearchOutcome};
pub use cache::{CacheManager, CacheStats};
pub use classifier::{classify, MediaReference, TmdbKind};
pub use credential::Credentials;
pub use resolver::{Lookup, LookupManager};
pub use settings::{CredentialSettings, SaveOutcome};
pub use tab::{ClickOutcome, Host, IndicatorMode, Tab, TabActionHandler, TabId, TabState};
