//! Jimaku subtitle service client.
//!
//! This module provides the authenticated search client, the response types
//! and deep-link construction for entries and AniList profiles.

pub mod client;
pub mod links;
pub mod types;

pub use client::{ApiError, JimakuClient, SearchOutcome};
pub use links::DeepLinks;
pub use types::*;
