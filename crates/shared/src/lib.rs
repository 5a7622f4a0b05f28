//! Shared library for the jimaku-button workspace.
//!
//! This crate provides common functionality used by the lookup library and CLI:
//! - Configuration management
//! - SQLite database handle
//! - Persistent key-value store with change notifications
//! - Persisted data models
//! - Logging infrastructure

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use logging::LogConfig;
pub use models::*;
pub use store::{KeyValueStore, StorageChange};

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
