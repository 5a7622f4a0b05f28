//! Database operations for SQLite.
//!
//! This module handles database connections, schema creation, and migrations.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

/// Schema version written by `schema.sql`
pub const SCHEMA_VERSION: i32 = 1;

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "Opening database");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        Self::init(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let mut db = Self { conn };

        if db.get_version()? == 0 {
            info!("Creating new database schema");
            db.create_schema()?;
        } else {
            db.run_migrations()?;
        }

        Ok(db)
    }

    /// Create the database schema
    fn create_schema(&mut self) -> Result<()> {
        self.conn
            .execute_batch(include_str!("../schema.sql"))
            .context("Failed to create database schema")?;

        info!("Database schema created successfully");
        Ok(())
    }

    /// Get a reference to the underlying connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Check if a table exists
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get the database version (from user_version pragma)
    pub fn get_version(&self) -> Result<i32> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Set the database version
    pub fn set_version(&self, version: i32) -> Result<()> {
        self.conn
            .execute_batch(&format!("PRAGMA user_version = {}", version))?;
        Ok(())
    }

    /// Run migrations for existing databases
    fn run_migrations(&mut self) -> Result<()> {
        let version = self.get_version()?;
        debug!(version, "Database already exists");

        if !self.table_exists("storage")? {
            info!("Running migration: Creating storage table");
            self.create_schema()?;
        } else if version < SCHEMA_VERSION {
            self.set_version(SCHEMA_VERSION)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_database() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("nested").join("test.db");

        let db = Database::open(&db_path)?;
        assert!(db_path.exists());
        assert!(db.table_exists("storage")?);
        assert_eq!(db.get_version()?, SCHEMA_VERSION);

        Ok(())
    }

    #[test]
    fn test_reopen_keeps_rows() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("test.db");

        {
            let db = Database::open(&db_path)?;
            db.conn().execute(
                "INSERT INTO storage (key, value) VALUES ('apiKey', '\"abc\"')",
                [],
            )?;
        }

        let db = Database::open(&db_path)?;
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM storage", [], |row| row.get(0))?;
        assert_eq!(count, 1);

        Ok(())
    }

    #[test]
    fn test_in_memory() -> Result<()> {
        let db = Database::open_in_memory()?;
        assert!(db.table_exists("storage")?);

        db.set_version(2)?;
        assert_eq!(db.get_version()?, 2);

        Ok(())
    }
}
