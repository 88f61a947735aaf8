//! Database connection pool management
//!
//! Wraps SQLx's `SqlitePool` with:
//! - Automatic directory creation for database files
//! - WAL journal mode and foreign keys
//! - Schema versioning through `PRAGMA user_version`
//! - In-memory mode for testing

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::CacheError;

/// Schema migrations, applied in order. Index + 1 is the resulting `user_version`.
const MIGRATIONS: &[&str] = &[include_str!("migrations/20261001_initial.sql")];

/// A pool of SQLite connections holding attachment sync state
///
/// File-backed pools allow 5 connections with a 5-second busy timeout.
/// In-memory pools use a single connection, since each SQLite in-memory
/// database is private to its connection.
#[derive(Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the database at `db_path` and migrates it
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established,
    /// or `CacheError::MigrationFailed` if schema migrations fail.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to open database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        let version = Self::migrate(&pool).await?;

        tracing::info!(
            path = %db_path.display(),
            schema_version = version,
            "Database pool initialized"
        );

        Ok(Self { pool })
    }

    /// Creates a migrated in-memory database for tests
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established,
    /// or `CacheError::MigrationFailed` if schema migrations fail.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        Self::migrate(&pool).await?;

        tracing::debug!("In-memory database pool initialized");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current schema version
    pub async fn schema_version(&self) -> Result<i64, CacheError> {
        Self::user_version(&self.pool).await
    }

    async fn user_version(pool: &SqlitePool) -> Result<i64, CacheError> {
        let row = sqlx::query("PRAGMA user_version")
            .fetch_one(pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("Failed to read schema version: {e}")))?;
        Ok(row.get::<i64, _>(0))
    }

    /// Applies every migration newer than the stored `user_version`
    async fn migrate(pool: &SqlitePool) -> Result<i64, CacheError> {
        let current = Self::user_version(pool).await?;

        for (index, sql) in MIGRATIONS.iter().enumerate() {
            let target = index as i64 + 1;
            if target <= current {
                continue;
            }
            sqlx::raw_sql(sql).execute(pool).await.map_err(|e| {
                CacheError::MigrationFailed(format!("Migration {target} failed: {e}"))
            })?;
            sqlx::raw_sql(&format!("PRAGMA user_version = {target}"))
                .execute(pool)
                .await
                .map_err(|e| {
                    CacheError::MigrationFailed(format!("Failed to record schema version: {e}"))
                })?;
            tracing::debug!(version = target, "Applied schema migration");
        }

        Ok(MIGRATIONS.len() as i64)
    }
}
