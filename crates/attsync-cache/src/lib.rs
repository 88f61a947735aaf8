//! attsync Cache - Local state persistence
//!
//! SQLite-based storage for:
//! - Libraries and attachment records with their sync state
//! - The deleted-file log
//! - Cached remote item snapshots
//!
//! ## Architecture
//!
//! This crate implements the `IAttachmentStore` and `IVersionCache` ports
//! from `attsync-core` using SQLite as the storage backend. It is a driven
//! (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteAttachmentStore`] - `IAttachmentStore` implementation
//! - [`SqliteVersionCache`] - `IVersionCache` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use attsync_cache::{DatabasePool, SqliteAttachmentStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/attsync/attsync.db")).await?;
//! let store = SqliteAttachmentStore::new(pool.pool().clone());
//! // Use store as IAttachmentStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;
pub mod version_cache;

pub use pool::DatabasePool;
pub use repository::SqliteAttachmentStore;
pub use version_cache::SqliteVersionCache;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be converted to a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
