//! SQLite implementation of IVersionCache
//!
//! Snapshots are stored as JSON in `sync_cache`, one row per
//! `(library, object type, key, version)`.

use sqlx::{Row, SqlitePool};

use attsync_core::domain::{
    newtypes::{ItemKey, LibraryId},
    ItemSnapshot,
};
use attsync_core::ports::IVersionCache;

use crate::CacheError;

/// SQLite-based cache of remote object snapshots
pub struct SqliteVersionCache {
    pool: SqlitePool,
}

impl SqliteVersionCache {
    /// Creates a new cache with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IVersionCache for SqliteVersionCache {
    async fn get_cached(
        &self,
        object_type: &str,
        library_id: LibraryId,
        keys: &[(ItemKey, u32)],
    ) -> anyhow::Result<Vec<ItemSnapshot>> {
        let mut snapshots = Vec::with_capacity(keys.len());

        // Lookups are by primary key; one query per pair keeps the bind count fixed
        for (key, version) in keys {
            let row = sqlx::query(
                "SELECT data FROM sync_cache \
                 WHERE library_id = ? AND object_type = ? AND item_key = ? AND version = ?",
            )
            .bind(library_id.as_i64())
            .bind(object_type)
            .bind(key.as_str())
            .bind(i64::from(*version))
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else {
                tracing::trace!(%key, version, "No cached snapshot");
                continue;
            };

            let data: String = row.get("data");
            let snapshot: ItemSnapshot = serde_json::from_str(&data).map_err(|e| {
                CacheError::SerializationError(format!(
                    "Invalid cached snapshot for {key} v{version}: {e}"
                ))
            })?;
            snapshots.push(snapshot);
        }

        Ok(snapshots)
    }

    async fn put(
        &self,
        object_type: &str,
        library_id: LibraryId,
        snapshot: &ItemSnapshot,
    ) -> anyhow::Result<()> {
        let data = serde_json::to_string(snapshot)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO sync_cache (library_id, object_type, item_key, version, data) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(library_id.as_i64())
        .bind(object_type)
        .bind(snapshot.key.as_str())
        .bind(i64::from(snapshot.version))
        .bind(&data)
        .execute(&self.pool)
        .await?;

        tracing::trace!(key = %snapshot.key, version = snapshot.version, "Cached snapshot");
        Ok(())
    }
}
