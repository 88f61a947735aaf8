//! SQLite implementation of IAttachmentStore
//!
//! This module provides the concrete SQLite-based implementation of the
//! attachment record store port defined in attsync-core. It handles domain
//! type conversion and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type              | SQL Type | Strategy                              |
//! |--------------------------|----------|---------------------------------------|
//! | AttachmentId, LibraryId  | INTEGER  | `.as_i64()` / `new()`                 |
//! | ItemKey                  | TEXT     | `.as_str()` / `ItemKey::new()`        |
//! | ContentHash              | TEXT     | `.as_str()` / `ContentHash::new()`    |
//! | ModTime                  | INTEGER  | milliseconds since the epoch          |
//! | SyncState, LinkKind      | INTEGER  | `.code()` / `from_code()`             |
//! | LibraryType              | TEXT     | `.as_str()` / `FromStr`               |

use std::collections::HashMap;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use attsync_core::domain::{
    newtypes::{AttachmentId, ContentHash, ItemKey, LibraryId, ModTime},
    AttachmentRecord, Library, LinkKind, StateUpdate, SyncState, RESERVED_STORAGE_PREFIX,
};
use attsync_core::ports::{AttachmentFilter, IAttachmentStore};

use crate::CacheError;

const ATTACHMENT_COLUMNS: &str = "id, library_id, item_key, link_mode, path, sync_state, \
     storage_mod_time, storage_hash, version";

/// SQLite-based implementation of the attachment record store port
pub struct SqliteAttachmentStore {
    pool: SqlitePool,
}

impl SqliteAttachmentStore {
    /// Creates a new store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Query construction
// ============================================================================

/// `?, ?, ?` with `n` placeholders
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Builds the WHERE clause for a filter
///
/// Every bound value is an integer, so binds are collected as `i64`.
fn filter_clause(filter: &AttachmentFilter) -> (String, Vec<i64>) {
    let mut sql = String::from(" WHERE 1=1");
    let mut binds: Vec<i64> = Vec::new();

    if let Some(library_id) = filter.library_id {
        sql.push_str(" AND library_id = ?");
        binds.push(library_id.as_i64());
    }

    if !filter.states.is_empty() {
        sql.push_str(&format!(
            " AND sync_state IN ({})",
            placeholders(filter.states.len())
        ));
        binds.extend(filter.states.iter().map(SyncState::code));
    }

    if !filter.link_kinds.is_empty() {
        sql.push_str(&format!(
            " AND link_mode IN ({})",
            placeholders(filter.link_kinds.len())
        ));
        binds.extend(filter.link_kinds.iter().map(LinkKind::code));
    }

    if let Some(ref ids) = filter.ids {
        if ids.is_empty() {
            sql.push_str(" AND 0");
        } else {
            sql.push_str(&format!(" AND id IN ({})", placeholders(ids.len())));
            binds.extend(ids.iter().map(AttachmentId::as_i64));
        }
    }

    if let Some(since) = filter.synced_since {
        sql.push_str(" AND storage_mod_time >= ?");
        binds.push(since.as_millis());
    }

    if filter.exclude_reserved_paths {
        sql.push_str(&format!(
            " AND path != '' AND path NOT LIKE '{}%'",
            RESERVED_STORAGE_PREFIX
        ));
    }

    (sql, binds)
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn attachment_from_row(row: &SqliteRow) -> Result<AttachmentRecord, CacheError> {
    let key: String = row.get("item_key");
    let link_mode: i64 = row.get("link_mode");
    let sync_state: i64 = row.get("sync_state");
    let storage_mod_time: Option<i64> = row.get("storage_mod_time");
    let storage_hash: Option<String> = row.get("storage_hash");
    let version: i64 = row.get("version");

    let serialization = |e: attsync_core::domain::DomainError| {
        CacheError::SerializationError(e.to_string())
    };

    Ok(AttachmentRecord {
        id: AttachmentId::new(row.get("id")),
        library_id: LibraryId::new(row.get("library_id")),
        key: ItemKey::new(key).map_err(serialization)?,
        link_kind: LinkKind::from_code(link_mode).map_err(serialization)?,
        path: row.get("path"),
        storage_mod_time: storage_mod_time.map(ModTime::from_millis),
        // Hashes written by other clients may be malformed; treat them as unknown
        storage_hash: storage_hash.and_then(|h| ContentHash::new(h).ok()),
        sync_state: SyncState::from_code(sync_state).map_err(serialization)?,
        version: u32::try_from(version).unwrap_or_default(),
    })
}

fn library_from_row(row: &SqliteRow) -> Result<Library, CacheError> {
    let library_type: String = row.get("library_type");
    let editable: bool = row.get("editable");
    Ok(Library {
        id: LibraryId::new(row.get("id")),
        library_type: library_type
            .parse()
            .map_err(|e: attsync_core::domain::DomainError| {
                CacheError::SerializationError(e.to_string())
            })?,
        editable,
        name: row.get("name"),
    })
}

// ============================================================================
// IAttachmentStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IAttachmentStore for SqliteAttachmentStore {
    // --- Library operations ---

    async fn get_library(&self, id: LibraryId) -> anyhow::Result<Option<Library>> {
        let row = sqlx::query("SELECT id, library_type, editable, name FROM libraries WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(library_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_libraries(&self) -> anyhow::Result<Vec<Library>> {
        let rows = sqlx::query("SELECT id, library_type, editable, name FROM libraries ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut libraries = Vec::with_capacity(rows.len());
        for row in &rows {
            libraries.push(library_from_row(row)?);
        }
        Ok(libraries)
    }

    async fn save_library(&self, library: &Library) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO libraries (id, library_type, editable, name) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET library_type = excluded.library_type, \
             editable = excluded.editable, name = excluded.name",
        )
        .bind(library.id.as_i64())
        .bind(library.library_type.as_str())
        .bind(library.editable)
        .bind(&library.name)
        .execute(&self.pool)
        .await?;

        tracing::trace!(library_id = %library.id, "Saved library");
        Ok(())
    }

    // --- Attachment reads ---

    async fn get_attachment(&self, id: AttachmentId) -> anyhow::Result<Option<AttachmentRecord>> {
        let sql = format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(attachment_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_attachments(&self, ids: &[AttachmentId]) -> anyhow::Result<Vec<AttachmentRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.query_attachments(&AttachmentFilter::new().with_ids(ids.to_vec()))
            .await
    }

    async fn query_attachments(
        &self,
        filter: &AttachmentFilter,
    ) -> anyhow::Result<Vec<AttachmentRecord>> {
        let (clause, binds) = filter_clause(filter);
        let sql = format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments{clause} ORDER BY id");

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(*bind);
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(attachment_from_row(row)?);
        }
        Ok(records)
    }

    async fn count_attachments(&self, filter: &AttachmentFilter) -> anyhow::Result<u64> {
        let (clause, binds) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM attachments{clause}");

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for bind in &binds {
            query = query.bind(*bind);
        }

        Ok(query.fetch_one(&self.pool).await? as u64)
    }

    async fn count_by_state(&self, library_id: LibraryId) -> anyhow::Result<HashMap<String, u64>> {
        let rows = sqlx::query(
            "SELECT sync_state, COUNT(*) AS count FROM attachments \
             WHERE library_id = ? GROUP BY sync_state",
        )
        .bind(library_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in &rows {
            let code: i64 = row.get("sync_state");
            let count: i64 = row.get("count");
            let state = SyncState::from_code(code)
                .map_err(|e| CacheError::SerializationError(e.to_string()))?;
            counts.insert(state.name().to_string(), count as u64);
        }
        Ok(counts)
    }

    // --- Attachment writes ---

    async fn save_attachment(&self, record: &AttachmentRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO attachments \
             (id, library_id, item_key, link_mode, path, sync_state, \
              storage_mod_time, storage_hash, version) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
              library_id = excluded.library_id, item_key = excluded.item_key, \
              link_mode = excluded.link_mode, path = excluded.path, \
              sync_state = excluded.sync_state, storage_mod_time = excluded.storage_mod_time, \
              storage_hash = excluded.storage_hash, version = excluded.version",
        )
        .bind(record.id.as_i64())
        .bind(record.library_id.as_i64())
        .bind(record.key.as_str())
        .bind(record.link_kind.code())
        .bind(&record.path)
        .bind(record.sync_state.code())
        .bind(record.storage_mod_time.map(|t| t.as_millis()))
        .bind(record.storage_hash.as_ref().map(|h| h.as_str().to_string()))
        .bind(i64::from(record.version))
        .execute(&self.pool)
        .await?;

        tracing::trace!(attachment_id = %record.id, "Saved attachment");
        Ok(())
    }

    async fn apply_state_updates(
        &self,
        updates: &[StateUpdate],
    ) -> anyhow::Result<Vec<AttachmentId>> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut missing = Vec::new();

        for update in updates {
            let result = sqlx::query(
                "UPDATE attachments SET sync_state = ?, \
                 storage_mod_time = COALESCE(?, storage_mod_time), \
                 storage_hash = COALESCE(?, storage_hash) \
                 WHERE id = ?",
            )
            .bind(update.state.code())
            .bind(update.mod_time.map(|t| t.as_millis()))
            .bind(update.hash.as_ref().map(|h| h.as_str().to_string()))
            .bind(update.id.as_i64())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tracing::debug!(attachment_id = %update.id, "State update skipped, record gone");
                missing.push(update.id);
            }
        }

        tx.commit().await?;

        tracing::trace!(
            count = updates.len() - missing.len(),
            skipped = missing.len(),
            "Applied state updates"
        );
        Ok(missing)
    }

    async fn relink_attachment(
        &self,
        id: AttachmentId,
        path: &str,
        touch_modified: bool,
    ) -> anyhow::Result<()> {
        let sql = if touch_modified {
            "UPDATE attachments SET path = ?, synced = 0, \
             client_date_modified = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') WHERE id = ?"
        } else {
            "UPDATE attachments SET path = ? WHERE id = ?"
        };

        let result = sqlx::query(sql)
            .bind(path)
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Attachment {} not found", id);
        }

        tracing::debug!(attachment_id = %id, path, touch_modified, "Relinked attachment");
        Ok(())
    }

    async fn reset_states(
        &self,
        filter: &AttachmentFilter,
        state: SyncState,
    ) -> anyhow::Result<u64> {
        let (clause, binds) = filter_clause(filter);
        let sql = format!("UPDATE attachments SET sync_state = ?{clause}");

        let mut query = sqlx::query(&sql).bind(state.code());
        for bind in &binds {
            query = query.bind(*bind);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    // --- Deleted-file log ---

    async fn log_deleted_file(&self, library_id: LibraryId, key: &ItemKey) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO storage_delete_log (library_id, item_key) VALUES (?, ?)",
        )
        .bind(library_id.as_i64())
        .bind(key.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deleted_file_keys(&self, library_id: LibraryId) -> anyhow::Result<Vec<ItemKey>> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT item_key FROM storage_delete_log WHERE library_id = ? ORDER BY item_key",
        )
        .bind(library_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        keys.into_iter()
            .map(|k| {
                ItemKey::new(k)
                    .map_err(|e| anyhow::Error::from(CacheError::SerializationError(e.to_string())))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_clause_empty() {
        let (sql, binds) = filter_clause(&AttachmentFilter::new());
        assert_eq!(sql, " WHERE 1=1");
        assert!(binds.is_empty());
    }

    #[test]
    fn test_filter_clause_binds_in_order() {
        let filter = AttachmentFilter::new()
            .with_library(LibraryId::new(4))
            .with_states(&[SyncState::ToUpload, SyncState::InSync])
            .with_link_kinds(&LinkKind::IMPORTED)
            .with_synced_since(ModTime::from_millis(99));
        let (sql, binds) = filter_clause(&filter);

        assert!(sql.contains("sync_state IN (?, ?)"));
        assert!(sql.contains("link_mode IN (?, ?)"));
        assert_eq!(binds, vec![4, 0, 2, 0, 1, 99]);
    }

    #[test]
    fn test_filter_clause_empty_ids_match_nothing() {
        let (sql, binds) = filter_clause(&AttachmentFilter::new().with_ids(Vec::new()));
        assert!(sql.ends_with(" AND 0"));
        assert!(binds.is_empty());
    }

    #[test]
    fn test_filter_clause_reserved_paths() {
        let (sql, _) = filter_clause(&AttachmentFilter::new().excluding_reserved_paths());
        assert!(sql.contains("path != ''"));
        assert!(sql.contains("NOT LIKE 'storage:.zotero%'"));
    }
}
