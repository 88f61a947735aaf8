//! Sync-state queries and batched writes over the record store
//!
//! [`StateStore`] turns engine questions ("what needs downloading?") into
//! [`AttachmentFilter`] queries, pages long id lists through
//! [`ID_CHUNK_SIZE`] and commits state updates in fixed-size transactions.

use std::sync::Arc;
use std::time::Duration;

use attsync_core::{
    domain::{
        AttachmentId, AttachmentRecord, ItemKey, LibraryId, LinkKind, ModTime, StateUpdate,
        SyncState, UploadCheckCache,
    },
    ports::{AttachmentFilter, IAttachmentStore, ID_CHUNK_SIZE},
};
use chrono::Utc;
use tracing::{debug, instrument};

use crate::{Result, SyncError};

/// Number of state updates committed per transaction
pub const WRITE_BATCH_SIZE: usize = 100;

/// States a local scan may reclassify
const SCANNABLE_STATES: [SyncState; 2] = [SyncState::ToUpload, SyncState::InSync];

const UPLOAD_STATES: [SyncState; 2] = [SyncState::ToUpload, SyncState::ForceUpload];

/// Engine-facing view of the attachment record store
#[derive(Clone)]
pub struct StateStore {
    store: Arc<dyn IAttachmentStore>,
}

impl StateStore {
    pub fn new(store: Arc<dyn IAttachmentStore>) -> Self {
        Self { store }
    }

    /// The underlying record store
    pub fn inner(&self) -> &Arc<dyn IAttachmentStore> {
        &self.store
    }

    fn imported(library_id: LibraryId) -> AttachmentFilter {
        AttachmentFilter::new()
            .with_library(library_id)
            .with_link_kinds(&LinkKind::IMPORTED)
    }

    async fn query(&self, filter: &AttachmentFilter) -> Result<Vec<AttachmentRecord>> {
        self.store
            .query_attachments(filter)
            .await
            .map_err(SyncError::StoreReadFailure)
    }

    /// Fetches a single record
    pub async fn get(&self, id: AttachmentId) -> Result<AttachmentRecord> {
        self.store
            .get_attachment(id)
            .await
            .map_err(SyncError::StoreReadFailure)?
            .ok_or_else(|| SyncError::NotFound(format!("attachment {id}")))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Imported records a local scan may reclassify (`TO_UPLOAD` or `IN_SYNC`)
    ///
    /// With `ids`, only those records are returned; the list is queried in
    /// chunks and the results merged.
    #[instrument(skip(self, ids), fields(ids = ?ids.map(|i| i.len())))]
    pub async fn candidates_for_scan(
        &self,
        library_id: LibraryId,
        ids: Option<&[AttachmentId]>,
    ) -> Result<Vec<AttachmentRecord>> {
        let filter = Self::imported(library_id).with_states(&SCANNABLE_STATES);
        let Some(ids) = ids else {
            return self.query(&filter).await;
        };

        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let chunk_filter = filter.clone().with_ids(chunk.to_vec());
            records.extend(self.query(&chunk_filter).await?);
        }
        debug!(found = records.len(), "scan candidates loaded");
        Ok(records)
    }

    /// Ids worth re-checking for local edits
    ///
    /// Union of in-sync imported records synced within `max_age` and ids from
    /// the upload-check cache recorded within the same window. Cached ids of
    /// other libraries or of non-imported records are dropped.
    #[instrument(skip(self, cache))]
    pub async fn files_to_check(
        &self,
        library_id: LibraryId,
        max_age: Duration,
        cache: &UploadCheckCache,
    ) -> Result<Vec<AttachmentId>> {
        let age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let since = Utc::now() - age;

        let recent = Self::imported(library_id)
            .with_state(SyncState::InSync)
            .with_synced_since(ModTime::from(since));
        let mut ids: Vec<AttachmentId> = self.query(&recent).await?.into_iter().map(|r| r.id).collect();

        let cached = cache.ids_since(since);
        for chunk in cached.chunks(ID_CHUNK_SIZE) {
            let records = self
                .store
                .get_attachments(chunk)
                .await
                .map_err(SyncError::StoreReadFailure)?;
            for record in records {
                if record.library_id == library_id
                    && record.link_kind.is_imported()
                    && !ids.contains(&record.id)
                {
                    ids.push(record.id);
                }
            }
        }
        Ok(ids)
    }

    /// Records waiting for download, excluding pathless and reserved paths
    pub async fn files_to_download(
        &self,
        library_id: LibraryId,
        forced_only: bool,
    ) -> Result<Vec<AttachmentRecord>> {
        let states: &[SyncState] = if forced_only {
            &[SyncState::ForceDownload]
        } else {
            &[SyncState::ToDownload, SyncState::ForceDownload]
        };
        let filter = AttachmentFilter::new()
            .with_library(library_id)
            .with_states(states)
            .excluding_reserved_paths();
        self.query(&filter).await
    }

    /// Imported records waiting for upload
    pub async fn files_to_upload(&self, library_id: LibraryId) -> Result<Vec<AttachmentRecord>> {
        self.query(&Self::imported(library_id).with_states(&UPLOAD_STATES))
            .await
    }

    /// Whether any record must be downloaded regardless of download mode
    pub async fn has_forced_downloads(&self, library_id: LibraryId) -> Result<bool> {
        let filter = AttachmentFilter::new()
            .with_library(library_id)
            .with_state(SyncState::ForceDownload);
        let count = self
            .store
            .count_attachments(&filter)
            .await
            .map_err(SyncError::StoreReadFailure)?;
        Ok(count > 0)
    }

    /// Keys of items whose files were deleted locally
    pub async fn deleted_files(&self, library_id: LibraryId) -> Result<Vec<ItemKey>> {
        self.store
            .deleted_file_keys(library_id)
            .await
            .map_err(SyncError::StoreReadFailure)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Marks every imported attachment in the library for upload
    ///
    /// Returns the number of records changed.
    #[instrument(skip(self))]
    pub async fn reset_all_to_upload(&self, library_id: LibraryId) -> Result<u64> {
        self.store
            .reset_states(&Self::imported(library_id), SyncState::ToUpload)
            .await
            .map_err(SyncError::StoreWriteFailure)
    }

    /// Commits updates in batches of [`WRITE_BATCH_SIZE`], one transaction each
    ///
    /// Returns the ids whose records no longer exist; their updates were
    /// skipped. Stops at the first failing batch; earlier batches stay
    /// committed.
    pub async fn write_states(&self, updates: &[StateUpdate]) -> Result<Vec<AttachmentId>> {
        let mut missing = Vec::new();
        for batch in updates.chunks(WRITE_BATCH_SIZE) {
            let skipped = self
                .store
                .apply_state_updates(batch)
                .await
                .map_err(SyncError::StoreWriteFailure)?;
            debug!(count = batch.len(), skipped = skipped.len(), "state batch committed");
            missing.extend(skipped);
        }
        Ok(missing)
    }

    /// Writes one record's state, failing if the record is gone
    pub async fn write_state(&self, update: StateUpdate) -> Result<()> {
        let id = update.id;
        if self.write_states(&[update]).await?.is_empty() {
            Ok(())
        } else {
            Err(SyncError::NotFound(format!("attachment {id}")))
        }
    }

    /// Rewrites an attachment's stored path
    pub async fn relink(&self, id: AttachmentId, path: &str, touch_modified: bool) -> Result<()> {
        self.store
            .relink_attachment(id, path, touch_modified)
            .await
            .map_err(SyncError::StoreWriteFailure)
    }
}
