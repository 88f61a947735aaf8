//! File conflict resolution
//!
//! A conflict exists when an attachment changed both locally and remotely.
//! Resolving it does not move any data: the chosen side is recorded as a
//! forced transfer and the next sync performs it.
//! - keep local: `FORCE_UPLOAD`
//! - keep remote: `FORCE_DOWNLOAD`

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use attsync_core::{
    domain::{
        ConflictCase, ItemKey, ItemSnapshot, LibraryId, StateUpdate, StorageLayout, SyncState,
    },
    ports::{
        AttachmentFilter, IAttachmentStore, IConflictPrompt, ILocalFileSystem, IVersionCache,
        ITEM_OBJECT_TYPE,
    },
};

use crate::error::ConflictError;

/// Lists and resolves file conflicts for a library
pub struct ConflictResolver {
    store: Arc<dyn IAttachmentStore>,
    version_cache: Arc<dyn IVersionCache>,
    local_filesystem: Arc<dyn ILocalFileSystem>,
    layout: StorageLayout,
}

impl ConflictResolver {
    pub fn new(
        store: Arc<dyn IAttachmentStore>,
        version_cache: Arc<dyn IVersionCache>,
        local_filesystem: Arc<dyn ILocalFileSystem>,
        layout: StorageLayout,
    ) -> Self {
        Self {
            store,
            version_cache,
            local_filesystem,
            layout,
        }
    }

    /// Pairs every in-conflict attachment with its cached remote version
    ///
    /// The local side carries the file's current mtime, the remote side the
    /// cached snapshot. Attachments without a cached snapshot or without a
    /// local file are logged and left out.
    #[instrument(skip(self))]
    pub async fn list_conflicts(&self, library_id: LibraryId) -> Result<Vec<ConflictCase>, ConflictError> {
        let filter = AttachmentFilter::new()
            .with_library(library_id)
            .with_state(SyncState::InConflict);
        let records = self.store.query_attachments(&filter).await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(ItemKey, u32)> = records
            .iter()
            .map(|r| (r.key.clone(), r.version))
            .collect();
        let cached = self
            .version_cache
            .get_cached(ITEM_OBJECT_TYPE, library_id, &pairs)
            .await?;
        if cached.is_empty() {
            debug!(conflicts = records.len(), "no cached remote versions");
            return Ok(Vec::new());
        }
        let mut remote_by_key: HashMap<ItemKey, ItemSnapshot> =
            cached.into_iter().map(|s| (s.key.clone(), s)).collect();

        let mut cases = Vec::with_capacity(records.len());
        for record in records {
            let Some(remote) = remote_by_key.remove(&record.key) else {
                error!(id = %record.id, key = %record.key, "Cached object not found for item");
                continue;
            };

            let local_mtime = match record.resolve_path(&self.layout) {
                Some(path) => match self.local_filesystem.get_state(&path).await {
                    Ok(state) => state.modified,
                    Err(e) => {
                        warn!(
                            id = %record.id,
                            path = %path.display(),
                            error = %e,
                            "cannot stat conflicted file"
                        );
                        continue;
                    }
                },
                None => None,
            };
            let Some(local_mtime) = local_mtime else {
                warn!(id = %record.id, key = %record.key, "local file not found for conflict");
                continue;
            };

            let local =
                ItemSnapshot::from_local(&record, local_mtime).map_err(anyhow::Error::from)?;
            cases.push(ConflictCase::new(library_id, record.id, local, remote));
        }

        debug!(count = cases.len(), "conflicts listed");
        Ok(cases)
    }

    /// Writes the recorded decision of every case in one transaction
    ///
    /// Nothing is written if any case is undecided.
    pub async fn apply_resolutions(&self, cases: &[ConflictCase]) -> Result<usize, ConflictError> {
        let updates = cases
            .iter()
            .map(|case| {
                case.resolution
                    .map(|decision| StateUpdate::state(case.attachment_id, decision.target_state()))
                    .ok_or(ConflictError::Unresolved(case.attachment_id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let missing = self.store.apply_state_updates(&updates).await?;
        for case in cases {
            if missing.contains(&case.attachment_id) {
                warn!(id = %case.attachment_id, "conflicted attachment no longer exists");
                continue;
            }
            debug!(id = %case.attachment_id, resolution = ?case.resolution, "conflict resolved");
        }
        Ok(updates.len() - missing.len())
    }

    /// Lists conflicts, asks the prompt, and records the choices
    ///
    /// Returns false when there was nothing to resolve or the prompt was
    /// cancelled; no state changes in either case.
    #[instrument(skip(self, prompt))]
    pub async fn resolve_conflicts(
        &self,
        library_id: LibraryId,
        prompt: &dyn IConflictPrompt,
    ) -> Result<bool, ConflictError> {
        let mut cases = self.list_conflicts(library_id).await?;
        if cases.is_empty() {
            return Ok(false);
        }

        let Some(choices) = prompt.resolve(&cases).await.map_err(ConflictError::Prompt)? else {
            info!(conflicts = cases.len(), "Conflict resolution cancelled");
            return Ok(false);
        };
        if choices.len() != cases.len() {
            return Err(ConflictError::ChoiceCountMismatch {
                expected: cases.len(),
                actual: choices.len(),
            });
        }

        for (case, chosen) in cases.iter_mut().zip(&choices) {
            case.decide(chosen);
        }
        let applied = self.apply_resolutions(&cases).await?;
        info!(resolved = applied, "Conflicts resolved");
        Ok(true)
    }
}
