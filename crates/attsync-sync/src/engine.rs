//! Attachment sync state engine
//!
//! The [`SyncStateEngine`] keeps each attachment's sync state in step with
//! the file on disk. It does not transfer anything itself; the transfer
//! layer asks it what to move and reports back what arrived.
//!
//! ## State transitions
//!
//! 1. **Scan**: changed content -> `TO_UPLOAD`, missing file -> `TO_DOWNLOAD`,
//!    newer remote mtime -> `FORCE_DOWNLOAD`. `TO_UPLOAD` is never touched.
//! 2. **Download**: an installed payload -> `IN_SYNC` with the remote mtime
//!    and hash recorded.
//! 3. **Mode switch**: a new storage backend for the personal library marks
//!    every imported attachment `TO_UPLOAD`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use attsync_core::config::{Config, StorageConfig};
use attsync_core::domain::{
    AttachmentId, AttachmentRecord, DownloadMode, ItemKey, Library, LibraryId,
    LibraryStorageProfile, ModTime, StateUpdate, StorageLayout, StorageMode, SyncState,
    UploadCheckCache, STORAGE_PATH_PREFIX,
};
use attsync_core::ports::{IAttachmentStore, ILocalFileSystem};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::applier::{DownloadApplier, DownloadPayload, InstallReport};
use crate::comparator::{access_error, FileComparator};
use crate::state_store::{StateStore, WRITE_BATCH_SIZE};
use crate::{Result, SyncError};

// ============================================================================
// Results
// ============================================================================

/// A record the scan could not classify
#[derive(Debug, Clone, Serialize)]
pub struct ScanFailure {
    pub attachment_id: AttachmentId,
    pub error: String,
}

/// Summary of one local change scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Number of records examined
    pub checked: usize,
    /// Records whose state changed, with the new state
    pub changed: Vec<(AttachmentId, SyncState)>,
    /// Per-record failures; the scan continued past them
    pub failures: Vec<ScanFailure>,
    /// Wall-clock duration of the scan in milliseconds
    pub duration_ms: u64,
}

impl ScanReport {
    /// Whether any record changed state
    pub fn any_changed(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Moves records deleted mid-scan from `changed` to `failures`
    fn drop_vanished(&mut self, missing: &[AttachmentId]) {
        if missing.is_empty() {
            return;
        }
        self.changed.retain(|(id, _)| !missing.contains(id));
        for &id in missing {
            warn!(id = %id, "attachment removed during scan");
            self.failures.push(ScanFailure {
                attachment_id: id,
                error: "record no longer exists".to_string(),
            });
        }
    }
}

/// Result of processing one download
#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    /// Whether anything changed on disk or in the record
    pub local_changes: bool,
    /// Where the primary file ended up
    pub path: Option<PathBuf>,
    pub install: InstallReport,
}

// ============================================================================
// SyncStateEngine
// ============================================================================

/// Local attachment sync state engine
///
/// ## Dependencies
///
/// - `store`: Attachment records, libraries and the deleted-file log
/// - `local_filesystem`: Stat, MD5 and mtime of attachment files
/// - `config`: Per-library storage settings and download limits
pub struct SyncStateEngine {
    state: StateStore,
    local_filesystem: Arc<dyn ILocalFileSystem + Send + Sync>,
    comparator: FileComparator,
    applier: DownloadApplier,
    layout: StorageLayout,
    /// Per-library settings; mode switches write through this lock
    storage: RwLock<StorageConfig>,
}

impl SyncStateEngine {
    /// Creates a new `SyncStateEngine` with the given dependencies
    ///
    /// # Arguments
    /// * `store` - Attachment record persistence (IAttachmentStore)
    /// * `local_filesystem` - Local file operations (ILocalFileSystem)
    /// * `config` - Storage paths, per-library settings and download limits
    pub fn new(
        store: Arc<dyn IAttachmentStore + Send + Sync>,
        local_filesystem: Arc<dyn ILocalFileSystem + Send + Sync>,
        config: &Config,
    ) -> Self {
        let layout = config.paths.storage_layout();
        Self {
            state: StateStore::new(store),
            comparator: FileComparator::new(local_filesystem.clone(), layout.clone()),
            applier: DownloadApplier::new(
                layout.clone(),
                config.paths.temp_dir.clone(),
                config.download.clone(),
            ),
            local_filesystem,
            layout,
            storage: RwLock::new(config.storage.clone()),
        }
    }

    /// Record store queries used by the engine
    pub fn state_store(&self) -> &StateStore {
        &self.state
    }

    /// Installer for staged downloads
    pub fn applier(&self) -> &DownloadApplier {
        &self.applier
    }

    /// Current per-library storage settings
    pub async fn storage_config(&self) -> StorageConfig {
        self.storage.read().await.clone()
    }

    /// Looks up a library by id
    pub async fn library(&self, library_id: LibraryId) -> Result<Library> {
        self.state
            .inner()
            .get_library(library_id)
            .await
            .map_err(SyncError::StoreReadFailure)?
            .ok_or_else(|| SyncError::NotFound(format!("library {library_id}")))
    }

    // ========================================================================
    // Library settings
    // ========================================================================

    /// Resolves every storage setting for a library
    pub async fn profile(&self, library_id: LibraryId) -> Result<LibraryStorageProfile> {
        let library = self.library(library_id).await?;
        Ok(self.storage.read().await.profile_for(&library))
    }

    /// Whether file sync runs for the library
    pub async fn enabled_for_library(&self, library_id: LibraryId) -> Result<bool> {
        Ok(self.profile(library_id).await?.enabled)
    }

    /// Storage backend used by the library
    pub async fn mode_for_library(&self, library_id: LibraryId) -> Result<StorageMode> {
        Ok(self.profile(library_id).await?.mode)
    }

    /// Switches the personal library's storage backend
    ///
    /// Every imported attachment is marked for upload when the backend
    /// actually changes. Returns whether it changed.
    ///
    /// # Errors
    /// `DomainError::UnsupportedLibrary` for anything but the user library
    #[instrument(skip(self))]
    pub async fn set_mode_for_library(&self, library_id: LibraryId, mode: StorageMode) -> Result<bool> {
        let library = self.library(library_id).await?;
        let changed = self.storage.write().await.set_mode_for(&library, mode)?;
        if changed {
            let reset = self.state.reset_all_to_upload(library_id).await?;
            info!(mode = %mode, reset, "Storage mode changed, marked attachments for upload");
        } else {
            debug!(mode = %mode, "storage mode unchanged");
        }
        Ok(changed)
    }

    /// Whether files are downloaded only when opened
    pub async fn download_as_needed(&self, library_id: LibraryId) -> Result<bool> {
        Ok(self.profile(library_id).await?.download_as_needed())
    }

    /// Whether files are downloaded during sync
    pub async fn download_on_sync(&self, library_id: LibraryId) -> Result<bool> {
        Ok(self.profile(library_id).await?.download_on_sync())
    }

    /// Sets the download mode applying to the library
    ///
    /// Group libraries share one setting.
    pub async fn set_download_mode(&self, library_id: LibraryId, mode: DownloadMode) -> Result<()> {
        let library = self.library(library_id).await?;
        self.storage.write().await.set_download_mode_for(&library, mode)?;
        info!(library = %library_id, mode = %mode, "Download mode changed");
        Ok(())
    }

    // ========================================================================
    // Scanning
    // ========================================================================

    /// Scans local files and updates the state of any that changed
    ///
    /// With `ids`, only those records are checked; otherwise every scan
    /// candidate in the library, or the keys of `remote_mtimes` when given.
    /// `remote_mtimes` enables download-marking: records whose stored mtime
    /// differs from the remote one become `FORCE_DOWNLOAD`.
    ///
    /// An explicitly empty id list or mtime map checks nothing. Per-record
    /// failures are collected in the report and do not stop the scan.
    #[instrument(skip(self, ids, remote_mtimes), fields(library = %library_id))]
    pub async fn check_for_updated_files(
        &self,
        library_id: LibraryId,
        ids: Option<&[AttachmentId]>,
        remote_mtimes: Option<&HashMap<AttachmentId, ModTime>>,
    ) -> Result<ScanReport> {
        let start = std::time::Instant::now();
        let mut report = ScanReport::default();

        if ids.is_some_and(|i| i.is_empty()) {
            debug!("no files to check for local changes");
            return Ok(report);
        }
        if remote_mtimes.is_some_and(|m| m.is_empty()) {
            return Ok(report);
        }

        info!(
            download_marking = remote_mtimes.is_some(),
            "Checking for locally changed attachment files"
        );

        let mapped_ids: Vec<AttachmentId>;
        let ids = match (ids, remote_mtimes) {
            (Some(ids), _) => Some(ids),
            (None, Some(mtimes)) => {
                mapped_ids = mtimes.keys().copied().collect();
                Some(mapped_ids.as_slice())
            }
            (None, None) => None,
        };

        let records = self.state.candidates_for_scan(library_id, ids).await?;
        if records.is_empty() {
            debug!("no in-sync or to-upload files found");
            return Ok(report);
        }

        let mut pending = Vec::new();
        for record in &records {
            let remote = remote_mtimes.and_then(|m| m.get(&record.id).copied());
            report.checked += 1;
            match self.comparator.classify(record, remote).await {
                Ok(Some(new_state)) => {
                    debug!(id = %record.id, from = %record.sync_state, to = %new_state, "state changed");
                    pending.push(StateUpdate::state(record.id, new_state));
                    report.changed.push((record.id, new_state));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(id = %record.id, error = %e, "failed to check attachment file");
                    report.failures.push(ScanFailure {
                        attachment_id: record.id,
                        error: e.to_string(),
                    });
                }
            }
            if pending.len() >= WRITE_BATCH_SIZE {
                let missing = self.state.write_states(&pending).await?;
                report.drop_vanished(&missing);
                pending.clear();
            }
        }
        let missing = self.state.write_states(&pending).await?;
        report.drop_vanished(&missing);

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            checked = report.checked,
            changed = report.changed.len(),
            failed = report.failures.len(),
            duration_ms = report.duration_ms,
            "Local file check complete"
        );
        Ok(report)
    }

    /// Ids to pass to [`check_for_updated_files`](Self::check_for_updated_files)
    /// for a quick post-sync check
    ///
    /// Covers recently synced files and files recorded in `cache` within
    /// the configured check window.
    pub async fn files_to_check(
        &self,
        library_id: LibraryId,
        cache: &UploadCheckCache,
    ) -> Result<Vec<AttachmentId>> {
        let max_age = Duration::from_secs(self.storage.read().await.max_check_age_secs);
        self.state.files_to_check(library_id, max_age, cache).await
    }

    // ========================================================================
    // Transfer candidates
    // ========================================================================

    /// Imported attachments waiting for upload
    pub async fn files_to_upload(&self, library_id: LibraryId) -> Result<Vec<AttachmentRecord>> {
        self.state.files_to_upload(library_id).await
    }

    /// Attachments waiting for download
    pub async fn files_to_download(
        &self,
        library_id: LibraryId,
        forced_only: bool,
    ) -> Result<Vec<AttachmentRecord>> {
        self.state.files_to_download(library_id, forced_only).await
    }

    /// Attachments to download during sync, honouring the download mode
    ///
    /// On-demand libraries only get forced downloads; disabled libraries
    /// get nothing.
    pub async fn download_candidates(&self, library_id: LibraryId) -> Result<Vec<AttachmentRecord>> {
        let profile = self.profile(library_id).await?;
        if !profile.enabled {
            debug!(library = %library_id, "file sync disabled");
            return Ok(Vec::new());
        }
        self.state
            .files_to_download(library_id, profile.download_as_needed())
            .await
    }

    /// Whether any attachment must be downloaded regardless of download mode
    pub async fn has_forced_downloads(&self, library_id: LibraryId) -> Result<bool> {
        self.state.has_forced_downloads(library_id).await
    }

    /// Keys of items whose files were deleted locally
    pub async fn deleted_files(&self, library_id: LibraryId) -> Result<Vec<ItemKey>> {
        self.state.deleted_files(library_id).await
    }

    /// Counts attachments in a library per state name
    pub async fn state_counts(&self, library_id: LibraryId) -> Result<HashMap<String, u64>> {
        self.state
            .inner()
            .count_by_state(library_id)
            .await
            .map_err(SyncError::StoreReadFailure)
    }

    // ========================================================================
    // Downloads
    // ========================================================================

    /// Installs a staged download and records the attachment as in sync
    ///
    /// If the file was written under a new name the attachment is relinked;
    /// in read-only libraries the relink leaves the item's modification
    /// metadata alone.
    #[instrument(skip(self, payload), fields(key = %payload.key))]
    pub async fn process_download(
        &self,
        id: AttachmentId,
        payload: &DownloadPayload,
    ) -> Result<DownloadOutcome> {
        let record = self.state.get(id).await?;
        if record.key != payload.key {
            return Err(SyncError::InvalidPayload(format!(
                "payload key {} does not match attachment {} ({})",
                payload.key, id, record.key
            )));
        }
        let library = self.library(record.library_id).await?;

        let install = self.applier.install(&record, payload).await?;
        if !install.installed {
            info!(id = %id, "Download left nothing to install");
            return Ok(DownloadOutcome {
                local_changes: false,
                path: None,
                install,
            });
        }

        let mut path = record.resolve_path(&self.layout);
        if let Some(new_path) = install.renamed_to.as_ref() {
            if path.as_ref() != Some(new_path) {
                let name = new_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if !library.editable {
                    debug!("file renamed without library access, updating path only");
                }
                self.state
                    .relink(id, &format!("{STORAGE_PATH_PREFIX}{name}"), library.editable)
                    .await?;
                path = Some(new_path.clone());
            }
        }

        let present = match &path {
            Some(p) => self
                .local_filesystem
                .get_state(p)
                .await
                .map_err(|e| access_error(p, "stat", e))?
                .is_regular_file(),
            None => false,
        };
        let Some(path) = path.filter(|_| present) else {
            error!(
                id = %id,
                file_name = record.file_name().unwrap_or_default(),
                "File not found after processing download"
            );
            return Ok(DownloadOutcome {
                local_changes: false,
                path: None,
                install,
            });
        };

        let hash = match &payload.hash {
            Some(h) => h.clone(),
            None => self
                .local_filesystem
                .compute_hash(&path)
                .await
                .map_err(|e| access_error(&path, "hash", e))?,
        };

        self.local_filesystem
            .set_modification_time(&path, payload.mod_time)
            .await
            .map_err(|e| access_error(&path, "set mtime", e))?;

        self.state
            .write_state(StateUpdate::synced(id, payload.mod_time, hash))
            .await?;

        info!(id = %id, path = %path.display(), "Download installed");
        Ok(DownloadOutcome {
            local_changes: true,
            path: Some(path),
            install,
        })
    }

    /// Records an attachment's state directly
    ///
    /// Used for transitions decided outside the engine, such as a version
    /// conflict found by the transfer layer.
    pub async fn set_sync_state(&self, id: AttachmentId, state: SyncState) -> Result<()> {
        self.state.write_state(StateUpdate::state(id, state)).await
    }
}

// ============================================================================
// Unit tests
// ============================================================================
