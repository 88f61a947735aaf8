//! Local change detection for attachment files
//!
//! [`FileComparator`] decides whether the file behind an attachment record
//! differs from what was last synced. The cheap modification-time check runs
//! first; the MD5 hash is computed only when the times disagree.

use std::path::Path;
use std::sync::Arc;

use attsync_core::{
    domain::{AttachmentRecord, ModTime, StorageLayout, SyncState},
    ports::ILocalFileSystem,
};
use tracing::debug;

use crate::SyncError;

/// One hour in milliseconds. Some filesystems report times shifted by a DST
/// offset.
const DST_OFFSET_MS: i64 = 3_600_000;

/// Returns true if a file's mtime should be treated as equal to the recorded one
///
/// Tolerates one-second truncation on either side and an exact one-hour shift.
pub fn times_equivalent(file_mtime: ModTime, record_mtime: ModTime) -> bool {
    let f = file_mtime.as_millis();
    let m = record_mtime.as_millis();
    if f == m {
        return true;
    }

    let f_floor = file_mtime.floor_to_second().as_millis();
    let m_floor = record_mtime.floor_to_second().as_millis();
    if f_floor == m || m_floor == f {
        return true;
    }

    (f - m).abs() == DST_OFFSET_MS
        || (f_floor - m).abs() == DST_OFFSET_MS
        || (f - m_floor).abs() == DST_OFFSET_MS
}

// ============================================================================
// FileComparator
// ============================================================================

/// Classifies attachment files against their stored sync metadata
pub struct FileComparator {
    filesystem: Arc<dyn ILocalFileSystem>,
    layout: StorageLayout,
}

impl FileComparator {
    pub fn new(filesystem: Arc<dyn ILocalFileSystem>, layout: StorageLayout) -> Self {
        Self { filesystem, layout }
    }

    /// Decides the new sync state for an attachment, if any
    ///
    /// Returns `Ok(None)` when the record should stay as it is. Passing
    /// `remote_mtime` switches to download-marking: the remote mtime is
    /// compared with the stored one and a difference yields
    /// [`SyncState::ForceDownload`].
    ///
    /// When the content hash matches but the mtime does not, the file's
    /// mtime is rewritten to the stored value so later scans skip hashing.
    pub async fn classify(
        &self,
        record: &AttachmentRecord,
        remote_mtime: Option<ModTime>,
    ) -> Result<Option<SyncState>, SyncError> {
        let Some(path) = record.resolve_path(&self.layout) else {
            debug!(id = %record.id, "pathless attachment is in sync");
            return Ok(transition(record, SyncState::InSync));
        };

        let state = self
            .filesystem
            .get_state(&path)
            .await
            .map_err(|e| access_error(&path, "stat", e))?;
        if !state.exists {
            debug!(id = %record.id, path = %path.display(), "file not found");
            return Ok(transition(record, SyncState::ToDownload));
        }

        let file_mtime = state
            .modified
            .unwrap_or(ModTime::from_millis(0))
            .clamp_non_negative();

        // A pending upload always wins, even if the file changed again
        if record.sync_state == SyncState::ToUpload {
            debug!(id = %record.id, "already marked for upload");
            return Ok(None);
        }

        if let Some(remote) = remote_mtime {
            if record.storage_mod_time == Some(remote) {
                debug!(id = %record.id, "synced mtime unchanged");
                return Ok(None);
            }
            debug!(id = %record.id, remote = %remote, "remote file changed");
            return Ok(Some(SyncState::ForceDownload));
        }

        if let Some(stored) = record.storage_mod_time {
            if times_equivalent(file_mtime, stored) {
                debug!(id = %record.id, "file has not changed");
                return Ok(None);
            }
        }

        let hash = self
            .filesystem
            .compute_hash(&path)
            .await
            .map_err(|e| access_error(&path, "hash", e))?;

        if record.storage_hash.as_ref() == Some(&hash) {
            match record.storage_mod_time {
                Some(stored_mtime) => {
                    debug!(
                        id = %record.id,
                        file_mtime = %file_mtime,
                        stored_mtime = %stored_mtime,
                        "hash matches, resetting file mtime"
                    );
                    self.filesystem
                        .set_modification_time(&path, stored_mtime)
                        .await
                        .map_err(|e| access_error(&path, "set mtime", e))?;
                }
                None => debug!(id = %record.id, "hash matches, no synced mtime to restore"),
            }
            return Ok(None);
        }

        debug!(id = %record.id, file_mtime = %file_mtime, "file changed locally");
        Ok(Some(SyncState::ToUpload))
    }
}

fn transition(record: &AttachmentRecord, state: SyncState) -> Option<SyncState> {
    (record.sync_state != state).then_some(state)
}

/// Converts an adapter error into a [`SyncError`], keeping the underlying
/// I/O error when there is one
pub(crate) fn access_error(path: &Path, operation: &'static str, err: anyhow::Error) -> SyncError {
    match err.downcast::<std::io::Error>() {
        Ok(io) => SyncError::fs(path, operation, io),
        Err(other) => SyncError::fs(
            path,
            operation,
            std::io::Error::new(std::io::ErrorKind::Other, format!("{other:#}")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use attsync_core::domain::{AttachmentId, ContentHash, LibraryId};
    use tempfile::TempDir;

    use super::*;
    use crate::filesystem::LocalFileSystemAdapter;

    fn t(ms: i64) -> ModTime {
        ModTime::from_millis(ms)
    }

    #[test]
    fn test_times_exact_match() {
        assert!(times_equivalent(t(1_234_567), t(1_234_567)));
    }

    #[test]
    fn test_times_second_truncation() {
        assert!(times_equivalent(t(1_234_567), t(1_234_000)));
        assert!(times_equivalent(t(1_234_000), t(1_234_567)));
        assert!(!times_equivalent(t(1_234_567), t(1_235_000)));
    }

    #[test]
    fn test_times_dst_shift() {
        assert!(times_equivalent(t(10_000_000), t(10_000_000 + 3_600_000)));
        assert!(times_equivalent(t(10_000_000 + 3_600_000), t(10_000_000)));
        assert!(times_equivalent(t(10_000_250), t(10_000_000 + 3_600_000)));
        assert!(times_equivalent(t(10_000_000 + 3_600_000), t(10_000_250)));
        assert!(!times_equivalent(t(10_000_000), t(10_000_000 + 3_600_001)));
    }

    #[test]
    fn test_times_unrelated() {
        assert!(!times_equivalent(t(1_000), t(5_000)));
    }

    struct Fixture {
        dir: TempDir,
        comparator: FileComparator,
        fs: Arc<LocalFileSystemAdapter>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let fs = Arc::new(LocalFileSystemAdapter::new());
        let comparator = FileComparator::new(fs.clone(), StorageLayout::new(dir.path()));
        Fixture { dir, comparator, fs }
    }

    fn record(state: SyncState) -> AttachmentRecord {
        AttachmentRecord::new_imported(
            AttachmentId::new(1),
            LibraryId::new(1),
            "ABCD2345".parse().unwrap(),
            "paper.pdf",
        )
        .with_state(state)
    }

    fn write_file(fx: &Fixture, content: &[u8], mtime: ModTime) {
        let item_dir = fx.dir.path().join("ABCD2345");
        std::fs::create_dir_all(&item_dir).unwrap();
        let path = item_dir.join("paper.pdf");
        std::fs::write(&path, content).unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_times(std::fs::FileTimes::new().set_modified(mtime.to_system_time()))
            .unwrap();
    }

    fn md5_of(content: &[u8]) -> ContentHash {
        use md5::{Digest, Md5};
        ContentHash::new(format!("{:x}", Md5::digest(content))).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_marks_download() {
        let fx = fixture();
        let r = record(SyncState::InSync).with_synced(t(1_000_000), None);
        assert_eq!(
            fx.comparator.classify(&r, None).await.unwrap(),
            Some(SyncState::ToDownload)
        );
    }

    #[tokio::test]
    async fn test_pending_upload_is_never_reclassified() {
        let fx = fixture();
        write_file(&fx, b"new content", t(9_000_000));
        let r = record(SyncState::ToUpload).with_synced(t(1_000_000), Some(md5_of(b"old")));

        assert_eq!(fx.comparator.classify(&r, None).await.unwrap(), None);
        assert_eq!(fx.comparator.classify(&r, Some(t(5))).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_equivalent_mtime_is_unchanged() {
        let fx = fixture();
        write_file(&fx, b"content", t(1_000_000));
        let r = record(SyncState::InSync).with_synced(t(1_000_456), Some(md5_of(b"other")));

        assert_eq!(fx.comparator.classify(&r, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hash_match_repairs_mtime() {
        let fx = fixture();
        write_file(&fx, b"content", t(7_000_000));
        let stored = t(1_000_000);
        let r = record(SyncState::InSync).with_synced(stored, Some(md5_of(b"content")));

        assert_eq!(fx.comparator.classify(&r, None).await.unwrap(), None);

        let path = fx.dir.path().join("ABCD2345").join("paper.pdf");
        let state = fx.fs.get_state(&path).await.unwrap();
        assert_eq!(state.modified, Some(stored));
        // Second pass takes the mtime shortcut
        assert_eq!(fx.comparator.classify(&r, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hash_match_without_synced_mtime_is_unchanged() {
        let fx = fixture();
        write_file(&fx, b"content", t(7_000_000));
        let mut r = record(SyncState::InSync);
        r.storage_hash = Some(md5_of(b"content"));

        assert_eq!(fx.comparator.classify(&r, None).await.unwrap(), None);

        let path = fx.dir.path().join("ABCD2345").join("paper.pdf");
        let state = fx.fs.get_state(&path).await.unwrap();
        assert_eq!(state.modified, Some(t(7_000_000)));
    }

    #[tokio::test]
    async fn test_changed_content_marks_upload() {
        let fx = fixture();
        write_file(&fx, b"edited", t(7_000_000));
        let r = record(SyncState::InSync).with_synced(t(1_000_000), Some(md5_of(b"original")));

        assert_eq!(
            fx.comparator.classify(&r, None).await.unwrap(),
            Some(SyncState::ToUpload)
        );
    }

    #[tokio::test]
    async fn test_download_marking() {
        let fx = fixture();
        write_file(&fx, b"content", t(1_000_000));
        let r = record(SyncState::InSync).with_synced(t(1_000_000), None);

        assert_eq!(fx.comparator.classify(&r, Some(t(1_000_000))).await.unwrap(), None);
        assert_eq!(
            fx.comparator.classify(&r, Some(t(2_000_000))).await.unwrap(),
            Some(SyncState::ForceDownload)
        );
    }

    #[tokio::test]
    async fn test_pathless_record_is_in_sync() {
        let fx = fixture();
        let mut r = record(SyncState::ToDownload);
        r.path = String::new();
        assert_eq!(
            fx.comparator.classify(&r, None).await.unwrap(),
            Some(SyncState::InSync)
        );
        r.sync_state = SyncState::InSync;
        assert_eq!(fx.comparator.classify(&r, None).await.unwrap(), None);
    }
}
