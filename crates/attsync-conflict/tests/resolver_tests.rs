//! Integration tests for ConflictResolver
//!
//! Conflicts are set up in an in-memory SQLite store with cached remote
//! snapshots and real files in a temporary storage directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use attsync_cache::{DatabasePool, SqliteAttachmentStore, SqliteVersionCache};
use attsync_conflict::{ConflictError, ConflictResolver};
use attsync_core::domain::{
    AttachmentId, AttachmentRecord, ConflictCase, ContentHash, Decision, ItemKey, ItemSnapshot, Library,
    LibraryId, LibraryType, ModTime, StorageLayout, SyncState,
};
use attsync_core::ports::{
    FileSystemState, IAttachmentStore, IConflictPrompt, ILocalFileSystem, IVersionCache,
    ITEM_OBJECT_TYPE,
};
use attsync_sync::filesystem::LocalFileSystemAdapter;
use tempfile::TempDir;

const USER: LibraryId = LibraryId::new(1);

const LOCAL_MTIME: i64 = 1_650_000_000_000;
const REMOTE_MTIME: i64 = 1_660_000_000_000;

// ============================================================================
// Prompts
// ============================================================================

/// Picks the same side for every case
struct ChooseSide(Decision);

#[async_trait::async_trait]
impl IConflictPrompt for ChooseSide {
    async fn resolve(&self, cases: &[ConflictCase]) -> anyhow::Result<Option<Vec<ItemSnapshot>>> {
        Ok(Some(
            cases
                .iter()
                .map(|c| match self.0 {
                    Decision::KeepLocal => c.local.clone(),
                    Decision::KeepRemote => c.remote.clone(),
                })
                .collect(),
        ))
    }
}

struct Cancel;

#[async_trait::async_trait]
impl IConflictPrompt for Cancel {
    async fn resolve(&self, _cases: &[ConflictCase]) -> anyhow::Result<Option<Vec<ItemSnapshot>>> {
        Ok(None)
    }
}

/// Returns no choices at all
struct Empty;

#[async_trait::async_trait]
impl IConflictPrompt for Empty {
    async fn resolve(&self, _cases: &[ConflictCase]) -> anyhow::Result<Option<Vec<ItemSnapshot>>> {
        Ok(Some(Vec::new()))
    }
}

/// Fails to stat files under one storage directory
struct UnreadableDir {
    inner: LocalFileSystemAdapter,
    dir: String,
}

#[async_trait::async_trait]
impl ILocalFileSystem for UnreadableDir {
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState> {
        if path.components().any(|c| c.as_os_str() == self.dir.as_str()) {
            anyhow::bail!("permission denied");
        }
        self.inner.get_state(path).await
    }

    async fn compute_hash(&self, path: &Path) -> anyhow::Result<ContentHash> {
        self.inner.compute_hash(path).await
    }

    async fn set_modification_time(&self, path: &Path, mod_time: ModTime) -> anyhow::Result<()> {
        self.inner.set_modification_time(path, mod_time).await
    }

    async fn create_directory(&self, path: &Path) -> anyhow::Result<()> {
        self.inner.create_directory(path).await
    }
}

// ============================================================================
// Test helpers
// ============================================================================

struct Harness {
    _root: TempDir,
    pool: DatabasePool,
    storage: PathBuf,
    store: Arc<SqliteAttachmentStore>,
    cache: Arc<SqliteVersionCache>,
    resolver: ConflictResolver,
}

async fn harness() -> Harness {
    harness_with_fs(Arc::new(LocalFileSystemAdapter::new())).await
}

async fn harness_with_fs(local_filesystem: Arc<dyn ILocalFileSystem>) -> Harness {
    let root = TempDir::new().unwrap();
    let storage = root.path().join("storage");
    let pool = DatabasePool::in_memory().await.unwrap();
    let store = Arc::new(SqliteAttachmentStore::new(pool.pool().clone()));
    let cache = Arc::new(SqliteVersionCache::new(pool.pool().clone()));
    store
        .save_library(&Library::new(USER, LibraryType::User, "My Library"))
        .await
        .unwrap();

    let resolver = ConflictResolver::new(
        store.clone(),
        cache.clone(),
        local_filesystem,
        StorageLayout::new(&storage),
    );

    Harness {
        _root: root,
        pool,
        storage,
        store,
        cache,
        resolver,
    }
}

fn key(n: u8) -> ItemKey {
    ItemKey::new(format!("CCCCCC2{n}")).unwrap()
}

impl Harness {
    /// Adds an in-conflict attachment, optionally with a local file and a
    /// cached remote snapshot
    async fn add_conflict(&self, id: i64, n: u8, with_file: bool, with_cache: bool) {
        let k = key(n);
        let record = AttachmentRecord::new_imported(AttachmentId::new(id), USER, k.clone(), "doc.pdf")
            .with_state(SyncState::InConflict)
            .with_version(4);
        self.store.save_attachment(&record).await.unwrap();

        if with_file {
            let dir = self.storage.join(k.as_str());
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join("doc.pdf");
            std::fs::write(&path, b"local").unwrap();
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            file.set_times(
                std::fs::FileTimes::new()
                    .set_modified(ModTime::from_millis(LOCAL_MTIME).to_system_time()),
            )
            .unwrap();
        }

        if with_cache {
            let remote = ItemSnapshot::new(k, 4, ModTime::from_millis(REMOTE_MTIME))
                .with_file_name(Some("doc.pdf".to_string()))
                .with_fields(serde_json::json!({ "title": "Remote title" }));
            self.cache.put(ITEM_OBJECT_TYPE, USER, &remote).await.unwrap();
        }
    }

    async fn state_of(&self, id: i64) -> SyncState {
        self.store
            .get_attachment(AttachmentId::new(id))
            .await
            .unwrap()
            .unwrap()
            .sync_state
    }
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_conflicts() {
    let h = harness().await;
    h.add_conflict(1, 2, true, true).await;

    let cases = h.resolver.list_conflicts(USER).await.unwrap();

    assert_eq!(cases.len(), 1);
    let case = &cases[0];
    assert_eq!(case.attachment_id, AttachmentId::new(1));
    assert_eq!(case.local.mod_time, ModTime::from_millis(LOCAL_MTIME));
    assert_eq!(case.remote.mod_time, ModTime::from_millis(REMOTE_MTIME));
    assert_eq!(case.remote.fields["title"], "Remote title");
    assert!(!case.is_resolved());
}

#[tokio::test]
async fn test_local_side_describes_local_record() {
    let h = harness().await;
    h.add_conflict(1, 2, true, true).await;

    let cases = h.resolver.list_conflicts(USER).await.unwrap();

    let local = &cases[0].local;
    assert_eq!(local.file_name.as_deref(), Some("doc.pdf"));
    assert_eq!(local.fields["path"], "storage:doc.pdf");
    assert!(local.fields.get("title").is_none());
}

#[tokio::test]
async fn test_list_continues_past_stat_errors() {
    let h = harness_with_fs(Arc::new(UnreadableDir {
        inner: LocalFileSystemAdapter::new(),
        dir: key(3).as_str().to_string(),
    }))
    .await;
    h.add_conflict(1, 2, true, true).await;
    h.add_conflict(2, 3, true, true).await;

    let cases = h.resolver.list_conflicts(USER).await.unwrap();

    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].attachment_id, AttachmentId::new(1));
}

#[tokio::test]
async fn test_list_skips_missing_cache_entries() {
    let h = harness().await;
    h.add_conflict(1, 2, true, true).await;
    h.add_conflict(2, 3, true, false).await;

    let cases = h.resolver.list_conflicts(USER).await.unwrap();

    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].attachment_id, AttachmentId::new(1));
}

#[tokio::test]
async fn test_list_without_any_cache_is_empty() {
    let h = harness().await;
    h.add_conflict(1, 2, true, false).await;

    assert!(h.resolver.list_conflicts(USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_skips_missing_local_file() {
    let h = harness().await;
    h.add_conflict(1, 2, false, true).await;

    assert!(h.resolver.list_conflicts(USER).await.unwrap().is_empty());
}

// ============================================================================
// Resolution
// ============================================================================

#[tokio::test]
async fn test_resolve_keep_local() {
    let h = harness().await;
    h.add_conflict(1, 2, true, true).await;
    h.add_conflict(2, 3, true, true).await;

    let resolved = h
        .resolver
        .resolve_conflicts(USER, &ChooseSide(Decision::KeepLocal))
        .await
        .unwrap();

    assert!(resolved);
    assert_eq!(h.state_of(1).await, SyncState::ForceUpload);
    assert_eq!(h.state_of(2).await, SyncState::ForceUpload);
}

#[tokio::test]
async fn test_resolve_keep_remote() {
    let h = harness().await;
    h.add_conflict(1, 2, true, true).await;

    let resolved = h
        .resolver
        .resolve_conflicts(USER, &ChooseSide(Decision::KeepRemote))
        .await
        .unwrap();

    assert!(resolved);
    assert_eq!(h.state_of(1).await, SyncState::ForceDownload);
}

#[tokio::test]
async fn test_resolve_cancelled() {
    let h = harness().await;
    h.add_conflict(1, 2, true, true).await;

    let resolved = h.resolver.resolve_conflicts(USER, &Cancel).await.unwrap();

    assert!(!resolved);
    assert_eq!(h.state_of(1).await, SyncState::InConflict);
}

#[tokio::test]
async fn test_resolve_without_conflicts() {
    let h = harness().await;
    let resolved = h
        .resolver
        .resolve_conflicts(USER, &ChooseSide(Decision::KeepLocal))
        .await
        .unwrap();
    assert!(!resolved);
}

#[tokio::test]
async fn test_resolve_choice_count_mismatch() {
    let h = harness().await;
    h.add_conflict(1, 2, true, true).await;

    let err = h.resolver.resolve_conflicts(USER, &Empty).await.unwrap_err();

    assert!(matches!(
        err,
        ConflictError::ChoiceCountMismatch { expected: 1, actual: 0 }
    ));
    assert_eq!(h.state_of(1).await, SyncState::InConflict);
}

#[tokio::test]
async fn test_apply_rejects_undecided_case() {
    let h = harness().await;
    h.add_conflict(1, 2, true, true).await;
    h.add_conflict(2, 3, true, true).await;

    let mut cases = h.resolver.list_conflicts(USER).await.unwrap();
    let chosen = cases[0].local.clone();
    cases[0].decide(&chosen);

    let err = h.resolver.apply_resolutions(&cases).await.unwrap_err();

    assert!(matches!(err, ConflictError::Unresolved(id) if id == AttachmentId::new(2)));
    assert_eq!(h.state_of(1).await, SyncState::InConflict);
}

#[tokio::test]
async fn test_apply_skips_deleted_record() {
    let h = harness().await;
    h.add_conflict(1, 2, true, true).await;
    h.add_conflict(2, 3, true, true).await;

    let mut cases = h.resolver.list_conflicts(USER).await.unwrap();
    for case in &mut cases {
        let chosen = case.remote.clone();
        case.decide(&chosen);
    }
    sqlx::query("DELETE FROM attachments WHERE id = 2")
        .execute(h.pool.pool())
        .await
        .unwrap();

    let applied = h.resolver.apply_resolutions(&cases).await.unwrap();

    assert_eq!(applied, 1);
    assert_eq!(h.state_of(1).await, SyncState::ForceDownload);
}
