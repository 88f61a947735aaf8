//! Attachment record store port (driven/secondary port)
//!
//! The item store owns attachment records; the sync engine only reads them
//! and writes sync-state columns, paths and the deleted-file log.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - [`AttachmentFilter`] is a composable query that keeps SQL out of the
//!   engine. Id lists are bound one parameter per id, so callers page them
//!   through [`MAX_BOUND_PARAMETERS`].
//! - `apply_state_updates` runs one transaction per call. Records that no
//!   longer exist are skipped and reported back; any other failure rolls
//!   the whole call back.

use std::collections::HashMap;

use crate::domain::{
    attachment::{LinkKind, StateUpdate, SyncState},
    newtypes::{AttachmentId, ItemKey, LibraryId, ModTime},
    AttachmentRecord, Library,
};

/// Maximum number of bound parameters in one statement
pub const MAX_BOUND_PARAMETERS: usize = 999;

/// Number of ids bound per query when paging id lists
///
/// Leaves room for the filter's other parameters.
pub const ID_CHUNK_SIZE: usize = MAX_BOUND_PARAMETERS - 10;

// ============================================================================
// AttachmentFilter struct
// ============================================================================

/// Filter criteria for querying attachment records
///
/// Empty lists and `None` mean "no restriction". Criteria combine with AND.
///
/// # Example
///
/// ```
/// use attsync_core::ports::AttachmentFilter;
/// use attsync_core::domain::{LibraryId, LinkKind, SyncState};
///
/// let filter = AttachmentFilter::new()
///     .with_library(LibraryId::new(1))
///     .with_states(&[SyncState::ToUpload, SyncState::ForceUpload])
///     .with_link_kinds(&LinkKind::IMPORTED);
/// assert!(!filter.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentFilter {
    /// Filter by owning library
    pub library_id: Option<LibraryId>,
    /// Filter by sync state
    pub states: Vec<SyncState>,
    /// Filter by link kind
    pub link_kinds: Vec<LinkKind>,
    /// Restrict to these ids
    pub ids: Option<Vec<AttachmentId>>,
    /// Records whose synced mtime is at or after this time
    pub synced_since: Option<ModTime>,
    /// Skip empty paths and reserved `storage:.zotero*` paths
    pub exclude_reserved_paths: bool,
}

impl AttachmentFilter {
    /// Creates a new empty filter (matches all records)
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the library filter
    pub fn with_library(mut self, library_id: LibraryId) -> Self {
        self.library_id = Some(library_id);
        self
    }

    /// Sets a single state filter
    pub fn with_state(self, state: SyncState) -> Self {
        self.with_states(&[state])
    }

    /// Sets the state filter
    pub fn with_states(mut self, states: &[SyncState]) -> Self {
        self.states = states.to_vec();
        self
    }

    /// Sets the link kind filter
    pub fn with_link_kinds(mut self, link_kinds: &[LinkKind]) -> Self {
        self.link_kinds = link_kinds.to_vec();
        self
    }

    /// Restricts the query to the given ids
    pub fn with_ids(mut self, ids: Vec<AttachmentId>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Sets the synced-since filter
    pub fn with_synced_since(mut self, since: ModTime) -> Self {
        self.synced_since = Some(since);
        self
    }

    /// Excludes records that can never be downloaded
    pub fn excluding_reserved_paths(mut self) -> Self {
        self.exclude_reserved_paths = true;
        self
    }

    /// Returns true if no filters are set
    pub fn is_empty(&self) -> bool {
        self.library_id.is_none()
            && self.states.is_empty()
            && self.link_kinds.is_empty()
            && self.ids.is_none()
            && self.synced_since.is_none()
            && !self.exclude_reserved_paths
    }
}

// ============================================================================
// IAttachmentStore trait
// ============================================================================

/// Port trait for the external attachment record store
#[async_trait::async_trait]
pub trait IAttachmentStore: Send + Sync {
    // --- Library operations ---

    /// Retrieves a library by id
    async fn get_library(&self, id: LibraryId) -> anyhow::Result<Option<Library>>;

    /// Lists all libraries
    async fn list_libraries(&self) -> anyhow::Result<Vec<Library>>;

    /// Saves a library (insert or update)
    async fn save_library(&self, library: &Library) -> anyhow::Result<()>;

    // --- Attachment reads ---

    /// Retrieves an attachment by id
    async fn get_attachment(&self, id: AttachmentId) -> anyhow::Result<Option<AttachmentRecord>>;

    /// Retrieves the attachments with the given ids; unknown ids are skipped
    ///
    /// Callers pass at most [`ID_CHUNK_SIZE`] ids.
    async fn get_attachments(&self, ids: &[AttachmentId]) -> anyhow::Result<Vec<AttachmentRecord>>;

    /// Queries attachments matching the filter, ordered by id
    async fn query_attachments(
        &self,
        filter: &AttachmentFilter,
    ) -> anyhow::Result<Vec<AttachmentRecord>>;

    /// Counts attachments matching the filter
    async fn count_attachments(&self, filter: &AttachmentFilter) -> anyhow::Result<u64>;

    /// Counts attachments in a library grouped by state name
    async fn count_by_state(&self, library_id: LibraryId) -> anyhow::Result<HashMap<String, u64>>;

    // --- Attachment writes ---

    /// Saves an attachment record (insert or update)
    async fn save_attachment(&self, record: &AttachmentRecord) -> anyhow::Result<()>;

    /// Applies state updates in a single transaction
    ///
    /// Returns the ids of records that no longer exist. Their updates are
    /// skipped and the rest are committed.
    async fn apply_state_updates(&self, updates: &[StateUpdate])
        -> anyhow::Result<Vec<AttachmentId>>;

    /// Rewrites an attachment's stored path
    ///
    /// When `touch_modified` is false the item's modification metadata is
    /// left as is (used for libraries the user cannot edit).
    async fn relink_attachment(
        &self,
        id: AttachmentId,
        path: &str,
        touch_modified: bool,
    ) -> anyhow::Result<()>;

    /// Sets every attachment matching the filter to `state`
    ///
    /// Returns the number of records changed.
    async fn reset_states(&self, filter: &AttachmentFilter, state: SyncState)
        -> anyhow::Result<u64>;

    // --- Deleted-file log ---

    /// Records that an item's file was deleted locally
    async fn log_deleted_file(&self, library_id: LibraryId, key: &ItemKey) -> anyhow::Result<()>;

    /// Keys of items whose files were deleted locally
    async fn deleted_file_keys(&self, library_id: LibraryId) -> anyhow::Result<Vec<ItemKey>>;
}
