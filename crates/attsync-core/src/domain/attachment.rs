//! Attachment domain entity
//!
//! An attachment is a file-bearing record owned by the item store. This
//! module models the part of it the sync engine reads and writes: link kind,
//! stored path, last synced remote mtime/hash and the sync state.
//!
//! ## State Machine
//!
//! ```text
//!   new local import ──► TO_UPLOAD ◄──── scan: content changed
//!                            │                 backend switched
//!                            │ upload
//!                            ▼
//!   new remote record ─► TO_DOWNLOAD ──► IN_SYNC ◄── download installed
//!            ▲                             │
//!            └──── scan: file missing ─────┤
//!                                          │ remote newer while scanning
//!                                          ▼
//!                                    FORCE_DOWNLOAD
//!
//!   IN_CONFLICT ── keep local ──► FORCE_UPLOAD
//!               └─ keep remote ─► FORCE_DOWNLOAD
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{AttachmentId, ContentHash, ItemKey, LibraryId, ModTime};

/// Prefix of paths stored relative to the item's storage directory
pub const STORAGE_PATH_PREFIX: &str = "storage:";

/// Prefix of reserved storage paths that are never downloaded
pub const RESERVED_STORAGE_PREFIX: &str = "storage:.zotero";

// ============================================================================
// LinkKind
// ============================================================================

/// How an attachment refers to its content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// File copied into storage
    ImportedFile,
    /// Web snapshot saved into storage
    ImportedUrl,
    /// Reference to a file outside storage
    LinkedFile,
    /// Reference to a URL
    LinkedUrl,
}

impl LinkKind {
    /// Kinds whose content lives in the storage directory and takes part in sync
    pub const IMPORTED: [LinkKind; 2] = [LinkKind::ImportedFile, LinkKind::ImportedUrl];

    /// Persisted integer code
    pub fn code(&self) -> i64 {
        match self {
            LinkKind::ImportedFile => 0,
            LinkKind::ImportedUrl => 1,
            LinkKind::LinkedFile => 2,
            LinkKind::LinkedUrl => 3,
        }
    }

    /// Parse a persisted integer code
    pub fn from_code(code: i64) -> Result<Self, DomainError> {
        match code {
            0 => Ok(LinkKind::ImportedFile),
            1 => Ok(LinkKind::ImportedUrl),
            2 => Ok(LinkKind::LinkedFile),
            3 => Ok(LinkKind::LinkedUrl),
            _ => Err(DomainError::UnknownCode {
                kind: "link mode",
                code,
            }),
        }
    }

    /// Returns true for imported files and imported URLs
    pub fn is_imported(&self) -> bool {
        matches!(self, LinkKind::ImportedFile | LinkKind::ImportedUrl)
    }
}

// ============================================================================
// SyncState
// ============================================================================

/// File sync state of an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Local content is newer and must be uploaded
    ToUpload,
    /// Remote content exists and the local file is missing or stale
    ToDownload,
    /// Local and remote agree
    InSync,
    /// Upload regardless of remote state (conflict resolved as local)
    ForceUpload,
    /// Download regardless of download mode (remote known newer)
    ForceDownload,
    /// Local and remote changed independently
    InConflict,
}

impl SyncState {
    /// Every state, in code order
    pub const ALL: [SyncState; 6] = [
        SyncState::ToUpload,
        SyncState::ToDownload,
        SyncState::InSync,
        SyncState::ForceUpload,
        SyncState::ForceDownload,
        SyncState::InConflict,
    ];

    /// Persisted integer code
    pub fn code(&self) -> i64 {
        match self {
            SyncState::ToUpload => 0,
            SyncState::ToDownload => 1,
            SyncState::InSync => 2,
            SyncState::ForceUpload => 3,
            SyncState::ForceDownload => 4,
            SyncState::InConflict => 5,
        }
    }

    /// Parse a persisted integer code
    pub fn from_code(code: i64) -> Result<Self, DomainError> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.code() == code)
            .ok_or(DomainError::UnknownCode {
                kind: "sync state",
                code,
            })
    }

    /// Returns true if the local file should be pushed
    pub fn is_upload(&self) -> bool {
        matches!(self, SyncState::ToUpload | SyncState::ForceUpload)
    }

    /// Returns true if the remote file should be fetched
    pub fn is_download(&self) -> bool {
        matches!(self, SyncState::ToDownload | SyncState::ForceDownload)
    }

    /// Upper-case state name
    pub fn name(&self) -> &'static str {
        match self {
            SyncState::ToUpload => "TO_UPLOAD",
            SyncState::ToDownload => "TO_DOWNLOAD",
            SyncState::InSync => "IN_SYNC",
            SyncState::ForceUpload => "FORCE_UPLOAD",
            SyncState::ForceDownload => "FORCE_DOWNLOAD",
            SyncState::InConflict => "IN_CONFLICT",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// StorageLayout
// ============================================================================

/// On-disk layout of attachment storage: `<storage root>/<key>/<filename>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    storage_root: PathBuf,
}

impl StorageLayout {
    /// Create a layout rooted at `storage_root`
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
        }
    }

    /// Layout under a data directory (`<data dir>/storage`)
    pub fn from_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("storage"))
    }

    /// Root of all item directories
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Directory holding the files of one item
    pub fn item_dir(&self, key: &ItemKey) -> PathBuf {
        self.storage_root.join(key.as_str())
    }
}

// ============================================================================
// AttachmentRecord
// ============================================================================

/// Sync-relevant view of an attachment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    /// Row id in the item store
    pub id: AttachmentId,
    /// Owning library
    pub library_id: LibraryId,
    /// Item key, naming the storage directory
    pub key: ItemKey,
    /// How the attachment refers to its content
    pub link_kind: LinkKind,
    /// Stored path (`storage:<name>`, an absolute path, or empty)
    pub path: String,
    /// Last synced remote modification time
    pub storage_mod_time: Option<ModTime>,
    /// Last synced remote content hash
    pub storage_hash: Option<ContentHash>,
    /// Current sync state
    pub sync_state: SyncState,
    /// Item version, used to look up cached remote snapshots
    pub version: u32,
}

impl AttachmentRecord {
    /// Creates an imported-file record with a `storage:` path
    ///
    /// New local imports start in `TO_UPLOAD`.
    pub fn new_imported(
        id: AttachmentId,
        library_id: LibraryId,
        key: ItemKey,
        file_name: &str,
    ) -> Self {
        Self {
            id,
            library_id,
            key,
            link_kind: LinkKind::ImportedFile,
            path: format!("{STORAGE_PATH_PREFIX}{file_name}"),
            storage_mod_time: None,
            storage_hash: None,
            sync_state: SyncState::ToUpload,
            version: 0,
        }
    }

    /// Sets the sync state
    pub fn with_state(mut self, state: SyncState) -> Self {
        self.sync_state = state;
        self
    }

    /// Sets the last synced remote mtime and hash
    pub fn with_synced(mut self, mod_time: ModTime, hash: Option<ContentHash>) -> Self {
        self.storage_mod_time = Some(mod_time);
        self.storage_hash = hash;
        self
    }

    /// Sets the link kind
    pub fn with_link_kind(mut self, link_kind: LinkKind) -> Self {
        self.link_kind = link_kind;
        self
    }

    /// Sets the item version
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Filename part of a `storage:` path, if any
    pub fn file_name(&self) -> Option<&str> {
        self.path
            .strip_prefix(STORAGE_PATH_PREFIX)
            .filter(|name| !name.is_empty())
    }

    /// Returns true if the stored path is reserved and never downloaded
    pub fn has_reserved_path(&self) -> bool {
        self.path.starts_with(RESERVED_STORAGE_PREFIX)
    }

    /// Absolute filesystem path of the attachment's file
    ///
    /// Returns `None` for URLs and for records without a usable path.
    pub fn resolve_path(&self, layout: &StorageLayout) -> Option<PathBuf> {
        match self.link_kind {
            LinkKind::ImportedFile | LinkKind::ImportedUrl => self
                .file_name()
                .map(|name| layout.item_dir(&self.key).join(name)),
            LinkKind::LinkedFile if !self.path.is_empty() => Some(PathBuf::from(&self.path)),
            _ => None,
        }
    }
}

// ============================================================================
// StateUpdate
// ============================================================================

/// An atomic write of `(sync state, synced mtime?, synced hash?)` for one record
///
/// `None` leaves the stored value unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub id: AttachmentId,
    pub state: SyncState,
    pub mod_time: Option<ModTime>,
    pub hash: Option<ContentHash>,
}

impl StateUpdate {
    /// Change only the state
    pub fn state(id: AttachmentId, state: SyncState) -> Self {
        Self {
            id,
            state,
            mod_time: None,
            hash: None,
        }
    }

    /// Record a completed transfer: `IN_SYNC` with the synced mtime and hash
    pub fn synced(id: AttachmentId, mod_time: ModTime, hash: ContentHash) -> Self {
        Self {
            id,
            state: SyncState::InSync,
            mod_time: Some(mod_time),
            hash: Some(hash),
        }
    }
}
