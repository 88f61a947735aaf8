//! Local filesystem port (driven/secondary port)
//!
//! This module defines the interface the sync engine uses to inspect and
//! touch attachment files: stat, content hash and modification time.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because filesystem errors are adapter-specific.
//! - A missing file is not an error: `get_state` returns
//!   [`FileSystemState::not_found`]. Implementations also report paths that
//!   cannot exist (name too long, missing parent) as not found.

use std::path::Path;

use crate::domain::newtypes::{ContentHash, ModTime};

// ============================================================================
// FileSystemState struct
// ============================================================================

/// Snapshot of a file's state on the local filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemState {
    /// Whether the file/directory exists on disk
    pub exists: bool,
    /// Whether this is a regular file (false for directories and other types)
    pub is_file: bool,
    /// Size in bytes (0 for directories or non-existent files)
    pub size: u64,
    /// Last modification time (None if not available or file doesn't exist)
    pub modified: Option<ModTime>,
}

impl FileSystemState {
    /// Returns a state representing a non-existent path
    pub fn not_found() -> Self {
        Self {
            exists: false,
            is_file: false,
            size: 0,
            modified: None,
        }
    }

    /// Returns true if the file exists and is a regular file
    pub fn is_regular_file(&self) -> bool {
        self.exists && self.is_file
    }

    /// Returns true if the file exists and is a directory
    pub fn is_directory(&self) -> bool {
        self.exists && !self.is_file
    }
}

// ============================================================================
// ILocalFileSystem trait
// ============================================================================

/// Port trait for local filesystem operations
///
/// ## Implementation Notes
///
/// - `compute_hash` produces the MD5 digest used by remote storage.
/// - `set_modification_time` must leave the access time unchanged where the
///   platform allows it.
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Gets the current state of a file or directory
    ///
    /// Returns `FileSystemState::not_found()` if the path doesn't exist
    /// (does not return an error for missing paths).
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState>;

    /// Computes the MD5 hash of a file's contents
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be read
    async fn compute_hash(&self, path: &Path) -> anyhow::Result<ContentHash>;

    /// Sets a file's modification time
    async fn set_modification_time(&self, path: &Path, mod_time: ModTime) -> anyhow::Result<()>;

    /// Creates a directory and all parent directories as needed
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()>;
}
