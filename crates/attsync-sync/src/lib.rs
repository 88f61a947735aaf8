//! attsync Sync - Attachment file sync state engine
//!
//! Provides:
//! - Local file change detection (mtime, then MD5)
//! - Batched sync-state reads and writes
//! - Installation of downloaded files and ZIP bundles
//! - Library scans and download/upload candidate queries
//!
//! ## Modules
//!
//! - [`filesystem`] - Local filesystem adapter (stat, MD5, mtime)
//! - [`comparator`] - Decides whether a local file changed
//! - [`filename`] - Filename sanitizing and shortening
//! - [`archive`] - ZIP bundle reading and entry name decoding
//! - [`applier`] - Installs downloaded payloads into attachment storage
//! - [`state_store`] - Chunked queries and batched state writes
//! - [`engine`] - Orchestrates scans, downloads and mode switches

pub mod applier;
pub mod archive;
pub mod comparator;
pub mod engine;
pub mod filename;
pub mod filesystem;
pub mod state_store;

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// A required file, record or library does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A download payload failed validation
    #[error("Invalid download payload: {0}")]
    InvalidPayload(String),

    /// The storage directory is nested so deeply that filenames would be
    /// truncated below a usable length
    #[error(
        "Path too deep: '{shortened}' in {} is too short after shortening; \
         move the data directory higher in the filesystem",
        dir.display()
    )]
    PathTooDeep {
        /// Directory the file was to be written into
        dir: PathBuf,
        /// The over-truncated filename
        shortened: String,
    },

    /// A downloaded ZIP bundle failed its integrity test
    #[error("Archive corrupt: {}", path.display())]
    ArchiveCorrupt {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// A filesystem operation failed for a reason other than a missing file
    #[error("Failed to {operation} '{}': {source}", path.display())]
    FilesystemAccess {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Reading from the record store failed
    #[error("Record store read failed: {0:#}")]
    StoreReadFailure(#[source] anyhow::Error),

    /// Writing sync state to the record store failed
    #[error("Sync state write failed: {0:#}")]
    StoreWriteFailure(#[source] anyhow::Error),

    /// A domain-level error propagated from attsync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] attsync_core::domain::errors::DomainError),
}

impl SyncError {
    /// Wraps an I/O error with the path and operation that caused it
    pub fn fs(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        SyncError::FilesystemAccess {
            path: path.into(),
            operation,
            source,
        }
    }
}

/// Result alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
