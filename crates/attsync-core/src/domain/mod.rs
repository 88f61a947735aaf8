//! Domain entities and business logic
//!
//! This module contains the core domain types for attachment sync:
//! - Newtypes for type-safe identifiers and validated domain types
//! - Attachment records, link kinds and sync states
//! - Libraries and their storage settings
//! - Conflict cases between local and cached remote versions
//! - The upload-check cache of externally touched files
//! - Domain-specific error types

pub mod attachment;
pub mod conflict;
pub mod errors;
pub mod library;
pub mod newtypes;
pub mod upload_check;

// Re-export commonly used types
pub use attachment::{
    AttachmentRecord, LinkKind, StateUpdate, StorageLayout, SyncState, RESERVED_STORAGE_PREFIX,
    STORAGE_PATH_PREFIX,
};
pub use conflict::{ConflictCase, Decision, ItemSnapshot};
pub use errors::DomainError;
pub use library::{DownloadMode, Library, LibraryStorageProfile, LibraryType, StorageMode};
pub use newtypes::*;
pub use upload_check::{UploadCheckCache, UploadCheckEntry};
