//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IAttachmentStore`] - Attachment records, libraries and the deleted-file log
//! - [`IVersionCache`] - Cached remote item snapshots
//! - [`ILocalFileSystem`] - Stat, hash and mtime of attachment files
//! - [`IConflictPrompt`] - User choice between local and remote versions

pub mod conflict_prompt;
pub mod local_filesystem;
pub mod record_store;
pub mod version_cache;

pub use conflict_prompt::IConflictPrompt;
pub use local_filesystem::{FileSystemState, ILocalFileSystem};
pub use record_store::{AttachmentFilter, IAttachmentStore, ID_CHUNK_SIZE, MAX_BOUND_PARAMETERS};
pub use version_cache::{IVersionCache, ITEM_OBJECT_TYPE};
