//! attsync Conflict - File conflict listing and resolution
//!
//! Provides:
//! - Pairing of in-conflict attachments with their cached remote versions
//! - Resolution through a pluggable conflict prompt
//! - Atomic write-back of the chosen side as a forced transfer

pub mod error;
pub mod resolver;

pub use error::ConflictError;
pub use resolver::ConflictResolver;
