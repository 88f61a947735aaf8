//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and unsupported library operations.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid item key format
    #[error("Invalid item key: {0}")]
    InvalidKey(String),

    /// Invalid hash format (expected 32 hex characters)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid modification time
    #[error("Invalid modification time: {0}")]
    InvalidModTime(String),

    /// Unknown sync state or link mode code read from storage
    #[error("Unknown {kind} code: {code}")]
    UnknownCode {
        /// Which enumeration the code belongs to
        kind: &'static str,
        /// The offending value
        code: i64,
    },

    /// Operation is not available for this library type
    #[error("Cannot {operation} for {library_type} library")]
    UnsupportedLibrary {
        /// The attempted operation
        operation: String,
        /// The library type the operation was attempted on
        library_type: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
