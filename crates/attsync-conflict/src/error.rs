//! Error types for conflict resolution

use attsync_core::domain::AttachmentId;
use thiserror::Error;

/// Errors that can occur while listing or resolving file conflicts
#[derive(Debug, Error)]
pub enum ConflictError {
    /// A case reached write-back without a decision
    #[error("conflict for attachment {0} has no resolution")]
    Unresolved(AttachmentId),

    /// The prompt returned a different number of choices than cases
    #[error("conflict prompt returned {actual} choices for {expected} conflicts")]
    ChoiceCountMismatch { expected: usize, actual: usize },

    /// The conflict prompt failed
    #[error("conflict prompt failed: {0:#}")]
    Prompt(anyhow::Error),

    /// Storage error
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}
