//! Conflict prompt port (driving/primary port)
//!
//! Presents file conflicts to the user and returns the chosen side of each.

use crate::domain::{ConflictCase, ItemSnapshot};

/// Port trait for choosing the winning side of each conflict
#[async_trait::async_trait]
pub trait IConflictPrompt: Send + Sync {
    /// Returns one chosen snapshot per case, in the same order
    ///
    /// `None` means the user cancelled; no state is changed.
    async fn resolve(&self, cases: &[ConflictCase]) -> anyhow::Result<Option<Vec<ItemSnapshot>>>;
}
