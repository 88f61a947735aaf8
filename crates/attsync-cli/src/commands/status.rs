//! Status command - Display sync state for a library
//!
//! Provides the `attsync status` CLI command which:
//! 1. Shows the library's resolved storage settings
//! 2. Shows attachment counts by sync state
//! 3. Reports pending forced downloads and locally deleted files

use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::{LibraryArg, Session};
use crate::output::{get_formatter, OutputFormat};

/// Display order of sync states
const STATE_ORDER: [&str; 6] = [
    "IN_SYNC",
    "TO_UPLOAD",
    "TO_DOWNLOAD",
    "FORCE_UPLOAD",
    "FORCE_DOWNLOAD",
    "IN_CONFLICT",
];

#[derive(Debug, Args)]
pub struct StatusCommand {
    #[command(flatten)]
    pub library: LibraryArg,
}

impl StatusCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let Some(session) = Session::open(config_path, &*formatter).await? else {
            return Ok(());
        };
        let library_id = self.library.id();
        let engine = &session.engine;

        let library = engine.library(library_id).await?;
        let profile = engine.profile(library_id).await?;
        let counts = engine.state_counts(library_id).await?;
        let forced = engine.has_forced_downloads(library_id).await?;
        let deleted = engine.deleted_files(library_id).await?;
        let total: u64 = counts.values().sum();

        info!(library = %library_id, total, "Showing status");

        if format.is_json() {
            let json = serde_json::json!({
                "library": {
                    "id": library.id,
                    "type": library.library_type.as_str(),
                    "name": library.name,
                    "editable": library.editable,
                },
                "storage": profile,
                "total_attachments": total,
                "attachments_by_state": counts,
                "has_forced_downloads": forced,
                "deleted_files": deleted,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success(&format!(
            "{} ({} library {})",
            library.name, library.library_type, library.id
        ));
        formatter.info(&format!(
            "File sync: {}",
            if profile.enabled { "enabled" } else { "disabled" }
        ));
        formatter.info(&format!("Storage mode: {}", profile.mode));
        formatter.info(&format!("Download mode: {}", profile.download_mode));
        if !library.editable {
            formatter.info("Read-only library");
        }
        formatter.info("");
        formatter.info(&format!("Attachments: {total}"));
        for state in STATE_ORDER {
            let count = counts.get(state).copied().unwrap_or(0);
            if count > 0 {
                formatter.info(&format!("  {state:<15} {count:>6}"));
            }
        }
        if forced {
            formatter.warn("Forced downloads pending");
        }
        if !deleted.is_empty() {
            formatter.info(&format!("Deleted locally: {}", deleted.len()));
        }
        Ok(())
    }
}
