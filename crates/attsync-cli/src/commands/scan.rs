//! Scan command - Check attachment files for local changes
//!
//! Provides the `attsync scan` CLI command which:
//! 1. Compares every scannable attachment's file against its stored sync data
//! 2. Optionally restricts the scan to given ids or to recently synced files
//! 3. Optionally marks files with a newer remote version for download

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use attsync_core::domain::{AttachmentId, ModTime, UploadCheckCache};
use clap::Args;
use tracing::info;

use super::{LibraryArg, Session};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct ScanCommand {
    #[command(flatten)]
    pub library: LibraryArg,

    /// Only check these attachment ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub ids: Option<Vec<i64>>,

    /// Only check files synced within the configured check window
    #[arg(long, conflicts_with = "ids")]
    pub recent: bool,

    /// JSON object mapping attachment ids to remote mtimes in milliseconds
    ///
    /// Attachments whose stored mtime differs are marked for download.
    #[arg(long, value_name = "FILE")]
    pub remote_mtimes: Option<PathBuf>,
}

impl ScanCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let Some(session) = Session::open(config_path, &*formatter).await? else {
            return Ok(());
        };
        let library_id = self.library.id();

        let remote_mtimes = match &self.remote_mtimes {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Some(parse_remote_mtimes(&raw)?)
            }
            None => None,
        };

        let ids: Option<Vec<AttachmentId>> = if self.recent {
            let ids = session
                .engine
                .files_to_check(library_id, &UploadCheckCache::default())
                .await?;
            info!(count = ids.len(), "Checking recently synced files");
            Some(ids)
        } else {
            self.ids
                .as_ref()
                .map(|ids| ids.iter().copied().map(AttachmentId::new).collect())
        };

        let report = session
            .engine
            .check_for_updated_files(library_id, ids.as_deref(), remote_mtimes.as_ref())
            .await?;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&report)?);
            return Ok(());
        }

        formatter.success(&format!(
            "Checked {} file{} in {} ms, {} changed",
            report.checked,
            if report.checked == 1 { "" } else { "s" },
            report.duration_ms,
            report.changed.len()
        ));
        for (id, state) in &report.changed {
            formatter.info(&format!("{:>8} -> {}", id.as_i64(), state.name()));
        }
        for failure in &report.failures {
            formatter.warn(&format!("{}: {}", failure.attachment_id, failure.error));
        }
        Ok(())
    }
}

/// Parses `{"<attachment id>": <mtime ms>, ...}`
fn parse_remote_mtimes(raw: &str) -> Result<HashMap<AttachmentId, ModTime>> {
    let map: HashMap<String, i64> =
        serde_json::from_str(raw).context("Remote mtimes must be a JSON object of integers")?;
    map.into_iter()
        .map(|(id, ms)| {
            let id = id
                .parse::<AttachmentId>()
                .with_context(|| format!("Invalid attachment id '{id}'"))?;
            Ok((id, ModTime::from_millis(ms)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_mtimes() {
        let map = parse_remote_mtimes(r#"{"3": 1650000000000, "17": 5}"#).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            map[&AttachmentId::new(3)],
            ModTime::from_millis(1_650_000_000_000)
        );
        assert_eq!(map[&AttachmentId::new(17)], ModTime::from_millis(5));
    }

    #[test]
    fn test_parse_remote_mtimes_rejects_bad_id() {
        assert!(parse_remote_mtimes(r#"{"abc": 1}"#).is_err());
    }

    #[test]
    fn test_parse_remote_mtimes_rejects_non_object() {
        assert!(parse_remote_mtimes("[1, 2]").is_err());
        assert!(parse_remote_mtimes(r#"{"1": "soon"}"#).is_err());
    }

    #[test]
    fn test_parse_remote_mtimes_empty() {
        assert!(parse_remote_mtimes("{}").unwrap().is_empty());
    }
}
