//! Apply command - Install a staged download
//!
//! Provides the `attsync apply` CLI command which installs the payload
//! staged at `<temp_dir>/<key>.tmp` into the attachment's storage
//! directory and records the attachment as in sync. With `--from` the
//! payload is first copied into the staging location.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use attsync_core::domain::{AttachmentId, ItemKey};
use attsync_sync::applier::{DownloadPayload, EntryOutcome};
use clap::Args;
use tracing::info;

use super::Session;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct ApplyCommand {
    /// Attachment id
    pub id: i64,

    /// Item key the payload was downloaded for (defaults to the attachment's key)
    #[arg(long)]
    pub key: Option<ItemKey>,

    /// Remote modification time in milliseconds
    #[arg(long)]
    pub mtime: Option<String>,

    /// Remote MD5 hash; required unless the payload is a ZIP bundle
    #[arg(long)]
    pub md5: Option<String>,

    /// The payload is a ZIP bundle
    #[arg(long)]
    pub archive: bool,

    /// Copy this file into the staging location first
    #[arg(long, value_name = "FILE")]
    pub from: Option<PathBuf>,
}

impl ApplyCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let Some(session) = Session::open(config_path, &*formatter).await? else {
            return Ok(());
        };
        let id = AttachmentId::new(self.id);

        let key = match &self.key {
            Some(key) => key.clone(),
            None => session.engine.state_store().get(id).await?.key,
        };
        let payload = DownloadPayload::parse(
            key,
            self.mtime.as_deref(),
            self.md5.as_deref(),
            self.archive,
        )?;

        if let Some(source) = &self.from {
            let staged = session.engine.applier().staged_path(&payload.key);
            if let Some(parent) = staged.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create staging directory")?;
            }
            tokio::fs::copy(source, &staged)
                .await
                .with_context(|| format!("Failed to stage {}", source.display()))?;
            info!(staged = %staged.display(), "Payload staged");
        }

        let outcome = session.engine.process_download(id, &payload).await?;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&outcome)?);
            return Ok(());
        }

        match &outcome.path {
            Some(path) if outcome.local_changes => {
                formatter.success(&format!("Installed {}", path.display()))
            }
            _ => formatter.warn("Nothing was installed"),
        }
        for entry in &outcome.install.entries {
            let line = match entry {
                EntryOutcome::Installed { path } => format!("installed {}", path.display()),
                EntryOutcome::Renamed { from, path } => {
                    format!("renamed {} -> {}", from, path.display())
                }
                EntryOutcome::Skipped { name, reason } => format!("skipped {name}: {reason}"),
                EntryOutcome::Failed { name, reason } => format!("failed {name}: {reason}"),
            };
            formatter.info(&line);
        }
        Ok(())
    }
}
