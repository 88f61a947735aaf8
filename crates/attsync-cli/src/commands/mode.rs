//! Mode command - Show or change a library's storage and download mode
//!
//! Switching the personal library to another storage backend marks every
//! imported attachment for upload. Changes are written back to the
//! configuration file.

use std::path::Path;

use anyhow::{Context, Result};
use attsync_core::domain::{DownloadMode, StorageMode};
use clap::Subcommand;
use tracing::info;

use super::{LibraryArg, Session};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ModeCommand {
    /// Show the library's storage settings
    Show {
        #[command(flatten)]
        library: LibraryArg,
    },
    /// Change the storage backend or download mode
    Set {
        #[command(flatten)]
        library: LibraryArg,
        /// Storage backend: webdav or zfs (personal library only)
        #[arg(long)]
        protocol: Option<StorageMode>,
        /// Download mode: on_sync or on_demand
        #[arg(long)]
        download: Option<DownloadMode>,
    },
}

impl ModeCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ModeCommand::Show { library } => self.execute_show(config_path, *library, format).await,
            ModeCommand::Set {
                library,
                protocol,
                download,
            } => {
                self.execute_set(config_path, *library, *protocol, *download, format)
                    .await
            }
        }
    }

    async fn execute_show(
        &self,
        config_path: &Path,
        library: LibraryArg,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = get_formatter(format);
        let Some(session) = Session::open(config_path, &*formatter).await? else {
            return Ok(());
        };

        let profile = session.engine.profile(library.id()).await?;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(profile)?);
        } else {
            formatter.success(&format!("Library {} ({})", profile.library_id, profile.library_type));
            formatter.info(&format!("enabled:       {}", profile.enabled));
            formatter.info(&format!("storage mode:  {}", profile.mode));
            formatter.info(&format!("download mode: {}", profile.download_mode));
        }
        Ok(())
    }

    async fn execute_set(
        &self,
        config_path: &Path,
        library: LibraryArg,
        protocol: Option<StorageMode>,
        download: Option<DownloadMode>,
        format: OutputFormat,
    ) -> Result<()> {
        let json = format.is_json();
        let formatter = get_formatter(format);

        if protocol.is_none() && download.is_none() {
            formatter.error("Nothing to change: pass --protocol and/or --download");
            return Ok(());
        }

        let Some(mut session) = Session::open(config_path, &*formatter).await? else {
            return Ok(());
        };
        let library_id = library.id();

        let mut mode_changed = false;
        if let Some(mode) = protocol {
            mode_changed = session.engine.set_mode_for_library(library_id, mode).await?;
        }
        if let Some(mode) = download {
            session.engine.set_download_mode(library_id, mode).await?;
        }

        session.config.storage = session.engine.storage_config().await;
        session
            .config
            .save(config_path)
            .context("Failed to write configuration file")?;
        info!(config_path = %config_path.display(), "Storage settings saved");

        let profile = session.engine.profile(library_id).await?;
        if json {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "mode_changed": mode_changed,
                "storage": profile,
            }));
            return Ok(());
        }

        formatter.success(&format!(
            "Library {}: storage mode {}, download mode {}",
            library_id, profile.mode, profile.download_mode
        ));
        if mode_changed {
            formatter.info("All imported attachments were marked for upload.");
        }
        Ok(())
    }
}
