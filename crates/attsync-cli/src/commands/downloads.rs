//! Downloads command - List attachments waiting for download
//!
//! By default the list honours the library's download mode: on-demand
//! libraries only show forced downloads and disabled libraries show nothing.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use super::{print_records, LibraryArg, Session};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct DownloadsCommand {
    #[command(flatten)]
    pub library: LibraryArg,

    /// Only forced downloads
    #[arg(long)]
    pub forced: bool,

    /// Every pending download, ignoring the download mode
    #[arg(long, conflicts_with = "forced")]
    pub all: bool,
}

impl DownloadsCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let json = format.is_json();
        let formatter = get_formatter(format);
        let Some(session) = Session::open(config_path, &*formatter).await? else {
            return Ok(());
        };
        let library_id = self.library.id();

        let records = if self.forced || self.all {
            session
                .engine
                .files_to_download(library_id, self.forced)
                .await?
        } else {
            session.engine.download_candidates(library_id).await?
        };

        print_records(&*formatter, json, "pending downloads", &records)
    }
}
