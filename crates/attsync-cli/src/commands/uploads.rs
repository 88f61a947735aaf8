//! Uploads command - List attachments waiting for upload

use std::path::Path;

use anyhow::Result;
use clap::Args;

use super::{print_records, LibraryArg, Session};
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct UploadsCommand {
    #[command(flatten)]
    pub library: LibraryArg,
}

impl UploadsCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let json = format.is_json();
        let formatter = get_formatter(format);
        let Some(session) = Session::open(config_path, &*formatter).await? else {
            return Ok(());
        };

        let records = session.engine.files_to_upload(self.library.id()).await?;
        print_records(&*formatter, json, "pending uploads", &records)
    }
}
