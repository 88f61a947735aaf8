//! CLI subcommands
//!
//! Commands that touch attachment state open a [`Session`]: the typed
//! configuration, the SQLite store and a [`SyncStateEngine`] wired to the
//! local filesystem.

pub mod apply;
pub mod completions;
pub mod config;
pub mod conflicts;
pub mod downloads;
pub mod mode;
pub mod scan;
pub mod status;
pub mod uploads;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use attsync_cache::{DatabasePool, SqliteAttachmentStore, SqliteVersionCache};
use attsync_conflict::ConflictResolver;
use attsync_core::{
    config::Config,
    domain::{AttachmentRecord, LibraryId},
};
use attsync_sync::{engine::SyncStateEngine, filesystem::LocalFileSystemAdapter};
use clap::Args;

use crate::output::OutputFormatter;

/// Library selector shared by commands
#[derive(Debug, Clone, Copy, Args)]
pub struct LibraryArg {
    /// Library id (the personal library is 1)
    #[arg(long, short = 'l', default_value_t = 1)]
    pub library: i64,
}

impl LibraryArg {
    pub fn id(&self) -> LibraryId {
        LibraryId::new(self.library)
    }
}

/// Loads the configuration file, or defaults when it does not exist
///
/// Unlike [`Config::load_or_default`], a file that exists but does not
/// parse is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to load configuration {}", path.display()))
}

/// Open database plus the engine built on it
pub struct Session {
    pub config: Config,
    pub pool: DatabasePool,
    pub store: Arc<SqliteAttachmentStore>,
    pub engine: SyncStateEngine,
}

impl Session {
    /// Opens the database named by the configuration
    ///
    /// Returns `None` after reporting the problem when no database exists yet.
    pub async fn open(config_path: &Path, formatter: &dyn OutputFormatter) -> Result<Option<Self>> {
        let config = load_config(config_path)?;
        let db_path = config.paths.database_path();

        if !db_path.exists() {
            formatter.error(&format!("No database found at {}", db_path.display()));
            return Ok(None);
        }

        let pool = DatabasePool::new(&db_path)
            .await
            .context("Failed to open database")?;
        let store = Arc::new(SqliteAttachmentStore::new(pool.pool().clone()));
        let engine = SyncStateEngine::new(
            store.clone(),
            Arc::new(LocalFileSystemAdapter::new()),
            &config,
        );

        Ok(Some(Self {
            config,
            pool,
            store,
            engine,
        }))
    }

    /// Conflict resolver over the same database
    pub fn resolver(&self) -> ConflictResolver {
        ConflictResolver::new(
            self.store.clone(),
            Arc::new(SqliteVersionCache::new(self.pool.pool().clone())),
            Arc::new(LocalFileSystemAdapter::new()),
            self.config.paths.storage_layout(),
        )
    }
}

/// Prints attachment records as a table or a JSON array
pub fn print_records(
    formatter: &dyn OutputFormatter,
    json: bool,
    title: &str,
    records: &[AttachmentRecord],
) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "count": records.len(),
            "attachments": serde_json::to_value(records)?,
        });
        formatter.print_json(&value);
        return Ok(());
    }

    if records.is_empty() {
        formatter.success(&format!("No {title}"));
        return Ok(());
    }

    formatter.success(&format!("{} {}", records.len(), title));
    formatter.info("");
    formatter.info("        ID Key      State           Path");
    formatter.info("  -------- -------- --------------- --------------------");
    for record in records {
        formatter.info(&format!(
            "{:>8} {:<8} {:<15} {}",
            record.id.as_i64(),
            record.key.as_str(),
            record.sync_state.name(),
            record.path
        ));
    }
    Ok(())
}
