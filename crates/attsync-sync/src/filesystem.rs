//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Missing paths**: `ENOENT`, `ENAMETOOLONG` and Windows'
//!   `ERROR_PATH_NOT_FOUND` all mean "the file is not there" and produce
//!   [`FileSystemState::not_found`] instead of an error.
//! - **MD5**: Content hashes are streamed in 64 KiB blocks so large
//!   attachments are never read into memory at once.
//! - **mtime**: `std::fs::File::set_times` runs on the blocking pool; only the
//!   modification time is written.

use std::fs::FileTimes;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;
use attsync_core::{
    domain::newtypes::{ContentHash, ModTime},
    ports::local_filesystem::{FileSystemState, ILocalFileSystem},
};
use md5::{Digest, Md5};
use tracing::{debug, instrument};

const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Windows `ERROR_PATH_NOT_FOUND`
#[cfg(windows)]
const ERROR_PATH_NOT_FOUND: i32 = 3;

/// Returns true if the error means the path does not exist
///
/// Overlong names cannot exist either, so they count as missing.
pub fn is_missing_path_error(err: &std::io::Error) -> bool {
    if err.kind() == ErrorKind::NotFound {
        return true;
    }
    #[cfg(unix)]
    if err.raw_os_error() == Some(libc::ENAMETOOLONG) {
        return true;
    }
    #[cfg(windows)]
    if err.raw_os_error() == Some(ERROR_PATH_NOT_FOUND) {
        return true;
    }
    false
}

// ============================================================================
// LocalFileSystemAdapter struct
// ============================================================================

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// This is a zero-sized struct because all operations derive their context
/// from the path arguments. The storage root lives in
/// [`StorageLayout`](attsync_core::domain::StorageLayout).
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn md5_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; HASH_BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn set_file_mtime(path: &Path, mod_time: ModTime) -> std::io::Result<()> {
    let times = FileTimes::new().set_modified(mod_time.to_system_time());
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_times(times)
}

// ============================================================================
// ILocalFileSystem implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if is_missing_path_error(&e) => {
                debug!("path not found");
                return Ok(FileSystemState::not_found());
            }
            Err(e) => return Err(e.into()),
        };

        let is_file = metadata.is_file();
        let size = metadata.len();
        let modified = metadata.modified().ok().map(ModTime::from_system_time);

        debug!(exists = true, is_file, size, "state retrieved");

        Ok(FileSystemState {
            exists: true,
            is_file,
            size,
            modified,
        })
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn compute_hash(&self, path: &Path) -> anyhow::Result<ContentHash> {
        debug!("computing md5");
        let owned: PathBuf = path.to_path_buf();
        let hex = tokio::task::spawn_blocking(move || md5_file(&owned))
            .await
            .context("hash task panicked")??;
        debug!(hash = %hex, "hash computed");
        Ok(ContentHash::new(hex)?)
    }

    #[instrument(skip(self), fields(path = %path.display(), mtime = %mod_time))]
    async fn set_modification_time(&self, path: &Path, mod_time: ModTime) -> anyhow::Result<()> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || set_file_mtime(&owned, mod_time))
            .await
            .context("mtime task panicked")??;
        debug!("modification time set");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()> {
        debug!("creating directory");
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================
