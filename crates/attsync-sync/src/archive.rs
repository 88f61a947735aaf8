//! ZIP bundle reading
//!
//! Snapshot attachments (a page plus its resources) are transferred as ZIP
//! bundles. Entry names that do not survive ZIP encoding are stored as
//! base64 with a `%ZB64` suffix.
//!
//! Everything here is blocking; callers run it on the blocking pool.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use base64::Engine;
use tracing::debug;
use zip::ZipArchive;

use crate::SyncError;

/// Suffix marking a base64-encoded entry name
pub const ENCODED_NAME_SUFFIX: &str = "%ZB64";

/// Entry prefix reserved for sync metadata, never extracted
pub const RESERVED_ENTRY_PREFIX: &str = ".zotero";

/// Minimum run of base64-like characters that marks a junk filename
const JUNK_RUN_LENGTH: usize = 130;

/// Decodes a `%ZB64`-suffixed entry name; other names are returned as is
///
/// A suffix over invalid base64 leaves the raw name untouched.
pub fn decode_entry_name(raw: &str) -> String {
    let Some(encoded) = raw.strip_suffix(ENCODED_NAME_SUFFIX) else {
        return raw.to_string();
    };
    match base64::engine::general_purpose::STANDARD.decode(encoded) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            debug!(name = raw, error = %e, "entry name is not valid base64");
            raw.to_string()
        }
    }
}

/// Returns true if `name` contains a run of at least 130 `[A-Za-z0-9+=]`
/// characters
///
/// Such names come from advertising junk files whose extraction failures
/// are ignored.
pub fn looks_like_junk_name(name: &str) -> bool {
    let mut run = 0usize;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '+' || c == '=' {
            run += 1;
            if run >= JUNK_RUN_LENGTH {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// One file inside a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    /// Position in the archive's central directory
    pub index: usize,
    /// Decoded `/`-separated relative path
    pub path: String,
}

// ============================================================================
// ZipBundle
// ============================================================================

/// An opened and verified ZIP bundle
pub struct ZipBundle {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl std::fmt::Debug for ZipBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipBundle")
            .field("path", &self.path)
            .field("entries", &self.archive.len())
            .finish()
    }
}

impl ZipBundle {
    /// Opens the bundle and checks every entry's CRC
    ///
    /// # Errors
    ///
    /// `NotFound` if the file is missing, `ArchiveCorrupt` if it is not a
    /// readable ZIP file.
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                SyncError::NotFound(format!("downloaded ZIP file {}", path.display()))
            } else {
                SyncError::fs(path, "open", e)
            }
        })?;
        let mut archive = ZipArchive::new(file).map_err(|source| SyncError::ArchiveCorrupt {
            path: path.to_path_buf(),
            source,
        })?;
        Self::verify(&mut archive).map_err(|source| SyncError::ArchiveCorrupt {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), entries = archive.len(), "ZIP file is OK");
        Ok(Self {
            path: path.to_path_buf(),
            archive,
        })
    }

    fn verify(archive: &mut ZipArchive<File>) -> zip::result::ZipResult<()> {
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            io::copy(&mut entry, &mut io::sink())?;
        }
        Ok(())
    }

    /// Path of the bundle on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Files to extract, in archive order
    ///
    /// Directories and reserved `.zotero*` entries are left out.
    pub fn entries(&mut self) -> Result<Vec<BundleEntry>, SyncError> {
        let mut entries = Vec::new();
        for index in 0..self.archive.len() {
            let entry = self
                .archive
                .by_index_raw(index)
                .map_err(|source| SyncError::ArchiveCorrupt {
                    path: self.path.clone(),
                    source,
                })?;
            let path = decode_entry_name(entry.name());
            if path.starts_with(RESERVED_ENTRY_PREFIX) {
                debug!(entry = %path, "skipping reserved entry");
                continue;
            }
            if entry.is_dir() {
                debug!(entry = %path, "skipping directory");
                continue;
            }
            entries.push(BundleEntry { index, path });
        }
        Ok(entries)
    }

    /// Writes one entry's contents to `dest`, creating parent directories
    pub fn extract(&mut self, entry: &BundleEntry, dest: &Path) -> io::Result<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut source = self
            .archive
            .by_index(entry.index)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut out = File::create(dest)?;
        io::copy(&mut source, &mut out)?;
        Ok(())
    }
}
