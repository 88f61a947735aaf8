//! Installation of downloaded attachment files
//!
//! A download arrives as a staged file at `<temp dir>/<key>.tmp`, either the
//! attachment file itself or a ZIP bundle. [`DownloadApplier`] clears the
//! item's storage directory and moves or extracts the payload into it,
//! sanitizing and shortening filenames on the way.
//!
//! Updating the attachment record afterwards is the engine's job; the
//! applier only reports where the primary file ended up.

use std::path::{Path, PathBuf};

use attsync_core::{
    config::DownloadConfig,
    domain::{AttachmentRecord, ContentHash, ItemKey, ModTime, StorageLayout},
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::archive::{looks_like_junk_name, ZipBundle};
use crate::filename::{shortened_name, valid_file_name};
use crate::{Result, SyncError};

/// Extension of Windows shell links, which are never written to disk
const WINDOWS_ALIAS_EXTENSION: &str = ".lnk";

// ============================================================================
// DownloadPayload
// ============================================================================

/// Validated metadata for a staged download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPayload {
    pub key: ItemKey,
    /// Remote modification time, always positive
    pub mod_time: ModTime,
    /// Remote MD5; optional for ZIP bundles
    pub hash: Option<ContentHash>,
    pub is_archive: bool,
}

impl DownloadPayload {
    /// Validates raw download metadata
    ///
    /// # Errors
    ///
    /// `InvalidPayload` when `mtime` is missing, not an integer or not
    /// positive, when `md5` is malformed, or when `md5` is missing for a
    /// single-file download.
    pub fn parse(
        key: ItemKey,
        mtime: Option<&str>,
        md5: Option<&str>,
        is_archive: bool,
    ) -> Result<Self> {
        let raw = mtime
            .filter(|m| !m.is_empty())
            .ok_or_else(|| SyncError::InvalidPayload("mod time not set".to_string()))?;
        let mod_time: ModTime = raw
            .parse()
            .map_err(|_| SyncError::InvalidPayload(format!("invalid mod time '{raw}'")))?;
        if mod_time.as_millis() <= 0 {
            return Err(SyncError::InvalidPayload(format!("invalid mod time '{raw}'")));
        }

        let hash = match md5.filter(|h| !h.is_empty()) {
            Some(h) => Some(
                ContentHash::new(h.to_string())
                    .map_err(|_| SyncError::InvalidPayload(format!("invalid md5 '{h}'")))?,
            ),
            None if is_archive => None,
            None => {
                return Err(SyncError::InvalidPayload(
                    "md5 is required for uncompressed downloads".to_string(),
                ))
            }
        };

        Ok(Self {
            key,
            mod_time,
            hash,
            is_archive,
        })
    }
}

// ============================================================================
// InstallReport
// ============================================================================

/// What happened to one file of a download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryOutcome {
    /// Written under its own name
    Installed { path: PathBuf },
    /// Written under a different name than the one it arrived with
    Renamed { from: String, path: PathBuf },
    /// Not written
    Skipped { name: String, reason: String },
    /// Extraction failed and was ignored
    Failed { name: String, reason: String },
}

/// Result of installing one download
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// False when nothing was written (corrupt bundle, skipped alias)
    pub installed: bool,
    /// Set when the primary file was written under a new name
    pub renamed_to: Option<PathBuf>,
    pub entries: Vec<EntryOutcome>,
}

impl InstallReport {
    fn nothing_installed(reason: EntryOutcome) -> Self {
        Self {
            installed: false,
            renamed_to: None,
            entries: vec![reason],
        }
    }
}

// ============================================================================
// DownloadApplier
// ============================================================================

/// Moves staged downloads into attachment storage
#[derive(Debug, Clone)]
pub struct DownloadApplier {
    layout: StorageLayout,
    temp_dir: PathBuf,
    limits: DownloadConfig,
}

impl DownloadApplier {
    pub fn new(layout: StorageLayout, temp_dir: impl Into<PathBuf>, limits: DownloadConfig) -> Self {
        Self {
            layout,
            temp_dir: temp_dir.into(),
            limits,
        }
    }

    /// Where the transfer layer stages the payload for `key`
    pub fn staged_path(&self, key: &ItemKey) -> PathBuf {
        self.temp_dir.join(format!("{key}.tmp"))
    }

    /// Installs the staged payload for `record`
    pub async fn install(
        &self,
        record: &AttachmentRecord,
        payload: &DownloadPayload,
    ) -> Result<InstallReport> {
        if payload.is_archive {
            self.install_archive(record).await
        } else {
            self.install_file(record).await
        }
    }

    // ------------------------------------------------------------------
    // Single file
    // ------------------------------------------------------------------

    async fn install_file(&self, record: &AttachmentRecord) -> Result<InstallReport> {
        let staged = self.staged_path(&record.key);
        if !tokio::fs::try_exists(&staged)
            .await
            .map_err(|e| SyncError::fs(&staged, "stat", e))?
        {
            return Err(SyncError::NotFound(format!(
                "downloaded file {}",
                staged.display()
            )));
        }

        let dir = self.layout.item_dir(&record.key);
        reset_directory(&dir).await?;

        let Some(file_name) = record.file_name() else {
            return Err(SyncError::InvalidPayload(format!(
                "empty path for item {}",
                record.key
            )));
        };
        if file_name.ends_with(WINDOWS_ALIAS_EXTENSION) {
            debug!(key = %record.key, file_name, "not saving Windows alias");
            return Ok(InstallReport::nothing_installed(EntryOutcome::Skipped {
                name: file_name.to_string(),
                reason: "windows alias".to_string(),
            }));
        }

        let mut renamed = false;
        let mut name = valid_file_name(file_name);
        if name != file_name {
            debug!(from = file_name, to = %name, "filtering filename");
            renamed = true;
        }

        let short = shortened_name(
            &dir,
            &name,
            self.limits.max_path_length,
            self.limits.max_name_length,
        );
        if short != name {
            debug!(from = %name, to = %short, "shortened filename");
            check_shortened(&dir, &short, self.limits.min_shortened_name_length)?;
            name = short;
            renamed = true;
        }

        let dest = dir.join(&name);
        debug!(staged = %staged.display(), dest = %dest.display(), "moving download into place");
        move_file(&staged, &dest).await?;

        let (entry, renamed_to) = if renamed {
            (
                EntryOutcome::Renamed {
                    from: file_name.to_string(),
                    path: dest.clone(),
                },
                Some(dest),
            )
        } else {
            (EntryOutcome::Installed { path: dest }, None)
        };
        Ok(InstallReport {
            installed: true,
            renamed_to,
            entries: vec![entry],
        })
    }

    // ------------------------------------------------------------------
    // ZIP bundle
    // ------------------------------------------------------------------

    async fn install_archive(&self, record: &AttachmentRecord) -> Result<InstallReport> {
        let zip_path = self.staged_path(&record.key);
        let dir = self.layout.item_dir(&record.key);
        let known_name = record.file_name().map(valid_file_name);
        let limits = self.limits.clone();

        tokio::task::spawn_blocking(move || {
            extract_bundle(&zip_path, &dir, known_name.as_deref(), &limits)
        })
        .await
        .map_err(|e| {
            SyncError::fs(
                self.staged_path(&record.key),
                "extract",
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?
    }
}

/// Fails with `PathTooDeep` when shortening left too little of the name
fn check_shortened(dir: &Path, short: &str, min_len: usize) -> Result<()> {
    if short.chars().count() < min_len {
        error!(dir = %dir.display(), name = short, "storage directory is too deep");
        return Err(SyncError::PathTooDeep {
            dir: dir.to_path_buf(),
            shortened: short.to_string(),
        });
    }
    Ok(())
}

/// Removes the directory with everything in it and recreates it empty
async fn reset_directory(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(SyncError::fs(dir, "delete", e)),
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SyncError::fs(dir, "create", e))
}

/// Moves `from` to `to`, copying when they are on different filesystems
///
/// The staged file is removed if the move fails.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    if let Err(e) = tokio::fs::copy(from, to).await {
        let _ = tokio::fs::remove_file(from).await;
        let _ = tokio::fs::remove_file(to).await;
        return Err(SyncError::fs(to, "create", e));
    }
    tokio::fs::remove_file(from)
        .await
        .map_err(|e| SyncError::fs(from, "delete", e))
}

fn reset_directory_blocking(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(SyncError::fs(dir, "delete", e)),
    }
    std::fs::create_dir_all(dir).map_err(|e| SyncError::fs(dir, "create", e))
}

#[cfg(unix)]
fn set_file_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Extracts a verified bundle into `dir`, replacing its contents
///
/// A corrupt bundle is deleted and reported as nothing installed.
fn extract_bundle(
    zip_path: &Path,
    dir: &Path,
    known_name: Option<&str>,
    limits: &DownloadConfig,
) -> Result<InstallReport> {
    let mut bundle = match ZipBundle::open(zip_path) {
        Ok(bundle) => bundle,
        Err(SyncError::ArchiveCorrupt { path, source }) => {
            warn!(path = %path.display(), error = %source, "not a valid ZIP file");
            std::fs::remove_file(&path).map_err(|e| SyncError::fs(&path, "delete", e))?;
            return Ok(InstallReport::nothing_installed(EntryOutcome::Failed {
                name: path.display().to_string(),
                reason: format!("corrupt archive: {source}"),
            }));
        }
        Err(e) => return Err(e),
    };

    reset_directory_blocking(dir)?;

    let entries = bundle.entries()?;
    let single = entries.len() == 1;
    let mut report = InstallReport {
        installed: true,
        ..InstallReport::default()
    };

    for entry in &entries {
        let original = entry.path.clone();
        let mut file_path = original
            .split('/')
            .map(valid_file_name)
            .collect::<Vec<_>>()
            .join("/");
        let filtered = file_path != original;
        if filtered {
            debug!(from = %original, to = %file_path, "filtering entry name");
        }
        let mut renamed = false;

        if single {
            if let Some(known) = known_name {
                if known != file_path {
                    warn!(
                        entry = %file_path,
                        known,
                        "renaming single file in ZIP to known filename"
                    );
                    file_path = known.to_string();
                    renamed = true;
                }
            }
        }

        let primary = known_name == Some(file_path.as_str());
        if primary && filtered {
            renamed = true;
        }

        let mut dest = file_path.split('/').fold(dir.to_path_buf(), |p, c| p.join(c));
        if dest.exists() {
            warn!(entry = %file_path, dest = %dest.display(), "ZIP entry already exists");
            report.entries.push(EntryOutcome::Skipped {
                name: file_path,
                reason: "destination exists".to_string(),
            });
            continue;
        }

        let parent = dest.parent().unwrap_or(dir).to_path_buf();
        let leaf = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let short = shortened_name(&parent, &leaf, limits.max_path_length, limits.max_name_length);
        if short != leaf {
            debug!(from = %leaf, to = %short, "shortened entry filename");
            check_shortened(&parent, &short, limits.min_shortened_name_length)?;
            dest = parent.join(&short);
            if primary {
                renamed = true;
            }
        }

        if let Err(e) = bundle.extract(entry, &dest) {
            let _ = std::fs::remove_file(&dest);
            let leaf = dest
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if looks_like_junk_name(&leaf) {
                warn!(dest = %dest.display(), error = %e, "ignoring error extracting junk file");
                report.entries.push(EntryOutcome::Failed {
                    name: file_path,
                    reason: e.to_string(),
                });
                continue;
            }
            return Err(SyncError::fs(&dest, "extract", e));
        }
        set_file_mode(&dest).map_err(|e| SyncError::fs(&dest, "set permissions", e))?;

        if renamed {
            report.renamed_to = Some(dest.clone());
            report.entries.push(EntryOutcome::Renamed {
                from: original,
                path: dest,
            });
        } else {
            report.entries.push(EntryOutcome::Installed { path: dest });
        }
    }

    let zip_path = bundle.path().to_path_buf();
    drop(bundle);
    std::fs::remove_file(&zip_path).map_err(|e| SyncError::fs(&zip_path, "delete", e))?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use attsync_core::domain::{AttachmentId, LibraryId, SyncState};
    use tempfile::TempDir;

    use super::*;
    use crate::archive::tests::write_zip;

    fn key() -> ItemKey {
        "ABCD2345".parse().unwrap()
    }

    fn record(file_name: &str) -> AttachmentRecord {
        AttachmentRecord::new_imported(AttachmentId::new(1), LibraryId::new(1), key(), file_name)
            .with_state(SyncState::ToDownload)
    }

    struct Fixture {
        _root: TempDir,
        storage: PathBuf,
        applier: DownloadApplier,
    }

    fn fixture(limits: DownloadConfig) -> Fixture {
        let root = TempDir::new().unwrap();
        let storage = root.path().join("storage");
        let temp = root.path().join("tmp");
        std::fs::create_dir_all(&temp).unwrap();
        let applier = DownloadApplier::new(StorageLayout::new(&storage), &temp, limits);
        Fixture {
            _root: root,
            storage,
            applier,
        }
    }

    fn payload(is_archive: bool) -> DownloadPayload {
        DownloadPayload {
            key: key(),
            mod_time: ModTime::from_millis(1_000_000),
            hash: None,
            is_archive,
        }
    }

    // ------------------------------------------------------------------
    // Payload validation
    // ------------------------------------------------------------------

    #[test]
    fn test_parse_valid_payload() {
        let p = DownloadPayload::parse(
            key(),
            Some("1500000000000"),
            Some("900150983CD24FB0D6963F7D28E17F72"),
            false,
        )
        .unwrap();
        assert_eq!(p.mod_time.as_millis(), 1_500_000_000_000);
        assert_eq!(p.hash.unwrap().as_str(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_parse_rejects_non_numeric_mtime() {
        let err = DownloadPayload::parse(key(), Some("abc"), Some("x"), false).unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload(ref m) if m.contains("abc")));
    }

    #[test]
    fn test_parse_rejects_missing_or_zero_mtime() {
        for mtime in [None, Some(""), Some("0"), Some("-5"), Some("12.5")] {
            assert!(matches!(
                DownloadPayload::parse(key(), mtime, None, true),
                Err(SyncError::InvalidPayload(_))
            ));
        }
    }

    #[test]
    fn test_parse_md5_required_unless_archive() {
        assert!(matches!(
            DownloadPayload::parse(key(), Some("1000"), None, false),
            Err(SyncError::InvalidPayload(_))
        ));
        let p = DownloadPayload::parse(key(), Some("1000"), None, true).unwrap();
        assert!(p.hash.is_none());
    }

    // ------------------------------------------------------------------
    // Single file
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_install_single_file() {
        let fx = fixture(DownloadConfig::default());
        std::fs::write(fx.applier.staged_path(&key()), b"pdf bytes").unwrap();
        std::fs::create_dir_all(fx.storage.join("ABCD2345")).unwrap();
        std::fs::write(fx.storage.join("ABCD2345").join("stale.pdf"), b"old").unwrap();

        let report = fx.applier.install(&record("paper.pdf"), &payload(false)).await.unwrap();

        assert!(report.installed);
        assert_eq!(report.renamed_to, None);
        let dest = fx.storage.join("ABCD2345").join("paper.pdf");
        assert_eq!(std::fs::read(&dest).unwrap(), b"pdf bytes");
        assert!(!fx.storage.join("ABCD2345").join("stale.pdf").exists());
        assert!(!fx.applier.staged_path(&key()).exists());
    }

    #[tokio::test]
    async fn test_install_single_file_missing_staged() {
        let fx = fixture(DownloadConfig::default());
        let err = fx.applier.install(&record("paper.pdf"), &payload(false)).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_install_single_file_filters_name() {
        let fx = fixture(DownloadConfig::default());
        std::fs::write(fx.applier.staged_path(&key()), b"x").unwrap();

        let report = fx.applier.install(&record("a:b.pdf"), &payload(false)).await.unwrap();
        assert_eq!(
            report.renamed_to,
            Some(fx.storage.join("ABCD2345").join("ab.pdf"))
        );
    }

    #[tokio::test]
    async fn test_install_skips_windows_alias() {
        let fx = fixture(DownloadConfig::default());
        std::fs::write(fx.applier.staged_path(&key()), b"x").unwrap();

        let report = fx.applier.install(&record("shortcut.lnk"), &payload(false)).await.unwrap();
        assert!(!report.installed);
    }

    #[tokio::test]
    async fn test_install_path_too_deep() {
        let limits = DownloadConfig {
            max_name_length: 20,
            ..DownloadConfig::default()
        };
        let fx = fixture(limits);
        std::fs::write(fx.applier.staged_path(&key()), b"x").unwrap();

        let name = format!("{}.pdf", "n".repeat(60));
        let err = fx.applier.install(&record(&name), &payload(false)).await.unwrap_err();
        assert!(matches!(err, SyncError::PathTooDeep { .. }));
    }

    // ------------------------------------------------------------------
    // ZIP bundles
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_install_archive() {
        let fx = fixture(DownloadConfig::default());
        let zip = fx.applier.staged_path(&key());
        write_zip(
            &zip,
            &[
                ("index.html", b"<html/>"),
                ("files/style.css", b"css"),
                (".zotero-ft-cache", b"cache"),
            ],
        );

        let report = fx.applier.install(&record("index.html"), &payload(true)).await.unwrap();

        assert!(report.installed);
        assert_eq!(report.renamed_to, None);
        assert_eq!(report.entries.len(), 2);
        let item_dir = fx.storage.join("ABCD2345");
        assert!(item_dir.join("index.html").exists());
        assert!(item_dir.join("files").join("style.css").exists());
        assert!(!item_dir.join(".zotero-ft-cache").exists());
        assert!(!zip.exists());
    }

    #[tokio::test]
    async fn test_install_archive_single_entry_renamed_to_known_name() {
        let fx = fixture(DownloadConfig::default());
        write_zip(&fx.applier.staged_path(&key()), &[("oldname.html", b"<html/>")]);

        let report = fx.applier.install(&record("newname.html"), &payload(true)).await.unwrap();

        let renamed = report.renamed_to.unwrap();
        assert!(renamed.ends_with("newname.html"));
        assert!(renamed.exists());
    }

    #[tokio::test]
    async fn test_install_archive_skips_existing_destination() {
        let fx = fixture(DownloadConfig::default());
        // Two entries collapse to the same sanitized name
        write_zip(
            &fx.applier.staged_path(&key()),
            &[("index.html", b"first"), ("in:dex.html", b"second"), ("a.png", b"png")],
        );

        let report = fx.applier.install(&record("index.html"), &payload(true)).await.unwrap();

        let skipped = report
            .entries
            .iter()
            .filter(|e| matches!(e, EntryOutcome::Skipped { .. }))
            .count();
        assert_eq!(skipped, 1);
        assert_eq!(report.entries.len() - skipped, 2);
        let dest = fx.storage.join("ABCD2345").join("index.html");
        assert_eq!(std::fs::read(dest).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_install_archive_path_too_deep() {
        let limits = DownloadConfig {
            max_name_length: 20,
            ..DownloadConfig::default()
        };
        let fx = fixture(limits);
        let long = format!("{}.html", "n".repeat(60));
        write_zip(
            &fx.applier.staged_path(&key()),
            &[("index.html", b"<html/>"), (long.as_str(), b"page")],
        );

        let err = fx.applier.install(&record("index.html"), &payload(true)).await.unwrap_err();

        match err {
            SyncError::PathTooDeep { dir, shortened } => {
                assert_eq!(dir, fx.storage.join("ABCD2345"));
                assert!(shortened.len() < 40);
            }
            other => panic!("expected PathTooDeep, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_install_archive_ignores_junk_extraction_errors() {
        let fx = fixture(DownloadConfig::default());
        let junk = format!("sub/ad_{}.gif", "Ab9+=".repeat(30));
        // `sub` is extracted as a file, so nothing can be written beneath it
        write_zip(
            &fx.applier.staged_path(&key()),
            &[
                ("index.html", b"<html/>"),
                ("sub", b"not a directory"),
                (junk.as_str(), b"gif"),
                ("style.css", b"css"),
            ],
        );

        let report = fx.applier.install(&record("index.html"), &payload(true)).await.unwrap();

        assert!(report.installed);
        let failed: Vec<_> = report
            .entries
            .iter()
            .filter(|e| matches!(e, EntryOutcome::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        let item_dir = fx.storage.join("ABCD2345");
        assert!(item_dir.join("index.html").exists());
        assert!(item_dir.join("style.css").exists());
    }

    #[tokio::test]
    async fn test_install_archive_fails_on_other_extraction_errors() {
        let fx = fixture(DownloadConfig::default());
        write_zip(
            &fx.applier.staged_path(&key()),
            &[
                ("index.html", b"<html/>"),
                ("sub", b"not a directory"),
                ("sub/page.html", b"page"),
            ],
        );

        let err = fx.applier.install(&record("index.html"), &payload(true)).await.unwrap_err();
        assert!(matches!(err, SyncError::FilesystemAccess { operation: "extract", .. }));
    }

    #[tokio::test]
    async fn test_install_corrupt_archive_installs_nothing() {
        let fx = fixture(DownloadConfig::default());
        let zip = fx.applier.staged_path(&key());
        std::fs::write(&zip, b"garbage").unwrap();

        let report = fx.applier.install(&record("index.html"), &payload(true)).await.unwrap();

        assert!(!report.installed);
        assert!(!zip.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_archive_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let fx = fixture(DownloadConfig::default());
        write_zip(&fx.applier.staged_path(&key()), &[("index.html", b"<html/>")]);
        fx.applier.install(&record("index.html"), &payload(true)).await.unwrap();

        let meta = std::fs::metadata(fx.storage.join("ABCD2345").join("index.html")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o644);
    }
}
