//! Configuration module for attsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! Per-library storage settings are resolved here into a
//! [`LibraryStorageProfile`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{
    errors::DomainError, DownloadMode, Library, LibraryStorageProfile, LibraryType, StorageLayout,
    StorageMode,
};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for attsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub paths: PathsConfig,
    pub download: DownloadConfig,
    pub logging: LoggingConfig,
}

/// File sync settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// File sync for the personal library (and its publications).
    pub enabled: bool,
    /// File sync for group libraries.
    pub groups_enabled: bool,
    /// Backend used by the personal library.
    pub protocol: StorageMode,
    /// Download mode of the personal library.
    pub download_mode_personal: DownloadMode,
    /// Download mode of group libraries.
    pub download_mode_groups: DownloadMode,
    /// Window, in seconds, within which synced files are re-checked for local edits.
    pub max_check_age_secs: u64,
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Data directory holding `storage/` and the database.
    pub data_dir: PathBuf,
    /// Directory where downloads are staged as `<key>.tmp`.
    pub temp_dir: PathBuf,
}

/// Limits applied when installing downloaded files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Longest full path the filesystem accepts.
    pub max_path_length: usize,
    /// Longest single filename the filesystem accepts.
    pub max_name_length: usize,
    /// Shortened filenames below this length are rejected as unusable.
    pub min_shortened_name_length: usize,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Optional log file; logs go to stderr when unset.
    pub file: Option<PathBuf>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load() / save()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/attsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("attsync")
            .join("config.yaml")
    }
}

impl PathsConfig {
    /// Storage layout under the data directory.
    pub fn storage_layout(&self) -> StorageLayout {
        StorageLayout::from_data_dir(&self.data_dir)
    }

    /// SQLite database path.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("attsync.db")
    }
}

// ---------------------------------------------------------------------------
// Per-library storage resolution
// ---------------------------------------------------------------------------

impl StorageConfig {
    /// Whether file sync runs for libraries of this type.
    pub fn enabled_for(&self, library_type: LibraryType) -> bool {
        match library_type {
            LibraryType::User | LibraryType::Publications => self.enabled,
            LibraryType::Group => self.groups_enabled,
            LibraryType::Feed => false,
        }
    }

    /// Backend used by libraries of this type. Groups always use hosted storage.
    pub fn mode_for(&self, library_type: LibraryType) -> StorageMode {
        match library_type {
            LibraryType::Group => StorageMode::Zfs,
            LibraryType::User | LibraryType::Publications | LibraryType::Feed => self.protocol,
        }
    }

    /// Download mode for libraries of this type.
    ///
    /// Only the user library follows the personal setting; every other
    /// library follows the group setting.
    pub fn download_mode_for(&self, library_type: LibraryType) -> DownloadMode {
        match library_type {
            LibraryType::User => self.download_mode_personal,
            LibraryType::Group | LibraryType::Publications | LibraryType::Feed => {
                self.download_mode_groups
            }
        }
    }

    /// Resolve all storage settings for one library.
    pub fn profile_for(&self, library: &Library) -> LibraryStorageProfile {
        LibraryStorageProfile {
            library_id: library.id,
            library_type: library.library_type,
            enabled: self.enabled_for(library.library_type),
            mode: self.mode_for(library.library_type),
            download_mode: self.download_mode_for(library.library_type),
        }
    }

    /// Change the backend of the user library.
    ///
    /// Returns whether the mode actually changed.
    pub fn set_mode_for(
        &mut self,
        library: &Library,
        mode: StorageMode,
    ) -> Result<bool, DomainError> {
        if !library.is_user() {
            return Err(DomainError::UnsupportedLibrary {
                operation: "set storage mode".to_string(),
                library_type: library.library_type.to_string(),
            });
        }
        let changed = self.protocol != mode;
        self.protocol = mode;
        Ok(changed)
    }

    /// Change the download mode of the user library or of all other
    /// libraries. Feeds have no files to download.
    pub fn set_download_mode_for(
        &mut self,
        library: &Library,
        mode: DownloadMode,
    ) -> Result<(), DomainError> {
        match library.library_type {
            LibraryType::User => self.download_mode_personal = mode,
            LibraryType::Group | LibraryType::Publications => self.download_mode_groups = mode,
            LibraryType::Feed => {
                return Err(DomainError::UnsupportedLibrary {
                    operation: "set download mode".to_string(),
                    library_type: library.library_type.to_string(),
                })
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            groups_enabled: true,
            protocol: StorageMode::Zfs,
            download_mode_personal: DownloadMode::OnSync,
            download_mode_groups: DownloadMode::OnSync,
            max_check_age_secs: 3 * 60 * 60,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("attsync");
        Self {
            data_dir,
            temp_dir: std::env::temp_dir().join("attsync"),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_path_length: if cfg!(windows) { 259 } else { 4096 },
            max_name_length: 255,
            min_shortened_name_length: 40,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"storage.max_check_age_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- storage ---
        if self.storage.max_check_age_secs == 0 {
            errors.push(ValidationError {
                field: "storage.max_check_age_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- paths ---
        if self.paths.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "paths.data_dir".into(),
                message: "must not be empty".into(),
            });
        }
        if self.paths.temp_dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "paths.temp_dir".into(),
                message: "must not be empty".into(),
            });
        }

        // --- download ---
        if self.download.max_name_length == 0 {
            errors.push(ValidationError {
                field: "download.max_name_length".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.download.max_name_length > self.download.max_path_length {
            errors.push(ValidationError {
                field: "download.max_name_length".into(),
                message: format!(
                    "max_name_length ({}) must not exceed max_path_length ({})",
                    self.download.max_name_length, self.download.max_path_length
                ),
            });
        }
        if self.download.min_shortened_name_length >= self.download.max_name_length {
            errors.push(ValidationError {
                field: "download.min_shortened_name_length".into(),
                message: format!(
                    "min_shortened_name_length ({}) must be below max_name_length ({})",
                    self.download.min_shortened_name_length, self.download.max_name_length
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use attsync_core::config::ConfigBuilder;
/// use attsync_core::domain::StorageMode;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .data_dir(PathBuf::from("/home/user/attsync"))
///     .storage_protocol(StorageMode::WebDav)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- storage ---

    pub fn storage_enabled(mut self, enabled: bool) -> Self {
        self.config.storage.enabled = enabled;
        self
    }

    pub fn storage_groups_enabled(mut self, enabled: bool) -> Self {
        self.config.storage.groups_enabled = enabled;
        self
    }

    pub fn storage_protocol(mut self, mode: StorageMode) -> Self {
        self.config.storage.protocol = mode;
        self
    }

    pub fn download_mode_personal(mut self, mode: DownloadMode) -> Self {
        self.config.storage.download_mode_personal = mode;
        self
    }

    pub fn download_mode_groups(mut self, mode: DownloadMode) -> Self {
        self.config.storage.download_mode_groups = mode;
        self
    }

    pub fn max_check_age_secs(mut self, secs: u64) -> Self {
        self.config.storage.max_check_age_secs = secs;
        self
    }

    // --- paths ---

    pub fn data_dir(mut self, dir: PathBuf) -> Self {
        self.config.paths.data_dir = dir;
        self
    }

    pub fn temp_dir(mut self, dir: PathBuf) -> Self {
        self.config.paths.temp_dir = dir;
        self
    }

    // --- download ---

    pub fn max_path_length(mut self, n: usize) -> Self {
        self.config.download.max_path_length = n;
        self
    }

    pub fn max_name_length(mut self, n: usize) -> Self {
        self.config.download.max_name_length = n;
        self
    }

    pub fn min_shortened_name_length(mut self, n: usize) -> Self {
        self.config.download.min_shortened_name_length = n;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = Some(file);
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::domain::LibraryId;

    fn library(t: LibraryType) -> Library {
        Library::new(LibraryId::new(1), t, "lib")
    }

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert!(cfg.storage.enabled);
        assert!(cfg.storage.groups_enabled);
        assert_eq!(cfg.storage.protocol, StorageMode::Zfs);
        assert_eq!(cfg.storage.max_check_age_secs, 10_800);
        assert_eq!(cfg.download.max_name_length, 255);
        assert_eq!(cfg.download.min_shortened_name_length, 40);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.paths.data_dir.to_string_lossy().contains("attsync"));
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
storage:
  enabled: true
  groups_enabled: false
  protocol: webdav
  download_mode_personal: on_demand
  download_mode_groups: on_sync
  max_check_age_secs: 600
paths:
  data_dir: /tmp/attsync-data
  temp_dir: /tmp/attsync-tmp
download:
  max_path_length: 1024
  max_name_length: 200
  min_shortened_name_length: 30
logging:
  level: debug
  file: /tmp/attsync.log
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert!(!cfg.storage.groups_enabled);
        assert_eq!(cfg.storage.protocol, StorageMode::WebDav);
        assert_eq!(cfg.storage.download_mode_personal, DownloadMode::OnDemand);
        assert_eq!(cfg.storage.max_check_age_secs, 600);
        assert_eq!(cfg.paths.data_dir, PathBuf::from("/tmp/attsync-data"));
        assert_eq!(cfg.download.max_name_length, 200);
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.file, Some(PathBuf::from("/tmp/attsync.log")));
    }

    #[test]
    fn load_partial_yaml_fills_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"storage:\n  protocol: webdav\n").unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.storage.protocol, StorageMode::WebDav);
        assert_eq!(cfg.storage.max_check_age_secs, 10_800);
        assert_eq!(cfg.download.max_name_length, 255);
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.storage.max_check_age_secs, 10_800);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let cfg = ConfigBuilder::new()
            .storage_protocol(StorageMode::WebDav)
            .max_check_age_secs(42)
            .build();
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.storage, cfg.storage);
    }

    // -- Validation --

    #[test]
    fn validate_catches_zero_check_age() {
        let mut cfg = Config::default();
        cfg.storage.max_check_age_secs = 0;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "storage.max_check_age_secs"));
    }

    #[test]
    fn validate_catches_name_longer_than_path() {
        let cfg = ConfigBuilder::new()
            .max_path_length(100)
            .max_name_length(200)
            .build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "download.max_name_length"));
    }

    #[test]
    fn validate_catches_min_shortened_too_large() {
        let cfg = ConfigBuilder::new().min_shortened_name_length(255).build();
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "download.min_shortened_name_length"));
    }

    #[test]
    fn validate_catches_invalid_log_level() {
        let cfg = ConfigBuilder::new().logging_level("verbose").build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.level"));
    }

    #[test]
    fn validate_accepts_all_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let cfg = ConfigBuilder::new().logging_level(*level).build();
            assert!(
                !cfg.validate().iter().any(|e| e.field == "logging.level"),
                "level {level} should be valid"
            );
        }
    }

    // -- Builder --

    #[test]
    fn builder_build_validated_fails_for_invalid_config() {
        let result = ConfigBuilder::new()
            .max_check_age_secs(0)
            .logging_level("nope")
            .build_validated();
        let errors = result.unwrap_err();
        assert!(errors.len() >= 2);
    }

    #[test]
    fn default_path_ends_with_config_yaml() {
        let path = Config::default_path();
        assert!(path.ends_with("attsync/config.yaml"));
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "logging.level".into(),
            message: "bad".into(),
        };
        assert_eq!(err.to_string(), "logging.level: bad");
    }

    // -- Library resolution --

    #[test]
    fn enabled_for_library_types() {
        let cfg = ConfigBuilder::new()
            .storage_enabled(true)
            .storage_groups_enabled(false)
            .build();
        assert!(cfg.storage.enabled_for(LibraryType::User));
        assert!(cfg.storage.enabled_for(LibraryType::Publications));
        assert!(!cfg.storage.enabled_for(LibraryType::Group));
        assert!(!cfg.storage.enabled_for(LibraryType::Feed));
    }

    #[test]
    fn groups_always_use_zfs() {
        let cfg = ConfigBuilder::new()
            .storage_protocol(StorageMode::WebDav)
            .build();
        assert_eq!(cfg.storage.mode_for(LibraryType::User), StorageMode::WebDav);
        assert_eq!(cfg.storage.mode_for(LibraryType::Feed), StorageMode::WebDav);
        assert_eq!(cfg.storage.mode_for(LibraryType::Group), StorageMode::Zfs);
    }

    #[test]
    fn profile_uses_group_download_mode() {
        let cfg = ConfigBuilder::new()
            .download_mode_groups(DownloadMode::OnDemand)
            .build();
        let group = cfg.storage.profile_for(&library(LibraryType::Group));
        let user = cfg.storage.profile_for(&library(LibraryType::User));
        assert!(group.download_as_needed());
        assert!(user.download_on_sync());
    }

    #[test]
    fn only_user_library_follows_personal_download_mode() {
        let cfg = ConfigBuilder::new()
            .download_mode_personal(DownloadMode::OnDemand)
            .download_mode_groups(DownloadMode::OnSync)
            .build();
        assert_eq!(cfg.storage.download_mode_for(LibraryType::User), DownloadMode::OnDemand);
        for other in [LibraryType::Group, LibraryType::Publications, LibraryType::Feed] {
            assert_eq!(cfg.storage.download_mode_for(other), DownloadMode::OnSync);
        }

        let mut storage = cfg.storage;
        storage
            .set_download_mode_for(&library(LibraryType::Publications), DownloadMode::OnDemand)
            .unwrap();
        assert_eq!(storage.download_mode_groups, DownloadMode::OnDemand);
        assert_eq!(storage.download_mode_personal, DownloadMode::OnDemand);
    }

    #[test]
    fn set_mode_only_for_user_library() {
        let mut storage = StorageConfig::default();
        assert!(storage
            .set_mode_for(&library(LibraryType::User), StorageMode::WebDav)
            .unwrap());
        assert!(!storage
            .set_mode_for(&library(LibraryType::User), StorageMode::WebDav)
            .unwrap());

        let err = storage
            .set_mode_for(&library(LibraryType::Group), StorageMode::WebDav)
            .unwrap_err();
        assert!(matches!(err, DomainError::UnsupportedLibrary { .. }));
    }

    #[test]
    fn set_download_mode_rejects_feeds() {
        let mut storage = StorageConfig::default();
        storage
            .set_download_mode_for(&library(LibraryType::Group), DownloadMode::OnDemand)
            .unwrap();
        assert_eq!(storage.download_mode_groups, DownloadMode::OnDemand);
        assert!(storage
            .set_download_mode_for(&library(LibraryType::Feed), DownloadMode::OnDemand)
            .is_err());
    }
}
