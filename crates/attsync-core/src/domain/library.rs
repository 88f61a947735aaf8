//! Library entity and per-library storage settings
//!
//! Storage eligibility, backend and download mode depend on the library
//! type. They are resolved once into a [`LibraryStorageProfile`] (see
//! `config::StorageConfig::profile_for`) instead of being re-derived at
//! every call site.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::LibraryId;

/// Kind of library an attachment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryType {
    User,
    Group,
    Publications,
    Feed,
}

impl LibraryType {
    /// Stored name
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryType::User => "user",
            LibraryType::Group => "group",
            LibraryType::Publications => "publications",
            LibraryType::Feed => "feed",
        }
    }
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LibraryType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(LibraryType::User),
            "group" => Ok(LibraryType::Group),
            "publications" => Ok(LibraryType::Publications),
            "feed" => Ok(LibraryType::Feed),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown library type: {other}"
            ))),
        }
    }
}

/// A library as seen by the sync engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub library_type: LibraryType,
    /// Whether the local user may modify items in this library
    pub editable: bool,
    pub name: String,
}

impl Library {
    /// Creates an editable library
    pub fn new(id: LibraryId, library_type: LibraryType, name: impl Into<String>) -> Self {
        Self {
            id,
            library_type,
            editable: true,
            name: name.into(),
        }
    }

    /// Sets the editable flag
    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    /// Returns true for the user's own library
    pub fn is_user(&self) -> bool {
        self.library_type == LibraryType::User
    }
}

/// Remote storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// WebDAV server configured by the user
    #[serde(rename = "webdav")]
    WebDav,
    /// Hosted file storage
    #[default]
    Zfs,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::WebDav => "webdav",
            StorageMode::Zfs => "zfs",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "webdav" => Ok(StorageMode::WebDav),
            "zfs" => Ok(StorageMode::Zfs),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown storage mode: {other}"
            ))),
        }
    }
}

/// When remote files are downloaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// Download every file during sync
    #[default]
    OnSync,
    /// Download only when a file is opened; forced downloads still run
    OnDemand,
}

impl DownloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadMode::OnSync => "on_sync",
            DownloadMode::OnDemand => "on_demand",
        }
    }
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "on_sync" => Ok(DownloadMode::OnSync),
            "on_demand" => Ok(DownloadMode::OnDemand),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown download mode: {other}"
            ))),
        }
    }
}

/// Storage settings resolved for one library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LibraryStorageProfile {
    pub library_id: LibraryId,
    pub library_type: LibraryType,
    /// Whether file sync runs for this library at all
    pub enabled: bool,
    pub mode: StorageMode,
    pub download_mode: DownloadMode,
}

impl LibraryStorageProfile {
    /// Returns true if files are downloaded only when opened
    pub fn download_as_needed(&self) -> bool {
        self.download_mode == DownloadMode::OnDemand
    }

    /// Returns true if files are downloaded during sync
    pub fn download_on_sync(&self) -> bool {
        self.download_mode == DownloadMode::OnSync
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_type_roundtrip() {
        for t in [
            LibraryType::User,
            LibraryType::Group,
            LibraryType::Publications,
            LibraryType::Feed,
        ] {
            assert_eq!(t.as_str().parse::<LibraryType>().unwrap(), t);
        }
        assert!("shared".parse::<LibraryType>().is_err());
    }

    #[test]
    fn test_storage_mode_parse() {
        assert_eq!("WebDAV".parse::<StorageMode>().unwrap(), StorageMode::WebDav);
        assert_eq!("zfs".parse::<StorageMode>().unwrap(), StorageMode::Zfs);
        assert_eq!(
            serde_yaml::to_string(&StorageMode::WebDav).unwrap().trim(),
            "webdav"
        );
    }

    #[test]
    fn test_download_mode_parse_accepts_hyphen() {
        assert_eq!(
            "on-demand".parse::<DownloadMode>().unwrap(),
            DownloadMode::OnDemand
        );
        assert_eq!("on_sync".parse::<DownloadMode>().unwrap(), DownloadMode::OnSync);
    }

    #[test]
    fn test_profile_download_flags() {
        let profile = LibraryStorageProfile {
            library_id: LibraryId::new(1),
            library_type: LibraryType::User,
            enabled: true,
            mode: StorageMode::Zfs,
            download_mode: DownloadMode::OnDemand,
        };
        assert!(profile.download_as_needed());
        assert!(!profile.download_on_sync());
    }
}
