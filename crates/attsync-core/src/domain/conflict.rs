//! Conflict domain entities
//!
//! A [`ConflictCase`] pairs the local view of an attachment in `IN_CONFLICT`
//! with the cached remote snapshot of the same item. Cases are built when
//! conflicts are listed and discarded once a decision is applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attachment::{AttachmentRecord, SyncState};
use super::newtypes::{AttachmentId, ContentHash, ItemKey, LibraryId, ModTime};

/// One side of a conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub key: ItemKey,
    pub version: u32,
    /// File modification time: the local file's mtime, or the cached remote mtime
    pub mod_time: ModTime,
    pub hash: Option<ContentHash>,
    pub file_name: Option<String>,
    /// Remaining item fields, opaque to the sync engine
    #[serde(default)]
    pub fields: serde_json::Value,
}

impl ItemSnapshot {
    /// Creates a snapshot with no extra fields
    pub fn new(key: ItemKey, version: u32, mod_time: ModTime) -> Self {
        Self {
            key,
            version,
            mod_time,
            hash: None,
            file_name: None,
            fields: serde_json::Value::Null,
        }
    }

    /// Local side of a conflict, with the record itself as `fields`
    pub fn from_local(record: &AttachmentRecord, mod_time: ModTime) -> serde_json::Result<Self> {
        Ok(Self::new(record.key.clone(), record.version, mod_time)
            .with_file_name(record.file_name().map(str::to_string))
            .with_fields(serde_json::to_value(record)?))
    }

    /// Sets the content hash
    pub fn with_hash(mut self, hash: Option<ContentHash>) -> Self {
        self.hash = hash;
        self
    }

    /// Sets the file name
    pub fn with_file_name(mut self, file_name: Option<String>) -> Self {
        self.file_name = file_name;
        self
    }

    /// Sets the opaque item fields
    pub fn with_fields(mut self, fields: serde_json::Value) -> Self {
        self.fields = fields;
        self
    }

    /// Date shown to the user when choosing a side
    pub fn date_modified(&self) -> DateTime<Utc> {
        self.mod_time.to_datetime()
    }
}

/// Which side wins a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    KeepLocal,
    KeepRemote,
}

impl Decision {
    /// State written to the attachment when this decision is applied
    pub fn target_state(&self) -> SyncState {
        match self {
            Decision::KeepLocal => SyncState::ForceUpload,
            Decision::KeepRemote => SyncState::ForceDownload,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Decision::KeepLocal => "keep_local",
            Decision::KeepRemote => "keep_remote",
        };
        write!(f, "{}", s)
    }
}

/// A file conflict between the local attachment and its cached remote version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictCase {
    pub library_id: LibraryId,
    pub attachment_id: AttachmentId,
    pub local: ItemSnapshot,
    pub remote: ItemSnapshot,
    pub resolution: Option<Decision>,
}

impl ConflictCase {
    /// Creates an undecided case
    pub fn new(
        library_id: LibraryId,
        attachment_id: AttachmentId,
        local: ItemSnapshot,
        remote: ItemSnapshot,
    ) -> Self {
        Self {
            library_id,
            attachment_id,
            local,
            remote,
            resolution: None,
        }
    }

    /// Records the decision implied by the snapshot the user chose
    ///
    /// A chosen mtime equal to the local one (at one-second precision, as
    /// shown to the user) keeps the local file; anything else keeps the
    /// remote file.
    pub fn decide(&mut self, chosen: &ItemSnapshot) -> Decision {
        let decision = if chosen.mod_time.floor_to_second() == self.local.mod_time.floor_to_second() {
            Decision::KeepLocal
        } else {
            Decision::KeepRemote
        };
        self.resolution = Some(decision);
        decision
    }

    /// Returns true once a decision has been recorded
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(mtime: i64) -> ItemSnapshot {
        ItemSnapshot::new(
            ItemKey::new("ABCD2345".to_string()).unwrap(),
            3,
            ModTime::from_millis(mtime),
        )
    }

    fn case() -> ConflictCase {
        ConflictCase::new(
            LibraryId::new(1),
            AttachmentId::new(7),
            snapshot(1_000_000),
            snapshot(2_000_000),
        )
    }

    #[test]
    fn test_decide_local() {
        let mut c = case();
        assert!(!c.is_resolved());
        let chosen = c.local.clone();
        assert_eq!(c.decide(&chosen), Decision::KeepLocal);
        assert_eq!(c.resolution, Some(Decision::KeepLocal));
        assert_eq!(Decision::KeepLocal.target_state(), SyncState::ForceUpload);
    }

    #[test]
    fn test_decide_remote() {
        let mut c = case();
        let chosen = c.remote.clone();
        assert_eq!(c.decide(&chosen), Decision::KeepRemote);
        assert_eq!(Decision::KeepRemote.target_state(), SyncState::ForceDownload);
    }

    #[test]
    fn test_decide_unrelated_mtime_keeps_remote() {
        let mut c = case();
        assert_eq!(c.decide(&snapshot(5)), Decision::KeepRemote);
    }

    #[test]
    fn test_decide_ignores_subsecond_difference() {
        let mut c = case();
        assert_eq!(c.decide(&snapshot(1_000_999)), Decision::KeepLocal);
    }

    #[test]
    fn test_date_modified() {
        let s = snapshot(1_700_000_000_000);
        assert_eq!(s.date_modified().timestamp(), 1_700_000_000);
    }
}
