//! Attachments opened or edited outside the application
//!
//! Entries are kept for the lifetime of the process and fed into the next
//! scan so that recently touched files are checked even when their synced
//! mtime is old.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::newtypes::AttachmentId;

/// A single upload-check entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadCheckEntry {
    pub attachment_id: AttachmentId,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, caller-owned list of attachments to re-check on the next scan
///
/// When full, the oldest entry is evicted.
#[derive(Debug, Clone)]
pub struct UploadCheckCache {
    entries: VecDeque<UploadCheckEntry>,
    capacity: usize,
}

impl UploadCheckCache {
    /// Default number of entries kept
    pub const DEFAULT_CAPACITY: usize = 1_000;

    /// Creates an empty cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    /// Records that an attachment was opened or modified now
    pub fn record(&mut self, attachment_id: AttachmentId) {
        self.record_at(attachment_id, Utc::now());
    }

    /// Records an entry with an explicit timestamp
    pub fn record_at(&mut self, attachment_id: AttachmentId, timestamp: DateTime<Utc>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(UploadCheckEntry {
            attachment_id,
            timestamp,
        });
    }

    /// Ids recorded at or after `since`, without duplicates, oldest first
    pub fn ids_since(&self, since: DateTime<Utc>) -> Vec<AttachmentId> {
        let mut ids: Vec<AttachmentId> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.timestamp >= since) {
            if !ids.contains(&entry.attachment_id) {
                ids.push(entry.attachment_id);
            }
        }
        ids
    }

    /// Drops every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for UploadCheckCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_ids_since_filters_and_dedups() {
        let now = Utc::now();
        let mut cache = UploadCheckCache::default();
        cache.record_at(AttachmentId::new(1), now - Duration::hours(5));
        cache.record_at(AttachmentId::new(2), now - Duration::minutes(5));
        cache.record_at(AttachmentId::new(2), now);
        cache.record_at(AttachmentId::new(3), now);

        let ids = cache.ids_since(now - Duration::hours(1));
        assert_eq!(ids, vec![AttachmentId::new(2), AttachmentId::new(3)]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut cache = UploadCheckCache::new(2);
        cache.record(AttachmentId::new(1));
        cache.record(AttachmentId::new(2));
        cache.record(AttachmentId::new(3));
        assert_eq!(cache.len(), 2);

        let ids = cache.ids_since(Utc::now() - Duration::minutes(1));
        assert_eq!(ids, vec![AttachmentId::new(2), AttachmentId::new(3)]);
    }

    #[test]
    fn test_clear() {
        let mut cache = UploadCheckCache::default();
        cache.record(AttachmentId::new(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
