//! Remote version cache port (driven/secondary port)
//!
//! The sync layer caches the last remote JSON snapshot of each object,
//! keyed by object type, library, key and version. The conflict resolver
//! reads it to show the remote side of a file conflict.

use crate::domain::{
    newtypes::{ItemKey, LibraryId},
    ItemSnapshot,
};

/// Object type under which item snapshots are cached
pub const ITEM_OBJECT_TYPE: &str = "item";

/// Port trait for the cached remote snapshots
#[async_trait::async_trait]
pub trait IVersionCache: Send + Sync {
    /// Looks up cached snapshots for `(key, version)` pairs
    ///
    /// Pairs without a cached snapshot are omitted from the result.
    async fn get_cached(
        &self,
        object_type: &str,
        library_id: LibraryId,
        keys: &[(ItemKey, u32)],
    ) -> anyhow::Result<Vec<ItemSnapshot>>;

    /// Stores a snapshot (insert or replace)
    async fn put(
        &self,
        object_type: &str,
        library_id: LibraryId,
        snapshot: &ItemSnapshot,
    ) -> anyhow::Result<()>;
}
