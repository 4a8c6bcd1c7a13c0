use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stowage_types::blob::BlobHandle;
use stowage_types::error::{Result, StowageError};
use stowage_types::pack_id::PackId;

use crate::repo::pack::{list_pack_ids, read_pack_manifest};
use crate::storage::StorageBackend;

const INDEX_KEY: &str = "index";

/// Where one blob lives: its pack and the byte range inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexLocation {
    pub pack_id: PackId,
    pub offset: u64,
    pub length: u32,
}

/// Repository-wide lookup table from blob handle to pack location.
///
/// Always replaced wholesale: the prune cycle rebuilds it from the
/// post-compaction pack set rather than patching entries in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlobIndex {
    entries: HashMap<BlobHandle, IndexLocation>,
}

impl BlobIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: &BlobHandle) -> Option<&IndexLocation> {
        self.entries.get(handle)
    }

    pub fn contains(&self, handle: &BlobHandle) -> bool {
        self.entries.contains_key(handle)
    }

    pub fn insert(&mut self, handle: BlobHandle, location: IndexLocation) {
        self.entries.insert(handle, location);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BlobHandle, &IndexLocation)> {
        self.entries.iter()
    }

    /// Load the persisted index. A missing index object is a fatal
    /// environment error: the repository cannot be used without it.
    pub fn load(storage: &dyn StorageBackend) -> Result<Self> {
        let data = storage
            .get(INDEX_KEY)?
            .ok_or_else(|| StowageError::InvalidFormat("repository index missing".into()))?;
        Ok(rmp_serde::from_slice(&data)?)
    }

    /// Persist the index, replacing any prior one.
    pub fn save(&self, storage: &dyn StorageBackend) -> Result<()> {
        storage.put(INDEX_KEY, &rmp_serde::to_vec(self)?)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RebuildStats {
    pub packs_indexed: u64,
    pub packs_unreadable: u64,
    pub blobs_indexed: u64,
}

/// Regenerate the blob index from the current pack set.
///
/// Must run only after compaction has settled the pack set; indexing earlier
/// would record packs that are about to be deleted. Unreadable packs are
/// skipped with a warning, matching the scanner's per-pack fault tolerance.
pub fn rebuild_index(storage: &dyn StorageBackend) -> Result<(BlobIndex, RebuildStats)> {
    let mut index = BlobIndex::new();
    let mut stats = RebuildStats::default();

    for pack_id in list_pack_ids(storage)? {
        let entries = match read_pack_manifest(storage, &pack_id) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(pack = %pack_id, error = %e, "unable to read pack while rebuilding index");
                stats.packs_unreadable += 1;
                continue;
            }
        };
        for entry in entries {
            index.insert(
                entry.handle,
                IndexLocation {
                    pack_id,
                    offset: entry.offset,
                    length: entry.length,
                },
            );
            stats.blobs_indexed += 1;
        }
        stats.packs_indexed += 1;
    }

    debug!(
        packs = stats.packs_indexed,
        blobs = stats.blobs_indexed,
        "index rebuilt"
    );
    Ok((index, stats))
}
