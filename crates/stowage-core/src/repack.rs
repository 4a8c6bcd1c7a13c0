use tracing::{debug, info};

use stowage_types::blob::BlobSet;
use stowage_types::error::{Result, StowageError};

use crate::plan::RewriteSet;
use crate::repo::pack::PackWriter;
use crate::scan::Inventory;
use crate::storage::StorageBackend;

/// Statistics for one compaction pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct RepackStats {
    pub packs_rewritten: u64,
    pub packs_deleted: u64,
    pub new_packs: u64,
    pub blobs_copied: u64,
    pub bytes_copied: u64,
    /// Garbage and redundant copies left behind in the superseded packs.
    pub blobs_dropped: u64,
}

/// Rewrite the selected packs so that only live, de-duplicated blobs remain.
///
/// Every live blob in a rewrite pack is copied into a fresh output pack
/// exactly once (a blob duplicated across several rewrite packs lands once).
/// Packs outside the rewrite set are not touched.
///
/// Ordering is the safety property here: all replacement packs are written
/// and durable before any superseded pack is deleted. An interruption or
/// error before the delete phase leaves the repository with extra data but
/// nothing lost.
pub fn repack(
    storage: &dyn StorageBackend,
    inventory: &Inventory,
    rewrite: &RewriteSet,
    used: &BlobSet,
    pack_target: usize,
) -> Result<RepackStats> {
    let mut stats = RepackStats::default();
    let mut writer = PackWriter::new(pack_target);
    let mut copied = BlobSet::new();

    for pack_id in rewrite {
        let entries = inventory.manifest(pack_id).ok_or_else(|| {
            StowageError::Other(format!("rewrite pack {pack_id} missing from inventory"))
        })?;

        for entry in entries {
            if !used.contains(&entry.handle) || copied.contains(&entry.handle) {
                stats.blobs_dropped += 1;
                continue;
            }

            let data = storage
                .get_range(&pack_id.storage_key(), entry.offset, entry.length as u64)?
                .ok_or(StowageError::PackNotFound(*pack_id))?;

            writer.add_blob(entry.handle, &data);
            copied.insert(entry.handle);
            stats.blobs_copied += 1;
            stats.bytes_copied += data.len() as u64;

            if writer.should_flush() {
                let (new_pack, _) = writer.flush(storage)?;
                debug!(pack = %new_pack, "wrote replacement pack");
                stats.new_packs += 1;
            }
        }
        stats.packs_rewritten += 1;
    }

    if writer.has_pending() {
        let (new_pack, _) = writer.flush(storage)?;
        debug!(pack = %new_pack, "wrote replacement pack");
        stats.new_packs += 1;
    }

    // All replacement data is durable; only now do the superseded packs go.
    for pack_id in rewrite {
        storage.delete(&pack_id.storage_key())?;
        debug!(pack = %pack_id, "deleted superseded pack");
        stats.packs_deleted += 1;
    }

    info!(
        rewritten = stats.packs_rewritten,
        new_packs = stats.new_packs,
        blobs = stats.blobs_copied,
        "compaction complete"
    );
    Ok(stats)
}
