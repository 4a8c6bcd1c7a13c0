use std::collections::HashSet;

use tracing::debug;

use stowage_types::blob::BlobSet;
use stowage_types::error::{Result, StowageError};
use stowage_types::pack_id::PackId;

use crate::scan::Inventory;

/// Packs that must be read and rewritten.
pub type RewriteSet = HashSet<PackId>;

/// Decide which packs need rewriting.
///
/// A pack qualifies as soon as it holds one blob that is either garbage
/// (not in `used`) or a live blob stored in more than one pack; the rest of
/// that pack's entries are not inspected further.
///
/// A used blob absent from the inventory means the repository cannot
/// resolve a blob its snapshots reference: either it is already corrupt,
/// or the blob's only home failed to scan. Either way rewriting would lose
/// data, so this is an error rather than a tolerated state.
pub fn plan_rewrites(inventory: &Inventory, used: &BlobSet) -> Result<RewriteSet> {
    for handle in used {
        if !inventory.contains(handle) {
            return Err(StowageError::UsedBlobMissing(*handle));
        }
    }

    let mut rewrite = RewriteSet::new();
    for (pack_id, entries) in inventory.packs() {
        for entry in entries {
            let garbage = !used.contains(&entry.handle);
            let duplicated = inventory.occurrences(&entry.handle) > 1;
            if garbage || duplicated {
                debug!(
                    pack = %pack_id,
                    blob = %entry.handle,
                    garbage,
                    duplicated,
                    "pack selected for rewrite"
                );
                rewrite.insert(*pack_id);
                break;
            }
        }
    }

    Ok(rewrite)
}
