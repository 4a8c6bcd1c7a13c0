use stowage_types::blob::{BlobHandle, BlobKind, BlobSet};
use stowage_types::error::{Result, StowageError};

use crate::repo::Repository;
use crate::snapshot::Tree;

/// The ability to fetch a tree blob's direct children.
///
/// The liveness walk is generic over this seam so it can run against a full
/// repository or a synthetic graph in tests.
pub trait TreeSource {
    fn tree_children(&self, handle: &BlobHandle) -> Result<Vec<BlobHandle>>;
}

impl TreeSource for Repository {
    fn tree_children(&self, handle: &BlobHandle) -> Result<Vec<BlobHandle>> {
        let wrap = |e: StowageError| StowageError::TreeUnreadable {
            handle: *handle,
            source: Box::new(e),
        };
        let data = self.read_blob(handle).map_err(wrap)?;
        let tree = Tree::decode(&data).map_err(wrap)?;
        Ok(tree.children)
    }
}

/// Accumulate every blob reachable from `root` into `used`.
///
/// `seen` terminates descent into subtrees already visited, whether from
/// this snapshot or an earlier one, so total work is bounded by the number of
/// distinct blobs, not the number of reference paths. A child that cannot
/// be fetched is fatal for the whole prune operation: liveness cannot be
/// trusted, so nothing may be deleted.
pub fn find_used_blobs(
    source: &dyn TreeSource,
    root: BlobHandle,
    used: &mut BlobSet,
    seen: &mut BlobSet,
) -> Result<()> {
    if seen.contains(&root) {
        return Ok(());
    }
    seen.insert(root);
    used.insert(root);

    if root.kind == BlobKind::Tree {
        for child in source.tree_children(&root)? {
            find_used_blobs(source, child, used, seen)?;
        }
    }

    Ok(())
}
