use std::sync::atomic::AtomicBool;

use tracing::{debug, info};

use stowage_types::blob::BlobSet;
use stowage_types::error::Result;

use super::util::{check_interrupted, with_repo_lock};
use crate::config::{default_scan_workers, PruneOptions};
use crate::index::rebuild_index;
use crate::liveness::find_used_blobs;
use crate::plan::plan_rewrites;
use crate::repack::repack;
use crate::repo::Repository;
use crate::scan::scan_packs;
use crate::storage::StorageBackend;

/// Statistics returned by the prune command.
#[derive(Debug, Default, Clone, Copy)]
pub struct PruneStats {
    pub snapshots: u64,
    pub packs_scanned: u64,
    pub packs_unreadable: u64,
    pub blobs_scanned: u64,
    pub duplicate_blobs: u64,
    pub duplicate_bytes: u64,
    pub blobs_used: u64,
    pub packs_rewritten: u64,
    pub packs_deleted: u64,
    pub new_packs: u64,
    pub blobs_copied: u64,
    pub bytes_copied: u64,
}

/// Open the repository on the given backend and run a full prune/repack
/// cycle under the advisory lock.
pub fn run(storage: Box<dyn StorageBackend>, options: &PruneOptions) -> Result<PruneStats> {
    let mut repo = Repository::open(storage)?;
    with_repo_lock(&mut repo, |repo| prune_repo(repo, options, None))
}

/// Core prune logic operating on an already-opened, already-locked
/// repository: scan, analyze liveness, plan, compact, reindex.
pub fn prune_repo(
    repo: &mut Repository,
    options: &PruneOptions,
    shutdown: Option<&AtomicBool>,
) -> Result<PruneStats> {
    info!("listing packs in repository");
    let pack_ids = repo.list_pack_ids()?;

    let workers = if options.workers == 0 {
        default_scan_workers()
    } else {
        options.workers
    };
    info!(packs = pack_ids.len(), workers, "scanning pack manifests");
    let (inventory, scan_stats) =
        scan_packs(repo.storage.as_ref(), &pack_ids, workers, shutdown)?;

    for (handle, count) in inventory.duplicates() {
        debug!(blob = %handle, copies = count, "blob stored more than once");
    }

    check_interrupted(shutdown)?;

    let snapshots = repo.load_all_snapshots()?;
    info!(
        snapshots = snapshots.len(),
        "finding data still in use"
    );

    let mut used = BlobSet::new();
    let mut seen = BlobSet::new();
    for snapshot in &snapshots {
        debug!(snapshot = %snapshot.name, "walking snapshot tree");
        find_used_blobs(&*repo, snapshot.root, &mut used, &mut seen)?;
    }
    info!(
        used = used.len(),
        scanned = scan_stats.blobs_seen,
        "blob liveness computed"
    );

    check_interrupted(shutdown)?;

    let rewrite = plan_rewrites(&inventory, &used)?;
    info!(packs = rewrite.len(), "packs selected for rewrite");

    let mut stats = PruneStats {
        snapshots: snapshots.len() as u64,
        packs_scanned: scan_stats.packs_scanned,
        packs_unreadable: scan_stats.packs_unreadable,
        blobs_scanned: scan_stats.blobs_seen,
        duplicate_blobs: scan_stats.duplicate_blobs,
        duplicate_bytes: scan_stats.duplicate_bytes,
        blobs_used: used.len() as u64,
        packs_rewritten: rewrite.len() as u64,
        ..Default::default()
    };

    if options.dry_run {
        info!(packs = rewrite.len(), "dry run: would rewrite packs");
        return Ok(stats);
    }

    let repack_stats = repack(
        repo.storage.as_ref(),
        &inventory,
        &rewrite,
        &used,
        repo.config.pack_target_size as usize,
    )?;
    stats.packs_deleted = repack_stats.packs_deleted;
    stats.new_packs = repack_stats.new_packs;
    stats.blobs_copied = repack_stats.blobs_copied;
    stats.bytes_copied = repack_stats.bytes_copied;

    // The pack set is final; regenerate the lookup index from it.
    let (index, _rebuild_stats) = rebuild_index(repo.storage.as_ref())?;
    repo.replace_index(index)?;

    Ok(stats)
}
