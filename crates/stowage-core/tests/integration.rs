//! End-to-end prune cycle against a real filesystem backend.

use chrono::Utc;
use tempfile::TempDir;

use stowage_core::commands::prune;
use stowage_core::config::PruneOptions;
use stowage_core::index::IndexLocation;
use stowage_core::repo::pack::{list_pack_ids, PackWriter};
use stowage_core::repo::Repository;
use stowage_core::snapshot::{save_snapshot, SnapshotMeta, Tree};
use stowage_core::storage::{LocalBackend, StorageBackend};

use stowage_types::blob::{BlobHandle, BlobId, BlobKind};

fn backend(dir: &TempDir) -> Box<dyn StorageBackend> {
    Box::new(LocalBackend::new(dir.path().to_str().unwrap()).unwrap())
}

fn handle_for(data: &[u8], kind: BlobKind) -> BlobHandle {
    BlobHandle::new(BlobId::compute(data), kind)
}

/// Write one pack and register its blobs in the repository index.
fn write_pack(repo: &mut Repository, blobs: &[(BlobHandle, Vec<u8>)]) {
    let mut writer = PackWriter::new(usize::MAX);
    for (handle, data) in blobs {
        writer.add_blob(*handle, data);
    }
    let (pack_id, entries) = writer.flush(repo.storage.as_ref()).unwrap();
    for entry in entries {
        repo.index.insert(
            entry.handle,
            IndexLocation {
                pack_id,
                offset: entry.offset,
                length: entry.length,
            },
        );
    }
    repo.index.save(repo.storage.as_ref()).unwrap();
}

#[test]
fn prune_cycle_on_local_repository() {
    let dir = TempDir::new().unwrap();

    let live_data = b"document the user still cares about".to_vec();
    let garbage_data = b"chunk from a long-deleted snapshot".to_vec();
    let live = handle_for(&live_data, BlobKind::Data);
    let garbage = handle_for(&garbage_data, BlobKind::Data);

    let tree_bytes = Tree {
        children: vec![live],
    }
    .encode()
    .unwrap();
    let root = handle_for(&tree_bytes, BlobKind::Tree);

    {
        let mut repo = Repository::init(backend(&dir)).unwrap();
        write_pack(&mut repo, &[(live, live_data.clone()), (garbage, garbage_data)]);
        write_pack(&mut repo, &[(root, tree_bytes)]);
        save_snapshot(
            repo.storage.as_ref(),
            &SnapshotMeta {
                name: "first".into(),
                hostname: "testhost".into(),
                time: Utc::now(),
                root,
            },
        )
        .unwrap();
    }

    // Full command path: open, lock, scan, analyze, plan, repack, reindex.
    let stats = prune::run(
        backend(&dir),
        &PruneOptions {
            workers: 2,
            dry_run: false,
        },
    )
    .unwrap();

    assert_eq!(stats.snapshots, 1);
    assert_eq!(stats.packs_scanned, 2);
    assert_eq!(stats.blobs_used, 2);
    assert_eq!(stats.packs_rewritten, 1);
    assert_eq!(stats.packs_deleted, 1);
    assert_eq!(stats.new_packs, 1);

    // Reopen: the rebuilt index resolves the live blob, the garbage is gone.
    let repo = Repository::open(backend(&dir)).unwrap();
    assert_eq!(repo.read_blob(&live).unwrap(), live_data);
    assert!(repo.read_blob(&garbage).is_err());
    assert_eq!(list_pack_ids(repo.storage.as_ref()).unwrap().len(), 2);

    // A second run finds nothing to do.
    let again = prune::run(
        backend(&dir),
        &PruneOptions {
            workers: 2,
            dry_run: false,
        },
    )
    .unwrap();
    assert_eq!(again.packs_rewritten, 0);
    assert_eq!(again.packs_deleted, 0);
}

#[test]
fn lock_is_released_after_run() {
    let dir = TempDir::new().unwrap();
    Repository::init(backend(&dir)).unwrap();

    prune::run(backend(&dir), &PruneOptions::default()).unwrap();

    // No lock objects left behind.
    let storage = backend(&dir);
    assert!(storage.list("locks/").unwrap().is_empty());
}
