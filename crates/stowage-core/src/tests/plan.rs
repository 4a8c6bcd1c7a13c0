use crate::plan::plan_rewrites;
use crate::scan::scan_packs;
use crate::storage::StorageBackend;
use crate::testutil::{data_blob, store_pack, MemoryBackend};

use stowage_types::blob::BlobSet;
use stowage_types::error::StowageError;

#[test]
fn clean_repository_needs_no_rewrites() {
    let storage = MemoryBackend::new();
    let (a, a_data) = data_blob(b"live blob a");
    let (b, b_data) = data_blob(b"live blob b");
    let (pack_one, _) = store_pack(&storage, &[(a, a_data)]);
    let (pack_two, _) = store_pack(&storage, &[(b, b_data)]);

    let (inventory, _) = scan_packs(&storage, &[pack_one, pack_two], 2, None).unwrap();
    let used = BlobSet::from([a, b]);

    let rewrite = plan_rewrites(&inventory, &used).unwrap();
    assert!(rewrite.is_empty());
}

#[test]
fn pack_with_garbage_is_flagged() {
    let storage = MemoryBackend::new();
    let (live, live_data) = data_blob(b"still referenced");
    let (dead, dead_data) = data_blob(b"nobody wants this");
    let (clean, clean_data) = data_blob(b"clean pack contents");

    let (dirty_pack, _) = store_pack(&storage, &[(live, live_data), (dead, dead_data)]);
    let (clean_pack, _) = store_pack(&storage, &[(clean, clean_data)]);

    let (inventory, _) = scan_packs(&storage, &[dirty_pack, clean_pack], 2, None).unwrap();
    let used = BlobSet::from([live, clean]);

    let rewrite = plan_rewrites(&inventory, &used).unwrap();
    assert!(rewrite.contains(&dirty_pack));
    assert!(!rewrite.contains(&clean_pack));
    assert_eq!(rewrite.len(), 1);
}

#[test]
fn duplicated_live_blob_flags_every_home() {
    let storage = MemoryBackend::new();
    let (dup, dup_data) = data_blob(b"stored twice, both live");
    let (other, other_data) = data_blob(b"unrelated");

    let (pack_one, _) = store_pack(&storage, &[(dup, dup_data.clone())]);
    let (pack_two, _) = store_pack(&storage, &[(dup, dup_data), (other, other_data)]);

    let (inventory, _) = scan_packs(&storage, &[pack_one, pack_two], 2, None).unwrap();
    let used = BlobSet::from([dup, other]);

    let rewrite = plan_rewrites(&inventory, &used).unwrap();
    assert!(rewrite.contains(&pack_one));
    assert!(rewrite.contains(&pack_two));
}

#[test]
fn used_blob_missing_from_inventory_is_fatal() {
    let storage = MemoryBackend::new();
    let (stored, stored_data) = data_blob(b"present");
    let (phantom, _) = data_blob(b"never stored anywhere");
    let (pack, _) = store_pack(&storage, &[(stored, stored_data)]);

    let (inventory, _) = scan_packs(&storage, &[pack], 2, None).unwrap();
    let used = BlobSet::from([stored, phantom]);

    let err = plan_rewrites(&inventory, &used).unwrap_err();
    assert!(matches!(err, StowageError::UsedBlobMissing(h) if h == phantom));
}

#[test]
fn blob_hidden_by_unreadable_pack_is_fatal() {
    // A pack that fails to scan makes its blobs invisible; if a snapshot
    // still needs one of them, planning must refuse rather than repack.
    let storage = MemoryBackend::new();
    let (hidden, hidden_data) = data_blob(b"only home is the corrupt pack");
    let (fine, fine_data) = data_blob(b"unaffected");

    let (corrupt_pack, _) = store_pack(&storage, &[(hidden, hidden_data)]);
    let (good_pack, _) = store_pack(&storage, &[(fine, fine_data)]);
    storage
        .put(&corrupt_pack.storage_key(), &[0x11; 90])
        .unwrap();

    let (inventory, stats) = scan_packs(&storage, &[corrupt_pack, good_pack], 2, None).unwrap();
    assert_eq!(stats.packs_unreadable, 1);

    let used = BlobSet::from([hidden, fine]);
    assert!(matches!(
        plan_rewrites(&inventory, &used),
        Err(StowageError::UsedBlobMissing(h)) if h == hidden
    ));
}
