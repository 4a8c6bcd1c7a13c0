use crate::commands::util::with_repo_lock;
use crate::repo::lock::{acquire_lock, break_lock, release_lock};
use crate::testutil::{test_repo, MemoryBackend};

use stowage_types::error::StowageError;

#[test]
fn acquire_is_exclusive() {
    let storage = MemoryBackend::new();
    let guard = acquire_lock(&storage).unwrap();

    // Ensure the contender's lock key carries a strictly later timestamp.
    std::thread::sleep(std::time::Duration::from_millis(2));
    let err = acquire_lock(&storage).unwrap_err();
    assert!(matches!(err, StowageError::Locked(_)));

    release_lock(&storage, guard).unwrap();
    let guard = acquire_lock(&storage).unwrap();
    release_lock(&storage, guard).unwrap();
}

#[test]
fn loser_cleans_up_its_own_entry() {
    let storage = MemoryBackend::new();
    let guard = acquire_lock(&storage).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let _ = acquire_lock(&storage).unwrap_err();

    // Only the winner's lock object remains.
    let keys = storage_keys(&storage);
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0], guard.key());
    release_lock(&storage, guard).unwrap();
}

#[test]
fn break_lock_clears_stale_state() {
    let storage = MemoryBackend::new();
    let _abandoned = acquire_lock(&storage).unwrap();

    assert_eq!(break_lock(&storage).unwrap(), 1);
    let guard = acquire_lock(&storage).unwrap();
    release_lock(&storage, guard).unwrap();
}

#[test]
fn with_repo_lock_releases_on_error() {
    let mut repo = test_repo();

    let result: Result<(), _> = with_repo_lock(&mut repo, |_repo| {
        Err(StowageError::Other("action failed".into()))
    });
    assert!(result.is_err());

    // The lock must have been released despite the failure.
    let guard = acquire_lock(repo.storage.as_ref()).unwrap();
    release_lock(repo.storage.as_ref(), guard).unwrap();
}

#[test]
fn with_repo_lock_excludes_concurrent_callers() {
    let mut repo = test_repo();

    with_repo_lock(&mut repo, |repo| {
        // While the action runs, the repository is locked.
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(matches!(
            acquire_lock(repo.storage.as_ref()),
            Err(StowageError::Locked(_))
        ));
        Ok(())
    })
    .unwrap();

    // Afterwards the lock is free again.
    let guard = acquire_lock(repo.storage.as_ref()).unwrap();
    release_lock(repo.storage.as_ref(), guard).unwrap();
}

fn storage_keys(storage: &MemoryBackend) -> Vec<String> {
    use crate::storage::StorageBackend;
    storage.list("locks/").unwrap()
}
