use std::sync::atomic::{AtomicBool, Ordering};

use stowage_types::error::{Result, StowageError};

use crate::repo::{lock, Repository};

/// Execute a repository mutation while holding the advisory lock.
/// Ensures the lock release is always attempted even when the action fails.
pub fn with_repo_lock<T>(
    repo: &mut Repository,
    action: impl FnOnce(&mut Repository) -> Result<T>,
) -> Result<T> {
    let guard = lock::acquire_lock(repo.storage.as_ref())?;
    let result = action(repo);

    match lock::release_lock(repo.storage.as_ref(), guard) {
        Ok(()) => result,
        Err(release_err) => {
            if result.is_err() {
                tracing::warn!("failed to release repository lock: {release_err}");
                result
            } else {
                Err(release_err)
            }
        }
    }
}

/// Return `Err(Interrupted)` if the shutdown flag is set.
pub fn check_interrupted(shutdown: Option<&AtomicBool>) -> Result<()> {
    if shutdown.is_some_and(|f| f.load(Ordering::Relaxed)) {
        return Err(StowageError::Interrupted);
    }
    Ok(())
}
