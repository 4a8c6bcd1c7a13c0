use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stowage_types::error::{Result, StowageError};

use crate::storage::StorageBackend;

/// A simple advisory lock stored in `locks/<ts>-<uuid>.json`.
#[derive(Debug, Serialize, Deserialize)]
struct LockEntry {
    hostname: String,
    pid: u32,
    time: String,
}

const LOCKS_PREFIX: &str = "locks/";
const DEFAULT_STALE_LOCK_SECS: i64 = 6 * 60 * 60; // 6 hours

/// Handle to an acquired lock.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Acquire an exclusive advisory lock on the repository.
///
/// The lock winner is determined deterministically: every contender writes
/// its own lock object, then the oldest key wins. Losers clean up their own
/// object and fail with `Locked`.
pub fn acquire_lock(storage: &dyn StorageBackend) -> Result<LockGuard> {
    cleanup_stale_locks(storage, Duration::seconds(DEFAULT_STALE_LOCK_SECS))?;

    let now = Utc::now();
    let entry = LockEntry {
        hostname: crate::platform::hostname(),
        pid: std::process::id(),
        time: now.to_rfc3339(),
    };

    let uuid = format!("{:032x}", rand::random::<u128>());
    // Timestamp prefix keeps older lock keys sorted first.
    let ts = now.timestamp_micros();
    let key = format!("{LOCKS_PREFIX}{ts:020}-{uuid}.json");
    let data = serde_json::to_vec(&entry)
        .map_err(|e| StowageError::Other(format!("lock serialize: {e}")))?;

    storage.put(&key, &data)?;

    let mut keys = storage.list(LOCKS_PREFIX)?;
    keys.sort();
    if keys.first() != Some(&key) {
        // Best-effort cleanup of the lock we just wrote.
        let _ = storage.delete(&key);
        let holder = keys
            .first()
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        return Err(StowageError::Locked(holder));
    }

    debug!(key = %key, "acquired repository lock");
    Ok(LockGuard { key })
}

/// Release an advisory lock.
pub fn release_lock(storage: &dyn StorageBackend, guard: LockGuard) -> Result<()> {
    storage.delete(&guard.key)
}

/// Forcibly remove all advisory locks from the repository.
///
/// Recovery mechanism for stale locks left by killed processes.
/// Returns the number of locks removed.
pub fn break_lock(storage: &dyn StorageBackend) -> Result<usize> {
    let keys = storage.list(LOCKS_PREFIX)?;
    let mut removed = 0usize;
    for key in keys {
        storage.delete(&key)?;
        removed += 1;
    }
    Ok(removed)
}

/// Delete lock objects older than `max_age`, plus unparseable ones.
fn cleanup_stale_locks(storage: &dyn StorageBackend, max_age: Duration) -> Result<()> {
    let cutoff = Utc::now() - max_age;
    for key in storage.list(LOCKS_PREFIX)? {
        let stale = match storage.get(&key)? {
            Some(data) => match serde_json::from_slice::<LockEntry>(&data) {
                Ok(entry) => match entry.time.parse::<DateTime<Utc>>() {
                    Ok(t) => t < cutoff,
                    Err(_) => true,
                },
                Err(_) => true,
            },
            // Raced with a release.
            None => continue,
        };
        if stale {
            warn!(key = %key, "removing stale repository lock");
            storage.delete(&key)?;
        }
    }
    Ok(())
}
