use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stowage_types::blob::{BlobHandle, BlobId};
use stowage_types::error::Result;

use crate::storage::StorageBackend;

pub const SNAPSHOTS_PREFIX: &str = "snapshots/";

/// Metadata for a single snapshot, stored at `snapshots/<id>`.
///
/// The id is the BLAKE2b-256 of the encoded record, so snapshot objects are
/// themselves content-addressed and immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub name: String,
    pub hostname: String,
    pub time: DateTime<Utc>,
    /// Root tree blob this snapshot's whole content hangs off.
    pub root: BlobHandle,
}

/// A tree blob's decoded form: the direct children of one tree node.
/// Children may be data blobs (leaves) or further trees.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tree {
    pub children: Vec<BlobHandle>,
}

impl Tree {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

/// Persist a snapshot record. Returns the hex id it was stored under.
pub fn save_snapshot(storage: &dyn StorageBackend, meta: &SnapshotMeta) -> Result<String> {
    let data = rmp_serde::to_vec(meta)?;
    let id = BlobId::compute(&data).to_hex();
    storage.put(&format!("{SNAPSHOTS_PREFIX}{id}"), &data)?;
    Ok(id)
}

/// Load every snapshot record.
///
/// A snapshot that exists but cannot be decoded is a fatal error: liveness
/// cannot be established without the full snapshot set.
pub fn load_all_snapshots(storage: &dyn StorageBackend) -> Result<Vec<SnapshotMeta>> {
    let mut snapshots = Vec::new();
    let mut keys = storage.list(SNAPSHOTS_PREFIX)?;
    keys.sort();
    for key in keys {
        // A concurrent delete between list and get is not possible under the
        // repository lock; a missing object here means the listing lied.
        let data = storage
            .get(&key)?
            .ok_or_else(|| stowage_types::error::StowageError::RepoNotFound(key.clone()))?;
        snapshots.push(rmp_serde::from_slice(&data)?);
    }
    Ok(snapshots)
}
