pub mod lock;
pub mod pack;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use stowage_types::blob::{BlobHandle, BlobId};
use stowage_types::error::{Result, StowageError};
use stowage_types::pack_id::PackId;

use crate::index::BlobIndex;
use crate::snapshot::{self, SnapshotMeta};
use crate::storage::StorageBackend;

/// Current repository format version.
pub const REPO_VERSION: u32 = 1;

const CONFIG_KEY: &str = "config";

fn default_pack_target_size() -> u32 {
    32 * 1024 * 1024
}

/// Persisted at the `config` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    pub version: u32,
    pub id: Vec<u8>, // 32 bytes
    pub created: DateTime<Utc>,
    #[serde(default = "default_pack_target_size")]
    pub pack_target_size: u32,
}

/// An opened repository: storage handle, persisted config, and the blob
/// lookup index.
///
/// The repository does not manage its own lock; mutating operations are
/// expected to run under `commands::util::with_repo_lock`.
pub struct Repository {
    pub storage: Box<dyn StorageBackend>,
    pub config: RepoConfig,
    pub index: BlobIndex,
}

impl Repository {
    /// Initialize an empty repository on the given backend.
    pub fn init(storage: Box<dyn StorageBackend>) -> Result<Self> {
        if storage.exists(CONFIG_KEY)? {
            return Err(StowageError::RepoAlreadyExists(CONFIG_KEY.into()));
        }

        let mut id = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut id);
        let config = RepoConfig {
            version: REPO_VERSION,
            id,
            created: Utc::now(),
            pack_target_size: default_pack_target_size(),
        };

        storage.create_dir("packs")?;
        storage.create_dir("snapshots")?;
        storage.create_dir("locks")?;
        storage.put(CONFIG_KEY, &rmp_serde::to_vec(&config)?)?;

        let index = BlobIndex::new();
        index.save(storage.as_ref())?;

        Ok(Self {
            storage,
            config,
            index,
        })
    }

    /// Open an existing repository and load its index.
    pub fn open(storage: Box<dyn StorageBackend>) -> Result<Self> {
        let config_data = storage
            .get(CONFIG_KEY)?
            .ok_or_else(|| StowageError::RepoNotFound("config object missing".into()))?;
        let config: RepoConfig = rmp_serde::from_slice(&config_data)?;
        if config.version != REPO_VERSION {
            return Err(StowageError::UnsupportedVersion(config.version));
        }

        let index = BlobIndex::load(storage.as_ref())?;

        Ok(Self {
            storage,
            config,
            index,
        })
    }

    /// List every pack ID currently in the data namespace.
    pub fn list_pack_ids(&self) -> Result<Vec<PackId>> {
        pack::list_pack_ids(self.storage.as_ref())
    }

    /// Read a blob's bytes via the index, verifying content identity.
    pub fn read_blob(&self, handle: &BlobHandle) -> Result<Vec<u8>> {
        let loc = self
            .index
            .get(handle)
            .ok_or(StowageError::BlobNotInIndex(*handle))?;
        let data = self
            .storage
            .get_range(&loc.pack_id.storage_key(), loc.offset, loc.length as u64)?
            .ok_or(StowageError::PackNotFound(loc.pack_id))?;
        if BlobId::compute(&data) != handle.id {
            return Err(StowageError::InvalidFormat(format!(
                "blob {handle} content does not match its id"
            )));
        }
        Ok(data)
    }

    /// Load every snapshot record in the repository.
    pub fn load_all_snapshots(&self) -> Result<Vec<SnapshotMeta>> {
        snapshot::load_all_snapshots(self.storage.as_ref())
    }

    /// Replace the in-memory index and persist it wholesale.
    pub fn replace_index(&mut self, index: BlobIndex) -> Result<()> {
        index.save(self.storage.as_ref())?;
        self.index = index;
        Ok(())
    }
}
