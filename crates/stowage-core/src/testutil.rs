use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::Utc;

use stowage_types::blob::{BlobHandle, BlobId, BlobKind};
use stowage_types::error::{Result, StowageError};
use stowage_types::pack_id::PackId;

use crate::index::IndexLocation;
use crate::repo::pack::{ManifestEntry, PackWriter};
use crate::repo::Repository;
use crate::snapshot::{save_snapshot, SnapshotMeta, Tree};
use crate::storage::StorageBackend;

/// In-memory storage backend for testing. Thread-safe via Mutex.
pub struct MemoryBackend {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let map = self.data.lock().unwrap();
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut map = self.data.lock().unwrap();
        map.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut map = self.data.lock().unwrap();
        map.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let map = self.data.lock().unwrap();
        Ok(map.contains_key(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let map = self.data.lock().unwrap();
        let keys: Vec<String> = map
            .keys()
            .filter(|k| k.starts_with(prefix) && !k.ends_with('/'))
            .cloned()
            .collect();
        Ok(keys)
    }

    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        let map = self.data.lock().unwrap();
        match map.get(key) {
            Some(data) => {
                let start = offset as usize;
                let end = start.checked_add(length as usize).ok_or_else(|| {
                    StowageError::Other(format!(
                        "short read on {key} at offset {offset}: offset + length overflows usize"
                    ))
                })?;
                if start >= data.len() || end > data.len() {
                    return Err(StowageError::Other(format!(
                        "short read on {key} at offset {offset}: expected {length} bytes, got {}",
                        data.len().saturating_sub(start)
                    )));
                }
                Ok(Some(data[start..end].to_vec()))
            }
            None => Ok(None),
        }
    }

    fn create_dir(&self, _key: &str) -> Result<()> {
        // No-op for in-memory backend
        Ok(())
    }
}

/// Backend wrapper that fails `put` for keys under a prefix once armed.
/// Used to prove nothing is deleted when replacement writes fail.
pub struct FailingPutBackend {
    inner: MemoryBackend,
    fail_puts_under: String,
    armed: AtomicBool,
}

impl FailingPutBackend {
    pub fn new(fail_puts_under: &str) -> Self {
        Self {
            inner: MemoryBackend::new(),
            fail_puts_under: fail_puts_under.to_string(),
            armed: AtomicBool::new(false),
        }
    }

    /// Start failing matching puts.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl StorageBackend for FailingPutBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }
    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        if self.armed.load(Ordering::SeqCst) && key.starts_with(&self.fail_puts_under) {
            return Err(StowageError::Other(format!("injected put failure: {key}")));
        }
        self.inner.put(key, data)
    }
    fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key)
    }
    fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key)
    }
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix)
    }
    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        self.inner.get_range(key, offset, length)
    }
    fn create_dir(&self, key: &str) -> Result<()> {
        self.inner.create_dir(key)
    }
}

/// Fresh empty repository on a MemoryBackend.
pub fn test_repo() -> Repository {
    Repository::init(Box::new(MemoryBackend::new())).expect("failed to init test repo")
}

/// A data blob with its handle.
pub fn data_blob(content: &[u8]) -> (BlobHandle, Vec<u8>) {
    (
        BlobHandle::new(BlobId::compute(content), BlobKind::Data),
        content.to_vec(),
    )
}

/// An encoded tree blob with its handle.
pub fn tree_blob(children: &[BlobHandle]) -> (BlobHandle, Vec<u8>) {
    let bytes = Tree {
        children: children.to_vec(),
    }
    .encode()
    .expect("encode tree");
    (
        BlobHandle::new(BlobId::compute(&bytes), BlobKind::Tree),
        bytes,
    )
}

/// Write one pack holding the given blobs directly to storage.
pub fn store_pack(
    storage: &dyn StorageBackend,
    blobs: &[(BlobHandle, Vec<u8>)],
) -> (PackId, Vec<ManifestEntry>) {
    let mut writer = PackWriter::new(usize::MAX);
    for (handle, data) in blobs {
        writer.add_blob(*handle, data);
    }
    writer.flush(storage).expect("flush test pack")
}

/// Write one pack into the repository and register its blobs in the index.
pub fn write_pack(repo: &mut Repository, blobs: &[(BlobHandle, Vec<u8>)]) -> PackId {
    let (pack_id, entries) = store_pack(repo.storage.as_ref(), blobs);
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
    repo.index.save(repo.storage.as_ref()).expect("save index");
    pack_id
}

/// Record a snapshot pointing at the given root tree.
pub fn add_snapshot(repo: &Repository, name: &str, root: BlobHandle) -> String {
    save_snapshot(
        repo.storage.as_ref(),
        &SnapshotMeta {
            name: name.to_string(),
            hostname: "testhost".to_string(),
            time: Utc::now(),
            root,
        },
    )
    .expect("save snapshot")
}
