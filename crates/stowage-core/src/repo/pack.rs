use serde::{Deserialize, Serialize};
use tracing::warn;

use stowage_types::blob::BlobHandle;
use stowage_types::error::{Result, StowageError};
use stowage_types::pack_id::PackId;

use crate::storage::StorageBackend;

/// Magic bytes at the start of every pack file.
pub const PACK_MAGIC: &[u8; 8] = b"STOWPACK";
/// Pack format version.
pub const PACK_VERSION: u8 = 1;
/// Size of the pack header (magic + version byte).
pub const PACK_HEADER_SIZE: usize = 9;

/// Maximum number of blobs in a single pack file.
/// Prevents pathological cases where many tiny blobs create a pack with a
/// huge manifest trailer.
pub const MAX_BLOBS_PER_PACK: usize = 10_000;

/// One entry in the pack's trailing manifest. Describes a single blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub handle: BlobHandle,
    /// Offset of the blob data within the pack (past the 4-byte length prefix).
    pub offset: u64,
    pub length: u32,
}

/// Accumulates blobs and flushes them as pack files.
///
/// Blob data is appended directly into a single contiguous buffer during
/// `add_blob`; `seal` only appends the manifest trailer, so no second
/// pack-sized allocation is needed.
pub struct PackWriter {
    target_size: usize,
    pack_bytes: Vec<u8>,
    entries: Vec<ManifestEntry>,
}

impl PackWriter {
    pub fn new(target_size: usize) -> Self {
        Self {
            target_size,
            pack_bytes: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Append a blob to the pack buffer. Returns the offset within the pack
    /// where the blob data starts (after the 4-byte length prefix).
    pub fn add_blob(&mut self, handle: BlobHandle, data: &[u8]) -> u64 {
        // On first blob: write pack header.
        if self.entries.is_empty() {
            self.pack_bytes.extend_from_slice(PACK_MAGIC);
            self.pack_bytes.push(PACK_VERSION);
        }

        let offset = self.pack_bytes.len() as u64 + 4;
        self.pack_bytes
            .extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.pack_bytes.extend_from_slice(data);

        self.entries.push(ManifestEntry {
            handle,
            offset,
            length: data.len() as u32,
        });

        offset
    }

    /// Whether the current buffer should be flushed.
    pub fn should_flush(&self) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        self.pack_bytes.len() >= self.target_size || self.entries.len() >= MAX_BLOBS_PER_PACK
    }

    /// Whether there are any buffered blobs.
    pub fn has_pending(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Assemble buffered blobs into a finished pack, compute its PackId, and
    /// clear internal state. Does NOT write to storage.
    pub fn seal(&mut self) -> Result<(PackId, Vec<u8>, Vec<ManifestEntry>)> {
        if self.entries.is_empty() {
            return Err(StowageError::Other("cannot seal empty pack writer".into()));
        }

        // Fallible work first; on error the buffer is untouched and the
        // caller can retry.
        let manifest_bytes = rmp_serde::to_vec(&self.entries)?;

        let mut pack_bytes = std::mem::take(&mut self.pack_bytes);
        pack_bytes.extend_from_slice(&manifest_bytes);
        pack_bytes.extend_from_slice(&(manifest_bytes.len() as u32).to_le_bytes());

        let pack_id = PackId::compute(&pack_bytes);
        let entries = std::mem::take(&mut self.entries);

        Ok((pack_id, pack_bytes, entries))
    }

    /// Seal the buffered blobs and upload the pack file.
    pub fn flush(&mut self, storage: &dyn StorageBackend) -> Result<(PackId, Vec<ManifestEntry>)> {
        let (pack_id, pack_bytes, entries) = self.seal()?;
        storage.put(&pack_id.storage_key(), &pack_bytes)?;
        Ok((pack_id, entries))
    }
}

/// Read and decode the trailing manifest from a pack file.
pub fn read_pack_manifest(
    storage: &dyn StorageBackend,
    pack_id: &PackId,
) -> Result<Vec<ManifestEntry>> {
    let pack_data = storage
        .get(&pack_id.storage_key())?
        .ok_or(StowageError::PackNotFound(*pack_id))?;

    if pack_data.len() < PACK_HEADER_SIZE + 4 {
        return Err(StowageError::InvalidFormat("pack too small".into()));
    }
    if &pack_data[..8] != PACK_MAGIC {
        return Err(StowageError::InvalidFormat("invalid pack magic".into()));
    }
    if pack_data[8] != PACK_VERSION {
        return Err(StowageError::UnsupportedVersion(pack_data[8] as u32));
    }

    // Manifest length lives in the last 4 bytes.
    let len_offset = pack_data.len() - 4;
    let manifest_len = u32::from_le_bytes(
        pack_data[len_offset..]
            .try_into()
            .map_err(|_| StowageError::InvalidFormat("invalid manifest length field".into()))?,
    ) as usize;

    if manifest_len + 4 > pack_data.len() - PACK_HEADER_SIZE {
        return Err(StowageError::InvalidFormat("invalid manifest length".into()));
    }

    let manifest_start = len_offset - manifest_len;
    let entries: Vec<ManifestEntry> =
        rmp_serde::from_slice(&pack_data[manifest_start..len_offset])?;

    // Every entry must point inside the blob region.
    for entry in &entries {
        let end = entry.offset + entry.length as u64;
        if entry.offset < (PACK_HEADER_SIZE + 4) as u64 || end > manifest_start as u64 {
            return Err(StowageError::InvalidFormat(format!(
                "manifest entry for {} points outside pack",
                entry.handle
            )));
        }
    }

    Ok(entries)
}

/// List every pack ID in the repository's data namespace.
///
/// Enumeration is a cheap, sequential listing over the 256 shard prefixes.
/// Keys that don't parse as pack IDs are skipped with a warning.
pub fn list_pack_ids(storage: &dyn StorageBackend) -> Result<Vec<PackId>> {
    let mut pack_ids = Vec::new();
    for shard in 0u16..256 {
        let prefix = format!("packs/{shard:02x}/");
        for key in storage.list(&prefix)? {
            if key.ends_with('/') {
                continue;
            }
            match PackId::from_storage_key(&key) {
                Ok(id) => pack_ids.push(id),
                Err(e) => warn!(key = %key, error = %e, "skipping invalid pack key"),
            }
        }
    }
    Ok(pack_ids)
}
