use std::fmt;

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StowageError};

/// A 32-byte pack file identifier computed as unkeyed BLAKE2b-256 of the
/// entire pack contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackId(pub [u8; 32]);

impl PackId {
    /// Compute a pack ID over the finished pack bytes.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Blake2bVar::new(32).expect("valid output size");
        hasher.update(data);
        let mut out = [0u8; 32];
        hasher.finalize_variable(&mut out).expect("correct length");
        PackId(out)
    }

    /// Hex-encode the full pack ID.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First byte as a two-char hex string, used for shard directory.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Storage key path: `packs/<shard>/<full_hex>`.
    pub fn storage_key(&self) -> String {
        format!("packs/{}/{}", self.shard_prefix(), self.to_hex())
    }

    /// Recover a pack ID from a storage key (the final path segment must be
    /// the 64-char hex form).
    pub fn from_storage_key(key: &str) -> Result<Self> {
        let hex_part = key.rsplit('/').next().unwrap_or(key);
        let bytes = hex::decode(hex_part)
            .map_err(|_| StowageError::InvalidFormat(format!("invalid pack key '{key}'")))?;
        let id: [u8; 32] = bytes.try_into().map_err(|_| {
            StowageError::InvalidFormat(format!("pack key '{key}' is not a 32-byte id"))
        })?;
        Ok(PackId(id))
    }
}

impl fmt::Debug for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_roundtrip() {
        let id = PackId::compute(b"some pack bytes");
        let key = id.storage_key();
        assert!(key.starts_with(&format!("packs/{}/", id.shard_prefix())));
        assert_eq!(PackId::from_storage_key(&key).unwrap(), id);
    }

    #[test]
    fn from_storage_key_rejects_garbage() {
        assert!(PackId::from_storage_key("packs/ab/not-hex").is_err());
        assert!(PackId::from_storage_key("packs/ab/abcd").is_err());
    }
}
