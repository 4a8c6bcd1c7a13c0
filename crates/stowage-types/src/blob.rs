use std::collections::HashSet;
use std::fmt;

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use serde::{Deserialize, Serialize};

/// A 32-byte blob identifier computed as unkeyed BLAKE2b-256 of the blob
/// contents.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId(pub [u8; 32]);

impl BlobId {
    /// Compute a blob ID as BLAKE2b-256 of the given bytes.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Blake2bVar::new(32).expect("valid output size");
        hasher.update(data);
        let mut out = [0u8; 32];
        hasher.finalize_variable(&mut out).expect("correct length");
        BlobId(out)
    }

    /// Hex-encode the full blob ID.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Distinguishes file-content blobs from tree-metadata blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlobKind {
    Data,
    Tree,
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobKind::Data => write!(f, "data"),
            BlobKind::Tree => write!(f, "tree"),
        }
    }
}

/// Identity of a stored blob: content hash plus kind. Two handles are equal
/// iff both fields match.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobHandle {
    pub id: BlobId,
    pub kind: BlobKind,
}

impl BlobHandle {
    pub fn new(id: BlobId, kind: BlobKind) -> Self {
        Self { id, kind }
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobHandle({}, {})", self.id, self.kind)
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.kind)
    }
}

/// Unordered set of blob handles.
pub type BlobSet = HashSet<BlobHandle>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_deterministic() {
        let id1 = BlobId::compute(b"hello world");
        let id2 = BlobId::compute(b"hello world");
        assert_eq!(id1, id2);
    }

    #[test]
    fn compute_different_data_different_id() {
        assert_ne!(BlobId::compute(b"hello"), BlobId::compute(b"world"));
    }

    #[test]
    fn to_hex_length() {
        assert_eq!(BlobId::compute(b"test").to_hex().len(), 64);
    }

    #[test]
    fn handle_equality_requires_matching_kind() {
        let id = BlobId::compute(b"same content");
        let data = BlobHandle::new(id, BlobKind::Data);
        let tree = BlobHandle::new(id, BlobKind::Tree);
        assert_ne!(data, tree);
        assert_eq!(data, BlobHandle::new(id, BlobKind::Data));
    }

    #[test]
    fn handle_set_membership_is_by_value() {
        let mut set = BlobSet::new();
        let h = BlobHandle::new(BlobId::compute(b"abc"), BlobKind::Data);
        set.insert(h);
        // A freshly computed equal handle is the same member.
        assert!(set.contains(&BlobHandle::new(BlobId::compute(b"abc"), BlobKind::Data)));
        assert!(!set.contains(&BlobHandle::new(BlobId::compute(b"abc"), BlobKind::Tree)));
        set.insert(h);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn serde_roundtrip() {
        let h = BlobHandle::new(BlobId::compute(b"roundtrip"), BlobKind::Tree);
        let bytes = rmp_serde::to_vec(&h).unwrap();
        let back: BlobHandle = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(h, back);
    }
}
