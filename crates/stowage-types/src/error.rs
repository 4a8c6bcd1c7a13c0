use thiserror::Error;

use crate::blob::BlobHandle;
use crate::pack_id::PackId;

pub type Result<T> = std::result::Result<T, StowageError>;

#[derive(Debug, Error)]
pub enum StowageError {
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("repository already exists: {0}")]
    RepoAlreadyExists(String),

    #[error("invalid repository format: {0}")]
    InvalidFormat(String),

    #[error("unsupported repository version: {0}")]
    UnsupportedVersion(u32),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository is locked by another process (lock: {0})")]
    Locked(String),

    #[error("pack not found: {0}")]
    PackNotFound(PackId),

    #[error("blob {0} is not present in the repository index")]
    BlobNotInIndex(BlobHandle),

    #[error("cannot load tree {handle}: {source}")]
    TreeUnreadable {
        handle: BlobHandle,
        #[source]
        source: Box<StowageError>,
    },

    #[error("used blob {0} is missing from every readable pack")]
    UsedBlobMissing(BlobHandle),

    #[error("operation interrupted")]
    Interrupted,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}
