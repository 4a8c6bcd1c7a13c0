pub mod local_backend;

pub use local_backend::LocalBackend;

use stowage_types::error::Result;

/// Object storage abstraction the repository is built on.
///
/// Keys are `/`-separated paths. Implementations must be safe to share
/// across threads: the pack scanner reads through a `&dyn StorageBackend`
/// from several workers at once.
pub trait StorageBackend: Send + Sync {
    /// Read a whole object. `Ok(None)` if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a whole object, replacing any previous content.
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Delete an object. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// List the object keys directly under `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Read `length` bytes starting at `offset`. `Ok(None)` if the key does
    /// not exist; a short read is an error.
    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>>;

    /// Create a directory marker where the backend has such a notion.
    fn create_dir(&self, key: &str) -> Result<()>;
}
