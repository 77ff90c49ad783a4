//! Storage backends for raw record bytes.
//!
//! A backend maps a [`TypeKey`] to one stored blob (one file per key for
//! [`FileStorage`]) and knows nothing about record types or codecs.

mod file;
mod memory;

use async_trait::async_trait;

pub use file::FileStorage;
pub use memory::InMemoryStorage;

use crate::error::StorageError;
use crate::key::TypeKey;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Asynchronous raw byte storage keyed by type key.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Check whether bytes are stored for `key`.
    ///
    /// Synchronous: the manager calls it while holding its cache lock to
    /// decide whether a load needs a read at all, so implementations should
    /// answer from a cheap local check.
    fn exists(&self, key: &TypeKey) -> bool;

    /// Read the stored bytes.
    ///
    /// Fails with [`StorageError::NotFound`] if nothing is stored for `key`.
    async fn read_raw(&self, key: &TypeKey) -> StorageResult<Vec<u8>>;

    /// Store `bytes` for `key`, replacing anything stored before.
    async fn write_raw(&self, key: &TypeKey, bytes: Vec<u8>) -> StorageResult<()>;

    /// Delete the bytes stored for `key`. No-op if absent.
    async fn delete_raw(&self, key: &TypeKey) -> StorageResult<()>;

    /// Delete everything under this backend. Returns how many entries were removed.
    async fn delete_all(&self) -> StorageResult<usize>;

    /// List the keys that currently have stored bytes, sorted.
    async fn list_keys(&self) -> StorageResult<Vec<TypeKey>>;
}
