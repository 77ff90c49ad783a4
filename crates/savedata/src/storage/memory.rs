//! In-memory StorageBackend implementation for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{StorageBackend, StorageResult};
use crate::error::StorageError;
use crate::key::TypeKey;

#[derive(Default)]
struct Inner {
    blobs: RwLock<HashMap<TypeKey, Vec<u8>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

/// In-memory implementation of StorageBackend.
///
/// Clones share the same contents, so a test can hand one clone to the
/// manager and inspect the other. Read and write counts are kept for
/// assertions about I/O volume.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    inner: Arc<Inner>,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw bytes for a key without counting a write.
    pub fn insert(&self, key: TypeKey, bytes: impl Into<Vec<u8>>) -> StorageResult<()> {
        let mut blobs = self
            .inner
            .blobs
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        blobs.insert(key, bytes.into());
        Ok(())
    }

    /// Current bytes for a key, if any.
    pub fn get(&self, key: &TypeKey) -> Option<Vec<u8>> {
        self.inner
            .blobs
            .read()
            .ok()
            .and_then(|blobs| blobs.get(key).cloned())
    }

    /// Number of `read_raw` calls served.
    pub fn read_count(&self) -> u64 {
        self.inner.reads.load(Ordering::Relaxed)
    }

    /// Number of `write_raw` calls served.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    fn exists(&self, key: &TypeKey) -> bool {
        self.inner
            .blobs
            .read()
            .map(|blobs| blobs.contains_key(key))
            .unwrap_or(false)
    }

    async fn read_raw(&self, key: &TypeKey) -> StorageResult<Vec<u8>> {
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        let blobs = self
            .inner
            .blobs
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { key: key.clone() })
    }

    async fn write_raw(&self, key: &TypeKey, bytes: Vec<u8>) -> StorageResult<()> {
        self.inner.writes.fetch_add(1, Ordering::Relaxed);
        let mut blobs = self
            .inner
            .blobs
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        blobs.insert(key.clone(), bytes);
        Ok(())
    }

    async fn delete_raw(&self, key: &TypeKey) -> StorageResult<()> {
        let mut blobs = self
            .inner
            .blobs
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        blobs.remove(key);
        Ok(())
    }

    async fn delete_all(&self) -> StorageResult<usize> {
        let mut blobs = self
            .inner
            .blobs
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let deleted = blobs.len();
        blobs.clear();
        Ok(deleted)
    }

    async fn list_keys(&self) -> StorageResult<Vec<TypeKey>> {
        let blobs = self
            .inner
            .blobs
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut keys: Vec<TypeKey> = blobs.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_contents_and_counters() {
        let storage = InMemoryStorage::new();
        let other = storage.clone();
        let key = TypeKey::new("Goods").unwrap();

        storage.write_raw(&key, b"abc".to_vec()).await.unwrap();
        assert!(other.exists(&key));
        assert_eq!(other.read_raw(&key).await.unwrap(), b"abc".to_vec());
        assert_eq!(storage.write_count(), 1);
        assert_eq!(storage.read_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_and_delete() {
        let storage = InMemoryStorage::new();
        let key = TypeKey::new("Goods").unwrap();

        assert!(storage.read_raw(&key).await.unwrap_err().is_not_found());
        storage.delete_raw(&key).await.unwrap();

        storage.insert(key.clone(), "x").unwrap();
        storage.insert(TypeKey::new("Other").unwrap(), "y").unwrap();
        assert_eq!(storage.write_count(), 0);
        assert_eq!(storage.list_keys().await.unwrap().len(), 2);
        assert_eq!(storage.delete_all().await.unwrap(), 2);
        assert!(!storage.exists(&key));
    }
}
