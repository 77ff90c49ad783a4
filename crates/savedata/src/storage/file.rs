//! File-based StorageBackend implementation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;

use super::{StorageBackend, StorageResult};
use crate::error::StorageError;
use crate::key::TypeKey;

/// File-based implementation of StorageBackend.
///
/// Stores each record as `<KEY>.<extension>` directly under `root`.
///
/// # Directory Structure
///
/// ```text
/// root/
/// ├── GoodsSaveData.json
/// ├── PlayerProfile.json
/// └── Settings.json
/// ```
///
/// With `atomic_writes` enabled (the default) a write goes to
/// `<KEY>.<extension>.tmp` first and is renamed over the target, so a crash
/// mid-write leaves the previous save intact instead of a truncated file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    extension: &'static str,
    atomic_writes: bool,
}

impl FileStorage {
    /// Create a file storage rooted at `root`.
    ///
    /// The directory is not created until the first write.
    pub fn new(root: impl AsRef<Path>, extension: &'static str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extension,
            atomic_writes: true,
        }
    }

    /// Enable or disable the temp-file-and-rename write strategy.
    pub fn with_atomic_writes(mut self, enabled: bool) -> Self {
        self.atomic_writes = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &'static str {
        self.extension
    }

    /// Get the path to a record file.
    pub fn path_for(&self, key: &TypeKey) -> PathBuf {
        self.root.join(key.file_name(self.extension))
    }

    fn temp_path_for(&self, key: &TypeKey) -> PathBuf {
        self.root
            .join(format!("{}.tmp", key.file_name(self.extension)))
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    /// Blocking `stat` of the record file. It runs on the calling thread,
    /// inside the manager's cache lock, and is not offloaded to the runtime.
    fn exists(&self, key: &TypeKey) -> bool {
        self.path_for(key).is_file()
    }

    async fn read_raw(&self, key: &TypeKey) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key);

        match fs::read(&path).await {
            Ok(bytes) => {
                tracing::debug!("Read {} bytes from {}", bytes.len(), path.display());
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound { key: key.clone() })
            }
            Err(e) => Err(StorageError::io(key, e)),
        }
    }

    async fn write_raw(&self, key: &TypeKey, bytes: Vec<u8>) -> StorageResult<()> {
        let path = self.path_for(key);

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::io(key, e))?;

        if self.atomic_writes {
            let temp_path = self.temp_path_for(key);

            // Write to temp file
            fs::write(&temp_path, &bytes)
                .await
                .map_err(|e| StorageError::io(key, e))?;

            // Atomic rename
            fs::rename(&temp_path, &path)
                .await
                .map_err(|e| StorageError::io(key, e))?;
        } else {
            fs::write(&path, &bytes)
                .await
                .map_err(|e| StorageError::io(key, e))?;
        }

        tracing::debug!("Wrote {} bytes to {}", bytes.len(), path.display());

        Ok(())
    }

    async fn delete_raw(&self, key: &TypeKey) -> StorageResult<()> {
        let path = self.path_for(key);

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(key, e)),
        }
    }

    async fn delete_all(&self) -> StorageResult<usize> {
        let root_err = |e| StorageError::Root(Arc::new(e));

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(root_err(e)),
        };

        let mut deleted = 0;
        while let Some(entry) = entries.next_entry().await.map_err(root_err)? {
            if !entry.file_type().await.map_err(root_err)?.is_file() {
                continue;
            }
            fs::remove_file(entry.path()).await.map_err(root_err)?;
            deleted += 1;
        }

        tracing::info!("Deleted {} file(s) under {}", deleted, self.root.display());

        Ok(deleted)
    }

    async fn list_keys(&self) -> StorageResult<Vec<TypeKey>> {
        let root_err = |e| StorageError::Root(Arc::new(e));

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(root_err(e)),
        };

        let suffix = format!(".{}", self.extension);
        let mut keys = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(root_err)? {
            let path = entry.path();

            if let Some(filename) = path.file_name().and_then(|s| s.to_str())
                && let Some(stem) = filename.strip_suffix(&suffix)
                && let Ok(key) = TypeKey::new(stem)
            {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(name: &str) -> TypeKey {
        TypeKey::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_write_creates_root_and_reads_back() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("DataManager");
        let storage = FileStorage::new(&root, "json");

        assert!(!storage.exists(&key("Goods")));
        storage
            .write_raw(&key("Goods"), b"{\"gold\":1}".to_vec())
            .await
            .unwrap();

        assert!(root.is_dir());
        assert!(storage.exists(&key("Goods")));
        assert!(root.join("Goods.json").is_file());
        assert!(!root.join("Goods.json.tmp").exists());
        assert_eq!(
            storage.read_raw(&key("Goods")).await.unwrap(),
            b"{\"gold\":1}".to_vec()
        );
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        for atomic in [true, false] {
            let storage = FileStorage::new(temp_dir.path(), "json").with_atomic_writes(atomic);
            storage.write_raw(&key("Goods"), b"first".to_vec()).await.unwrap();
            storage.write_raw(&key("Goods"), b"2nd".to_vec()).await.unwrap();
            assert_eq!(storage.read_raw(&key("Goods")).await.unwrap(), b"2nd".to_vec());
        }
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path(), "json");

        let err = storage.read_raw(&key("Missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_raw_is_noop_when_absent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("never-created"), "json");

        storage.delete_raw(&key("Goods")).await.unwrap();

        storage.write_raw(&key("Goods"), b"x".to_vec()).await.unwrap();
        storage.delete_raw(&key("Goods")).await.unwrap();
        assert!(!storage.exists(&key("Goods")));
    }

    #[tokio::test]
    async fn test_delete_all_and_list_keys() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("DataManager");
        let storage = FileStorage::new(&root, "json");

        assert_eq!(storage.delete_all().await.unwrap(), 0);
        assert!(storage.list_keys().await.unwrap().is_empty());

        storage.write_raw(&key("Settings"), b"{}".to_vec()).await.unwrap();
        storage.write_raw(&key("Goods"), b"{}".to_vec()).await.unwrap();
        std::fs::write(root.join("Goods.json.tmp"), b"stale").unwrap();

        let keys = storage.list_keys().await.unwrap();
        assert_eq!(keys, vec![key("Goods"), key("Settings")]);

        assert_eq!(storage.delete_all().await.unwrap(), 3);
        assert!(storage.list_keys().await.unwrap().is_empty());
        assert!(root.is_dir());
    }
}
