use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::BufReader;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::ports::{BlobReader, ObjectStore, StorageError, WrittenObject};
use crate::domain::value_objects::{ContentHash, StoragePath};
use crate::infrastructure::storage::{ContentHasher, PathBuilder};

/// Local filesystem object store
///
/// Every write lands in `temp/` first and is renamed into place, so the temp
/// directory must live on the same filesystem as the final paths.
pub struct LocalFilesystemStore {
    path_builder: PathBuilder,
    durable_writes: bool,
    precreate_dirs: bool,
    // Parent directories already known to exist
    created_dirs: RwLock<HashSet<PathBuf>>,
}

impl LocalFilesystemStore {
    pub fn new(root: PathBuf) -> Self {
        Self::with_options(root, true, true)
    }

    pub fn with_durability(root: PathBuf, durable_writes: bool) -> Self {
        Self::with_options(root, durable_writes, true)
    }

    pub fn with_options(root: PathBuf, durable_writes: bool, precreate_dirs: bool) -> Self {
        Self {
            path_builder: PathBuilder::new(root),
            durable_writes,
            precreate_dirs,
            created_dirs: RwLock::new(HashSet::new()),
        }
    }

    /// Initialize storage directories
    pub async fn init(&self) -> Result<(), StorageError> {
        let root = self.path_builder.root();
        fs::create_dir_all(root.join("temp")).await?;
        fs::create_dir_all(root.join("chunks")).await?;

        let blobs_root = root.join("blobs");
        fs::create_dir_all(&blobs_root).await?;

        // Pre-create all 256 hex prefix directories to avoid doing it on every write
        if self.precreate_dirs {
            for i in 0..=255 {
                let dir = blobs_root.join(format!("{:02x}", i));
                fs::create_dir_all(&dir).await?;
                self.created_dirs.write().insert(dir);
            }
        }

        Ok(())
    }

    async fn ensure_dir(&self, dir: &Path) -> Result<(), StorageError> {
        if self.created_dirs.read().contains(dir) {
            return Ok(());
        }
        fs::create_dir_all(dir).await?;
        self.created_dirs.write().insert(dir.to_path_buf());
        Ok(())
    }

    async fn sync_parent(&self, path: &Path) {
        let Some(parent) = path.parent() else {
            return;
        };
        match File::open(parent).await {
            Ok(parent_file) => {
                if let Err(e) = parent_file.sync_all().await {
                    // Already renamed; the write itself succeeded
                    warn!("Failed to sync parent directory after rename: {}", e);
                }
            }
            Err(e) => warn!("Failed to open parent directory for sync: {}", e),
        }
    }

    async fn move_into_place(&self, temp_path: &Path, final_path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = final_path.parent() {
            self.ensure_dir(parent).await?;
        }

        // Content-addressed targets hold identical bytes, so an existing file wins
        if fs::metadata(final_path).await.is_ok() {
            debug!("Object already present at {:?}, dropping temp", final_path);
            let _ = fs::remove_file(temp_path).await;
            return Ok(());
        }

        fs::rename(temp_path, final_path).await?;
        if self.durable_writes {
            self.sync_parent(final_path).await;
        }
        Ok(())
    }
}

fn not_found_as(path: &StoragePath) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(path.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

#[async_trait]
impl ObjectStore for LocalFilesystemStore {
    async fn write_atomic(
        &self,
        path: &StoragePath,
        reader: BlobReader,
        expected: Option<ContentHash>,
    ) -> Result<WrittenObject, StorageError> {
        let temp_path = self.path_builder.temp_path(Uuid::new_v4());

        debug!("Writing object to temp file: {:?}", temp_path);
        let (content_hash, size_bytes) =
            match ContentHasher::write_and_hash(&temp_path, reader, self.durable_writes).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Failed to write temp file {:?}: {}", temp_path, e);
                    let _ = fs::remove_file(&temp_path).await;
                    return Err(e);
                }
            };

        if let Some(expected) = expected {
            if expected != content_hash {
                let _ = fs::remove_file(&temp_path).await;
                return Err(StorageError::HashMismatch {
                    expected: expected.to_string(),
                    actual: content_hash.to_string(),
                });
            }
        }

        let final_path = self.path_builder.resolve(path);
        if let Err(e) = self.move_into_place(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        debug!(path = %path, size = size_bytes, "Object written");
        Ok(WrittenObject {
            content_hash,
            size_bytes,
        })
    }

    async fn read(&self, path: &StoragePath) -> Result<BlobReader, StorageError> {
        let file = File::open(self.path_builder.resolve(path))
            .await
            .map_err(not_found_as(path))?;

        Ok(Box::pin(BufReader::new(file)))
    }

    async fn delete(&self, path: &StoragePath) -> Result<bool, StorageError> {
        match fs::remove_file(self.path_builder.resolve(path)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, path: &StoragePath) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.path_builder.resolve(path)).await?)
    }

    async fn remove_dir(&self, path: &StoragePath) -> Result<(), StorageError> {
        let dir = self.path_builder.resolve(path);
        match fs::remove_dir(&dir).await {
            Ok(()) => {
                self.created_dirs.write().remove(&dir);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn resolve(&self, path: &StoragePath) -> PathBuf {
        self.path_builder.resolve(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn reader(content: &'static [u8]) -> BlobReader {
        Box::pin(std::io::Cursor::new(content))
    }

    async fn store() -> (TempDir, LocalFilesystemStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalFilesystemStore::with_options(dir.path().to_path_buf(), false, false);
        store.init().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_store_init_creates_directories() {
        let dir = TempDir::new().unwrap();
        let store = LocalFilesystemStore::new(dir.path().to_path_buf());
        store.init().await.unwrap();

        assert!(dir.path().join("temp").exists());
        assert!(dir.path().join("chunks").exists());
        assert!(dir.path().join("blobs").join("ff").exists());
    }

    #[tokio::test]
    async fn test_write_and_read_object() {
        let (_dir, store) = store().await;
        let content = b"Hello, World!";
        let hash = ContentHasher::hash_bytes(content).unwrap();
        let path = StoragePath::for_blob(&hash, Some("txt")).unwrap();

        let written = store
            .write_atomic(&path, reader(content), Some(hash.clone()))
            .await
            .unwrap();
        assert_eq!(written.content_hash, hash);
        assert_eq!(written.size_bytes, content.len() as u64);

        let mut reader = store.read(&path).await.unwrap();
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.unwrap();
        assert_eq!(buffer, content);
    }

    #[tokio::test]
    async fn test_hash_mismatch_leaves_nothing_behind() {
        let (dir, store) = store().await;
        let wrong = ContentHash::from_hex("0".repeat(64)).unwrap();
        let path = StoragePath::for_blob(&wrong, None).unwrap();

        let err = store
            .write_atomic(&path, reader(b"not zeros"), Some(wrong))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::HashMismatch { .. }));
        assert!(!store.exists(&path).await.unwrap());

        let temp_entries = std::fs::read_dir(dir.path().join("temp")).unwrap().count();
        assert_eq!(temp_entries, 0);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, store) = store().await;
        let path = StoragePath::new("chunks/abc/1-x").unwrap();
        store
            .write_atomic(&path, reader(b"chunk"), None)
            .await
            .unwrap();

        assert!(store.exists(&path).await.unwrap());
        assert!(store.delete(&path).await.unwrap());
        assert!(!store.delete(&path).await.unwrap());
        assert!(!store.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_dir, store) = store().await;
        let path = StoragePath::new("blobs/00/missing").unwrap();
        let err = store.read(&path).await.err().unwrap();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_dir_after_emptying() {
        let (dir, store) = store().await;
        let path = StoragePath::new("chunks/upload/1-a").unwrap();
        store.write_atomic(&path, reader(b"x"), None).await.unwrap();
        store.delete(&path).await.unwrap();

        let parent = path.parent().unwrap();
        store.remove_dir(&parent).await.unwrap();
        store.remove_dir(&parent).await.unwrap();
        assert!(!dir.path().join("chunks").join("upload").exists());
    }
}
