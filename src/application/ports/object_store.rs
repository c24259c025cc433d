use async_trait::async_trait;
#[cfg(test)]
use mockall::{automock, predicate::*};
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::domain::value_objects::{ContentHash, StoragePath};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Type alias for async reader
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// What an atomic write put on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenObject {
    pub content_hash: ContentHash,
    pub size_bytes: u64,
}

/// Port for the physical filesystem/object store
///
/// Paths are relative to the store root. Nothing partially written is ever
/// visible under a final path.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream `reader` to a temp file, hashing as it goes, then rename into
    /// `path`. With `expected`, a digest mismatch aborts before the rename.
    /// The temp file is removed on every failure.
    async fn write_atomic(
        &self,
        path: &StoragePath,
        reader: BlobReader,
        expected: Option<ContentHash>,
    ) -> Result<WrittenObject, StorageError>;

    /// Open an object for reading
    async fn read(&self, path: &StoragePath) -> Result<BlobReader, StorageError>;

    /// Delete an object; `Ok(false)` if it was already gone
    async fn delete(&self, path: &StoragePath) -> Result<bool, StorageError>;

    /// Check if an object exists
    async fn exists(&self, path: &StoragePath) -> Result<bool, StorageError>;

    /// Remove a directory if it is empty; missing directories are fine
    async fn remove_dir(&self, path: &StoragePath) -> Result<(), StorageError>;

    /// Absolute location of `path`
    fn resolve(&self, path: &StoragePath) -> PathBuf;
}
