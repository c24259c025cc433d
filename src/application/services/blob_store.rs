use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::errors::{BlobError, LockError};
use crate::application::ports::{
    BlobReader, BlobRepository, ObjectStore, StorageError, WrittenObject,
};
use crate::application::services::{LeasePolicy, LockCoordinator};
use crate::domain::entities::Blob;
use crate::domain::value_objects::{ContentHash, LockKey, StoragePath};

#[derive(Debug, Clone)]
pub struct BlobStoreConfig {
    /// Policy for the per-hash lease taken by `put` and `link`
    pub hash_lease: LeasePolicy,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            hash_lease: LeasePolicy::blocking(
                Duration::from_secs(30),
                Duration::from_millis(100),
                50,
            ),
        }
    }
}

/// Reference handed back by `put` and `link`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub content_hash: ContentHash,
    pub storage_path: StoragePath,
    pub size_bytes: u64,
    pub ref_count: i64,
    /// The content was already stored and only the ref count moved
    pub deduplicated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLocation {
    pub content_hash: ContentHash,
    pub storage_path: StoragePath,
    pub absolute_path: PathBuf,
    pub size_bytes: u64,
    pub ref_count: i64,
}

/// Outcome of a guarded physical deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOutcome {
    Removed { file_deleted: bool },
    StillReferenced,
    /// Someone else holds the hash lease; try again next sweep
    Contended,
    Missing,
}

/// What the authority and the filesystem hold for one hash
enum Existing {
    Absent,
    Stored(Blob),
    /// Recorded, but the file is gone
    Lost(Blob),
}

/// Content-addressed blob storage with reference counting
///
/// At most one physical copy exists per hash: first writers and
/// deduplicating writers are serialized on `disk:lock:upload:{hash}`.
/// `release` only decrements; bytes are removed later by `purge`.
pub struct BlobStore {
    blobs: Arc<dyn BlobRepository>,
    objects: Arc<dyn ObjectStore>,
    locks: LockCoordinator,
    config: BlobStoreConfig,
}

impl BlobStore {
    pub fn new(
        blobs: Arc<dyn BlobRepository>,
        objects: Arc<dyn ObjectStore>,
        locks: LockCoordinator,
        config: BlobStoreConfig,
    ) -> Self {
        Self {
            blobs,
            objects,
            locks,
            config,
        }
    }

    /// Store content under its declared hash, or add a reference if the
    /// hash is already stored
    ///
    /// The bytes are verified against `declared` before they become visible.
    /// On the deduplication path they are discarded unread.
    pub async fn put(
        &self,
        reader: BlobReader,
        declared: &ContentHash,
        extension: Option<&str>,
    ) -> Result<BlobRef, BlobError> {
        let key = LockKey::upload(declared);
        self.locks
            .with_lease(&key, &self.config.hash_lease, move || {
                self.put_locked(reader, declared, extension)
            })
            .await
    }

    pub async fn put_bytes(
        &self,
        bytes: impl Into<Bytes>,
        declared: &ContentHash,
        extension: Option<&str>,
    ) -> Result<BlobRef, BlobError> {
        let reader: BlobReader = Box::pin(std::io::Cursor::new(bytes.into()));
        self.put(reader, declared, extension).await
    }

    async fn put_locked(
        &self,
        reader: BlobReader,
        declared: &ContentHash,
        extension: Option<&str>,
    ) -> Result<BlobRef, BlobError> {
        match self.find_existing(declared).await? {
            Existing::Stored(blob) => {
                if let Some(existing) = self.reference(&blob, true).await? {
                    debug!(hash = %declared, ref_count = existing.ref_count, "Deduplicated put");
                    return Ok(existing);
                }
            }
            // Record outlived its bytes; restore them at the recorded path
            Existing::Lost(blob) => {
                let written = self.write_verified(blob.storage_path(), reader, declared).await?;
                info!(hash = %declared, path = %blob.storage_path(), "Restored missing blob file");
                return match self.reference(&blob, false).await? {
                    Some(restored) => Ok(restored),
                    None => self.record_new_blob(blob.storage_path().clone(), written).await,
                };
            }
            Existing::Absent => {}
        }

        let path = StoragePath::for_blob(declared, extension)?;
        let written = self.write_verified(&path, reader, declared).await?;
        self.record_new_blob(path, written).await
    }

    async fn write_verified(
        &self,
        path: &StoragePath,
        reader: BlobReader,
        declared: &ContentHash,
    ) -> Result<WrittenObject, BlobError> {
        self.objects
            .write_atomic(path, reader, Some(declared.clone()))
            .await
            .map_err(|e| match e {
                StorageError::HashMismatch { expected, actual } => {
                    BlobError::IntegrityMismatch { expected, actual }
                }
                other => BlobError::Storage(other),
            })
    }

    async fn record_new_blob(
        &self,
        path: StoragePath,
        written: WrittenObject,
    ) -> Result<BlobRef, BlobError> {
        let blob = Blob::new(written.content_hash.clone(), path, written.size_bytes);

        match self.blobs.insert_if_absent(&blob).await {
            Ok(true) => {
                info!(hash = %blob.content_hash(), size = blob.size_bytes(), "Blob created");
                Ok(BlobRef {
                    content_hash: blob.content_hash().clone(),
                    storage_path: blob.storage_path().clone(),
                    size_bytes: blob.size_bytes(),
                    ref_count: blob.ref_count(),
                    deduplicated: false,
                })
            }
            // Recorded by a writer that bypassed the lease; count ours against it
            Ok(false) => self
                .add_reference(&written.content_hash)
                .await?
                .ok_or_else(|| BlobError::NotFound(written.content_hash.clone())),
            Err(e) => {
                // No record points at the file, so nothing can be reading it
                if let Err(cleanup) = self.objects.delete(blob.storage_path()).await {
                    warn!(
                        path = %blob.storage_path(),
                        error = %cleanup,
                        "Failed to remove unrecorded blob file"
                    );
                }
                Err(e.into())
            }
        }
    }

    async fn find_existing(&self, hash: &ContentHash) -> Result<Existing, BlobError> {
        let Some(blob) = self.blobs.find(hash).await? else {
            return Ok(Existing::Absent);
        };
        if self.objects.exists(blob.storage_path()).await? {
            Ok(Existing::Stored(blob))
        } else {
            warn!(hash = %hash, path = %blob.storage_path(), "Blob record has no file");
            Ok(Existing::Lost(blob))
        }
    }

    /// Reference stored content; `None` when it is absent or its file is gone
    async fn add_reference(&self, hash: &ContentHash) -> Result<Option<BlobRef>, BlobError> {
        match self.find_existing(hash).await? {
            Existing::Stored(blob) => self.reference(&blob, true).await,
            Existing::Lost(_) | Existing::Absent => Ok(None),
        }
    }

    async fn reference(
        &self,
        blob: &Blob,
        deduplicated: bool,
    ) -> Result<Option<BlobRef>, BlobError> {
        let Some(ref_count) = self.blobs.increment_ref(blob.content_hash()).await? else {
            return Ok(None);
        };

        Ok(Some(BlobRef {
            content_hash: blob.content_hash().clone(),
            storage_path: blob.storage_path().clone(),
            size_bytes: blob.size_bytes(),
            ref_count,
            deduplicated,
        }))
    }

    /// Instant upload: add a reference to already-stored content
    ///
    /// `None` when the hash is not stored; the caller must upload the bytes.
    pub async fn link(&self, hash: &ContentHash) -> Result<Option<BlobRef>, BlobError> {
        let key = LockKey::upload(hash);
        self.locks
            .with_lease(&key, &self.config.hash_lease, || self.add_reference(hash))
            .await
    }

    pub async fn contains(&self, hash: &ContentHash) -> Result<bool, BlobError> {
        Ok(self.blobs.find(hash).await?.is_some())
    }

    /// Physical location of a stored blob
    ///
    /// Still succeeds at ref count 0, until the reaper removes the blob.
    pub async fn locate(&self, hash: &ContentHash) -> Result<BlobLocation, BlobError> {
        let blob = self
            .blobs
            .find(hash)
            .await?
            .ok_or_else(|| BlobError::NotFound(hash.clone()))?;

        Ok(BlobLocation {
            content_hash: blob.content_hash().clone(),
            absolute_path: self.objects.resolve(blob.storage_path()),
            storage_path: blob.storage_path().clone(),
            size_bytes: blob.size_bytes(),
            ref_count: blob.ref_count(),
        })
    }

    pub async fn open(&self, hash: &ContentHash) -> Result<BlobReader, BlobError> {
        let location = self.locate(hash).await?;
        Ok(self.objects.read(&location.storage_path).await?)
    }

    /// Drop one reference, returning the remaining count
    ///
    /// Never deletes anything; a blob at zero waits for the reaper.
    pub async fn release(&self, hash: &ContentHash) -> Result<i64, BlobError> {
        let remaining = self
            .blobs
            .decrement_ref(hash)
            .await?
            .ok_or_else(|| BlobError::NotFound(hash.clone()))?;

        if remaining == 0 {
            debug!(hash = %hash, "Blob has no references left");
        }
        Ok(remaining)
    }

    /// Delete an unreferenced blob's bytes and record
    ///
    /// Takes the hash lease without waiting, then re-checks the ref count
    /// under it, so a concurrent `put` or `link` is never undercut.
    pub async fn purge(&self, hash: &ContentHash) -> Result<PurgeOutcome, BlobError> {
        let key = LockKey::upload(hash);
        let policy = LeasePolicy::non_blocking(self.config.hash_lease.lease);

        match self
            .locks
            .with_lease(&key, &policy, || self.purge_locked(hash))
            .await
        {
            Err(BlobError::Lock(LockError::Contended { .. })) => Ok(PurgeOutcome::Contended),
            other => other,
        }
    }

    async fn purge_locked(&self, hash: &ContentHash) -> Result<PurgeOutcome, BlobError> {
        let Some(blob) = self.blobs.find(hash).await? else {
            return Ok(PurgeOutcome::Missing);
        };
        if !blob.can_gc() {
            return Ok(PurgeOutcome::StillReferenced);
        }

        let file_deleted = self.objects.delete(blob.storage_path()).await?;
        if !file_deleted {
            debug!(hash = %hash, "Blob file was already gone");
        }

        if self.blobs.delete_if_orphaned(hash).await? {
            Ok(PurgeOutcome::Removed { file_deleted })
        } else {
            Ok(PurgeOutcome::StillReferenced)
        }
    }
}
