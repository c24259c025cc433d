use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::errors::ChunkError;
use crate::application::ports::{BlobReader, ChunkRepository, ObjectStore, StorageError};
use crate::application::services::{BlobRef, BlobStore, LeasePolicy, LockCoordinator};
use crate::domain::entities::{ChunkRecord, ChunkSet};
use crate::domain::errors::DomainError;
use crate::domain::value_objects::{ContentHash, LockKey, OwnerId, StoragePath, UploadState};

const DIGEST_BUFFER_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone)]
pub struct ChunkAssemblerConfig {
    /// Lease on `disk:lock:merge:{identifier}`; must outlast a merge
    pub merge_lease: LeasePolicy,
    /// Same key, taken briefly to record each staged chunk
    pub submit_lease: LeasePolicy,
}

impl Default for ChunkAssemblerConfig {
    fn default() -> Self {
        Self {
            merge_lease: LeasePolicy::non_blocking(Duration::from_secs(600)),
            submit_lease: LeasePolicy::blocking(
                Duration::from_secs(30),
                Duration::from_millis(20),
                250,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkReceipt {
    Accepted,
    /// Chunk was already staged; the submitted bytes were dropped
    Duplicate,
}

/// What a client needs to resume an interrupted upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadProgress {
    pub identifier: ContentHash,
    pub state: UploadState,
    pub received: BTreeSet<u32>,
    /// Zero until the first chunk has been staged
    pub total_chunks: u32,
    pub total_size: u64,
}

/// Staging and reassembly of resumable chunked uploads
///
/// An upload is keyed by the hash its reassembled content must have.
/// Chunks are first-write-wins: a resubmitted chunk never replaces the
/// staged one.
pub struct ChunkAssembler {
    chunks: Arc<dyn ChunkRepository>,
    objects: Arc<dyn ObjectStore>,
    blobs: Arc<BlobStore>,
    locks: LockCoordinator,
    config: ChunkAssemblerConfig,
}

impl ChunkAssembler {
    pub fn new(
        chunks: Arc<dyn ChunkRepository>,
        objects: Arc<dyn ObjectStore>,
        blobs: Arc<BlobStore>,
        locks: LockCoordinator,
        config: ChunkAssemblerConfig,
    ) -> Self {
        Self {
            chunks,
            objects,
            blobs,
            locks,
            config,
        }
    }

    async fn load(&self, identifier: &ContentHash) -> Result<Option<ChunkSet>, ChunkError> {
        let records = self.chunks.find_chunks(identifier).await?;
        Ok(ChunkSet::from_records(records)?)
    }

    pub async fn submit_chunk(
        &self,
        owner: OwnerId,
        identifier: &ContentHash,
        chunk_number: u32,
        total_chunks: u32,
        total_size: u64,
        bytes: impl Into<Bytes>,
    ) -> Result<ChunkReceipt, ChunkError> {
        let bytes = bytes.into();
        ChunkSet::validate_submission(chunk_number, total_chunks, total_size, bytes.len() as u64)?;

        // Cheap early rejection; repeated under the lease before recording
        if let Some(set) = self.load(identifier).await? {
            set.check_declared(total_chunks, total_size)?;
            if set.has_chunk(chunk_number) {
                debug!(identifier = %identifier, chunk = chunk_number, "Chunk already staged");
                return Ok(ChunkReceipt::Duplicate);
            }
        }

        // Unique path per submission, so racing submitters never share a file
        let token = Uuid::new_v4().simple().to_string();
        let path = StoragePath::for_chunk(identifier, chunk_number, &token)?;
        let reader: BlobReader = Box::pin(std::io::Cursor::new(bytes));
        let written = self.objects.write_atomic(&path, reader, None).await?;

        let record = ChunkRecord {
            identifier: identifier.clone(),
            owner,
            chunk_number,
            chunk_size: written.size_bytes,
            total_chunks,
            total_size,
            storage_path: path,
            created_at: Utc::now(),
        };

        // Serialized with other submissions, merge, abort and expiry of the
        // same upload, so every record of a chunk set agrees on its totals
        let key = LockKey::merge(identifier);
        let outcome = self
            .locks
            .with_lease(&key, &self.config.submit_lease, || self.record_chunk(&record))
            .await;

        match outcome {
            Ok(ChunkReceipt::Accepted) => {
                debug!(identifier = %identifier, chunk = chunk_number, "Chunk staged");
                Ok(ChunkReceipt::Accepted)
            }
            Ok(ChunkReceipt::Duplicate) => {
                self.remove_staged_file(&record.storage_path).await;
                Ok(ChunkReceipt::Duplicate)
            }
            Err(e) => {
                self.remove_staged_file(&record.storage_path).await;
                Err(e)
            }
        }
    }

    async fn record_chunk(&self, record: &ChunkRecord) -> Result<ChunkReceipt, ChunkError> {
        if let Some(set) = self.load(&record.identifier).await? {
            set.check_declared(record.total_chunks, record.total_size)?;
            if set.has_chunk(record.chunk_number) {
                return Ok(ChunkReceipt::Duplicate);
            }
        }

        if self.chunks.insert_if_absent(record).await? {
            Ok(ChunkReceipt::Accepted)
        } else {
            Ok(ChunkReceipt::Duplicate)
        }
    }

    pub async fn status(&self, identifier: &ContentHash) -> Result<UploadProgress, ChunkError> {
        if let Some(set) = self.load(identifier).await? {
            return Ok(UploadProgress {
                identifier: identifier.clone(),
                state: set.state(),
                received: set.received(),
                total_chunks: set.total_chunks(),
                total_size: set.total_size(),
            });
        }

        let state = if self.blobs.contains(identifier).await? {
            UploadState::Merged
        } else {
            UploadState::Collecting
        };
        Ok(UploadProgress {
            identifier: identifier.clone(),
            state,
            received: BTreeSet::new(),
            total_chunks: 0,
            total_size: 0,
        })
    }

    /// Reassemble a complete upload into a blob
    ///
    /// Nothing is mutated unless every chunk is present, the sizes add up and
    /// the content hashes to `identifier`.
    pub async fn merge(
        &self,
        identifier: &ContentHash,
        extension: Option<&str>,
    ) -> Result<BlobRef, ChunkError> {
        let key = LockKey::merge(identifier);
        self.locks
            .with_lease(&key, &self.config.merge_lease, || {
                self.merge_locked(identifier, extension)
            })
            .await
    }

    async fn merge_locked(
        &self,
        identifier: &ContentHash,
        extension: Option<&str>,
    ) -> Result<BlobRef, ChunkError> {
        let set = self
            .load(identifier)
            .await?
            .ok_or_else(|| ChunkError::UnknownUpload(identifier.clone()))?;

        if !set.is_complete() {
            return Err(ChunkError::Incomplete {
                identifier: identifier.clone(),
                missing: set.missing(),
            });
        }

        if set.staged_size() != set.total_size() {
            return Err(DomainError::SizeMismatch(format!(
                "staged chunks hold {} bytes, upload declared {}",
                set.staged_size(),
                set.total_size()
            ))
            .into());
        }

        let actual = digest(self.reassembled(&set)).await?;
        if &actual != identifier {
            return Err(ChunkError::IntegrityMismatch {
                expected: identifier.to_string(),
                actual: actual.to_string(),
            });
        }

        let blob = self
            .blobs
            .put(self.reassembled(&set), identifier, extension)
            .await?;
        info!(
            identifier = %identifier,
            chunks = set.total_chunks(),
            size = set.total_size(),
            deduplicated = blob.deduplicated,
            "Upload merged"
        );

        let records: Vec<ChunkRecord> = set.ordered_chunks().cloned().collect();
        self.discard(identifier, &records).await;
        Ok(blob)
    }

    /// Cancel a collecting upload and drop its staged chunks
    ///
    /// Returns `false` when nothing was staged. A complete upload can only
    /// be merged.
    pub async fn abort(&self, identifier: &ContentHash) -> Result<bool, ChunkError> {
        let key = LockKey::merge(identifier);
        self.locks
            .with_lease(&key, &self.config.merge_lease, || {
                self.abort_locked(identifier)
            })
            .await
    }

    async fn abort_locked(&self, identifier: &ContentHash) -> Result<bool, ChunkError> {
        let records = self.chunks.find_chunks(identifier).await?;
        if records.is_empty() {
            return Ok(false);
        }

        match ChunkSet::from_records(records.clone()) {
            Ok(Some(set)) if !set.state().can_transition_to(UploadState::Aborted) => {
                return Err(DomainError::InvalidStateTransition {
                    from: set.state(),
                    to: UploadState::Aborted,
                }
                .into());
            }
            Ok(_) => {}
            Err(e) => {
                warn!(identifier = %identifier, error = %e, "Aborting upload with conflicting chunk records");
            }
        }

        self.discard(identifier, &records).await;
        info!(identifier = %identifier, "Upload aborted");
        Ok(true)
    }

    /// Drop an upload, whatever its state, if no chunk arrived since
    /// `older_than`
    pub async fn expire(
        &self,
        identifier: &ContentHash,
        older_than: DateTime<Utc>,
    ) -> Result<bool, ChunkError> {
        let key = LockKey::merge(identifier);
        let policy = LeasePolicy::non_blocking(self.config.merge_lease.lease);
        self.locks
            .with_lease(&key, &policy, || self.expire_locked(identifier, older_than))
            .await
    }

    async fn expire_locked(
        &self,
        identifier: &ContentHash,
        older_than: DateTime<Utc>,
    ) -> Result<bool, ChunkError> {
        // Raw records, so a set whose records disagree can still be dropped
        let records = self.chunks.find_chunks(identifier).await?;
        let Some(newest) = records.iter().map(|r| r.created_at).max() else {
            return Ok(false);
        };
        // A chunk may have landed since the candidate query
        if newest >= older_than {
            return Ok(false);
        }

        self.discard(identifier, &records).await;
        info!(identifier = %identifier, "Abandoned upload expired");
        Ok(true)
    }

    /// Chunks in order as one lazily opened stream
    fn reassembled(&self, set: &ChunkSet) -> BlobReader {
        let objects = Arc::clone(&self.objects);
        let paths: Vec<StoragePath> = set
            .ordered_chunks()
            .map(|c| c.storage_path.clone())
            .collect();

        let stream = futures_util::stream::iter(paths)
            .then(move |path| {
                let objects = Arc::clone(&objects);
                async move { objects.read(&path).await.map_err(into_io) }
            })
            .map_ok(ReaderStream::new)
            .try_flatten();

        Box::pin(StreamReader::new(stream))
    }

    /// Best-effort removal of rows then staged files
    async fn discard(&self, identifier: &ContentHash, records: &[ChunkRecord]) {
        if let Err(e) = self.chunks.delete_chunks(identifier).await {
            warn!(identifier = %identifier, error = %e, "Failed to delete chunk records");
        }
        for chunk in records {
            self.remove_staged_file(&chunk.storage_path).await;
        }
        if let Err(e) = self
            .objects
            .remove_dir(&StoragePath::chunk_dir(identifier))
            .await
        {
            debug!(identifier = %identifier, error = %e, "Chunk directory left behind");
        }
    }

    async fn remove_staged_file(&self, path: &StoragePath) {
        if let Err(e) = self.objects.delete(path).await {
            warn!(path = %path, error = %e, "Failed to remove staged chunk");
        }
    }
}

fn into_io(err: StorageError) -> std::io::Error {
    match err {
        StorageError::Io(e) => e,
        StorageError::NotFound(path) => {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("missing chunk {}", path))
        }
        other => std::io::Error::other(other.to_string()),
    }
}

async fn digest(mut reader: BlobReader) -> Result<ContentHash, ChunkError> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; DIGEST_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buffer).await.map_err(StorageError::Io)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(ContentHash::from_digest(&hasher.finalize())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::BlobStoreConfig;
    use crate::application::ErrorKind;
    use crate::infrastructure::memory::{
        InMemoryBlobRepository, InMemoryChunkRepository, InMemoryLeaseBackend,
    };
    use crate::infrastructure::storage::{ContentHasher, LocalFilesystemStore};
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        assembler: ChunkAssembler,
        blobs: Arc<BlobStore>,
        chunk_repo: Arc<InMemoryChunkRepository>,
    }

    async fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let objects = LocalFilesystemStore::with_options(dir.path().to_path_buf(), false, false);
        objects.init().await.unwrap();
        let objects: Arc<dyn ObjectStore> = Arc::new(objects);
        let locks = LockCoordinator::new(Arc::new(InMemoryLeaseBackend::new()));
        let blobs = Arc::new(BlobStore::new(
            Arc::new(InMemoryBlobRepository::new()),
            objects.clone(),
            locks.clone(),
            BlobStoreConfig::default(),
        ));
        let chunk_repo = Arc::new(InMemoryChunkRepository::new());

        Harness {
            assembler: ChunkAssembler::new(
                chunk_repo.clone(),
                objects,
                blobs.clone(),
                locks,
                ChunkAssemblerConfig::default(),
            ),
            blobs,
            chunk_repo,
            dir,
        }
    }

    fn owner() -> OwnerId {
        OwnerId::new(1).unwrap()
    }

    const PARTS: [&[u8]; 3] = [b"alpha-", b"beta-", b"gamma"];

    fn full_content() -> Vec<u8> {
        PARTS.concat()
    }

    async fn submit(h: &Harness, id: &ContentHash, n: u32) -> ChunkReceipt {
        let total = full_content().len() as u64;
        h.assembler
            .submit_chunk(owner(), id, n, 3, total, PARTS[(n - 1) as usize])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_merge_reassembles_in_order() {
        let h = harness().await;
        let id = ContentHasher::hash_bytes(&full_content()).unwrap();

        // Out of order on purpose
        for n in [3, 1, 2] {
            assert_eq!(submit(&h, &id, n).await, ChunkReceipt::Accepted);
        }
        assert_eq!(h.assembler.status(&id).await.unwrap().state, UploadState::Complete);

        let blob = h.assembler.merge(&id, Some("txt")).await.unwrap();
        assert_eq!(blob.size_bytes, full_content().len() as u64);

        let location = h.blobs.locate(&id).await.unwrap();
        assert_eq!(std::fs::read(location.absolute_path).unwrap(), full_content());

        let progress = h.assembler.status(&id).await.unwrap();
        assert_eq!(progress.state, UploadState::Merged);
        assert!(progress.received.is_empty());
        assert_eq!(h.chunk_repo.upload_count(), 0);
        assert!(!h.dir.path().join("chunks").join(id.as_hex()).exists());
    }

    #[tokio::test]
    async fn test_resubmission_is_a_no_op() {
        let h = harness().await;
        let id = ContentHasher::hash_bytes(&full_content()).unwrap();
        let total = full_content().len() as u64;

        submit(&h, &id, 1).await;
        let receipt = h
            .assembler
            .submit_chunk(owner(), &id, 1, 3, total, &b"garbage"[..])
            .await
            .unwrap();
        assert_eq!(receipt, ChunkReceipt::Duplicate);

        submit(&h, &id, 2).await;
        submit(&h, &id, 3).await;
        // Original chunk 1 survived, so the hash still matches
        h.assembler.merge(&id, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_out_of_range_chunk_is_rejected() {
        let h = harness().await;
        let id = ContentHasher::hash_bytes(b"x").unwrap();

        for n in [0, 4] {
            let err = h
                .assembler
                .submit_chunk(owner(), &id, n, 3, 10, &b"x"[..])
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(h.chunk_repo.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_conflicting_totals_are_rejected() {
        let h = harness().await;
        let id = ContentHasher::hash_bytes(&full_content()).unwrap();
        submit(&h, &id, 1).await;

        let err = h
            .assembler
            .submit_chunk(owner(), &id, 2, 4, 16, &b"beta-"[..])
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkError::Domain(DomainError::SizeMismatch(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_first_submissions_agree_on_totals() {
        let h = Arc::new(harness().await);

        for round in 0..30u8 {
            let id = ContentHasher::hash_bytes(&[round]).unwrap();

            let first = {
                let h = Arc::clone(&h);
                let id = id.clone();
                tokio::spawn(async move {
                    h.assembler
                        .submit_chunk(owner(), &id, 1, 2, 10, &b"01234"[..])
                        .await
                })
            };
            let second = {
                let h = Arc::clone(&h);
                let id = id.clone();
                tokio::spawn(async move {
                    h.assembler
                        .submit_chunk(owner(), &id, 2, 3, 15, &b"56789"[..])
                        .await
                })
            };
            let results = [first.await.unwrap(), second.await.unwrap()];

            // Exactly one declaration wins; the other is rejected
            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            let progress = h.assembler.status(&id).await.unwrap();
            assert_eq!(progress.received.len(), 1);
            assert!(h.assembler.abort(&id).await.unwrap());
        }
        assert_eq!(h.chunk_repo.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_submission_waits_for_merge_lease() {
        let h = harness().await;
        let id = ContentHasher::hash_bytes(&full_content()).unwrap();
        h.assembler
            .locks
            .acquire(&LockKey::merge(&id), Duration::from_millis(200))
            .await
            .unwrap();

        // Recorded only after the holder's lease lapses
        let started = std::time::Instant::now();
        assert_eq!(submit(&h, &id, 1).await, ChunkReceipt::Accepted);
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(h.assembler.status(&id).await.unwrap().received, BTreeSet::from([1]));
    }

    #[tokio::test]
    async fn test_conflicting_records_can_still_be_removed() {
        let h = harness().await;
        let id = ContentHasher::hash_bytes(b"conflicting").unwrap();
        let stale = Utc::now() - chrono::Duration::hours(2);

        for (n, total_chunks, total_size) in [(1u32, 2u32, 10u64), (2, 3, 15)] {
            let record = ChunkRecord {
                identifier: id.clone(),
                owner: owner(),
                chunk_number: n,
                chunk_size: 5,
                total_chunks,
                total_size,
                storage_path: StoragePath::for_chunk(&id, n, "t").unwrap(),
                created_at: stale,
            };
            assert!(h.chunk_repo.insert_if_absent(&record).await.unwrap());
        }
        assert!(h.assembler.status(&id).await.is_err());

        assert!(h
            .assembler
            .expire(&id, Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap());
        assert_eq!(h.chunk_repo.upload_count(), 0);

        // Abort drops such a set as well
        for n in [1u32, 2] {
            let record = ChunkRecord {
                identifier: id.clone(),
                owner: owner(),
                chunk_number: n,
                chunk_size: 5,
                total_chunks: n + 1,
                total_size: 10,
                storage_path: StoragePath::for_chunk(&id, n, "u").unwrap(),
                created_at: Utc::now(),
            };
            h.chunk_repo.insert_if_absent(&record).await.unwrap();
        }
        assert!(h.assembler.abort(&id).await.unwrap());
        assert_eq!(h.chunk_repo.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_merge_changes_nothing() {
        let h = harness().await;
        let id = ContentHasher::hash_bytes(&full_content()).unwrap();
        submit(&h, &id, 1).await;
        submit(&h, &id, 3).await;

        let err = h.assembler.merge(&id, None).await.unwrap_err();
        match err {
            ChunkError::Incomplete { missing, .. } => assert_eq!(missing, vec![2]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!h.blobs.contains(&id).await.unwrap());
        assert_eq!(
            h.assembler.status(&id).await.unwrap().received,
            BTreeSet::from([1, 3])
        );
    }

    #[tokio::test]
    async fn test_integrity_mismatch_changes_nothing() {
        let h = harness().await;
        let id = ContentHasher::hash_bytes(b"something else entirely").unwrap();
        for n in 1..=3 {
            submit(&h, &id, n).await;
        }

        let err = h.assembler.merge(&id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
        assert!(!h.blobs.contains(&id).await.unwrap());
        assert_eq!(h.assembler.status(&id).await.unwrap().received.len(), 3);
    }

    #[tokio::test]
    async fn test_merge_unknown_upload() {
        let h = harness().await;
        let id = ContentHasher::hash_bytes(b"nothing staged").unwrap();
        let err = h.assembler.merge(&id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_abort_collecting_upload() {
        let h = harness().await;
        let id = ContentHasher::hash_bytes(&full_content()).unwrap();
        submit(&h, &id, 2).await;

        assert!(h.assembler.abort(&id).await.unwrap());
        assert!(!h.assembler.abort(&id).await.unwrap());
        assert_eq!(h.chunk_repo.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_complete_upload_cannot_be_aborted() {
        let h = harness().await;
        let id = ContentHasher::hash_bytes(&full_content()).unwrap();
        for n in 1..=3 {
            submit(&h, &id, n).await;
        }

        let err = h.assembler.abort(&id).await.unwrap_err();
        assert!(matches!(
            err,
            ChunkError::Domain(DomainError::InvalidStateTransition { .. })
        ));
        assert!(!h
            .assembler
            .expire(&id, Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap());
        assert!(h
            .assembler
            .expire(&id, Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_merge_while_locked_is_conflict() {
        let h = harness().await;
        let id = ContentHasher::hash_bytes(&full_content()).unwrap();
        for n in 1..=3 {
            submit(&h, &id, n).await;
        }

        let held = h
            .assembler
            .locks
            .acquire(&LockKey::merge(&id), Duration::from_secs(30))
            .await
            .unwrap();

        let err = h.assembler.merge(&id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);

        h.assembler
            .locks
            .release(held.key(), held.token())
            .await
            .unwrap();
        h.assembler.merge(&id, None).await.unwrap();
    }
}
