//! Shared fixtures for collector tests: real services over in-memory
//! backends and a temporary storage root

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use super::abandoned_chunk_collector::AbandonedChunkCollector;
use super::batch_processor::BatchConfig;
use super::blob_deletion_coordinator::BlobDeletionCoordinator;
use super::orphaned_blob_collector::OrphanedBlobCollector;
use crate::application::services::{
    BlobStore, BlobStoreConfig, ChunkAssembler, ChunkAssemblerConfig, LockCoordinator,
};
use crate::domain::value_objects::{ContentHash, OwnerId};
use crate::infrastructure::memory::{
    InMemoryBlobRepository, InMemoryChunkRepository, InMemoryLeaseBackend,
};
use crate::infrastructure::storage::{ContentHasher, LocalFilesystemStore};

pub struct GcHarness {
    _dir: TempDir,
    pub blobs: Arc<InMemoryBlobRepository>,
    pub chunks: Arc<InMemoryChunkRepository>,
    pub locks: LockCoordinator,
    pub store: Arc<BlobStore>,
    pub assembler: Arc<ChunkAssembler>,
}

impl GcHarness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let objects = Arc::new(LocalFilesystemStore::with_options(
            dir.path().to_path_buf(),
            false,
            false,
        ));
        objects.init().await.unwrap();

        let blobs = Arc::new(InMemoryBlobRepository::new());
        let chunks = Arc::new(InMemoryChunkRepository::new());
        let locks = LockCoordinator::new(Arc::new(InMemoryLeaseBackend::new()));

        let store = Arc::new(BlobStore::new(
            blobs.clone(),
            objects.clone(),
            locks.clone(),
            BlobStoreConfig::default(),
        ));
        let assembler = Arc::new(ChunkAssembler::new(
            chunks.clone(),
            objects,
            Arc::clone(&store),
            locks.clone(),
            ChunkAssemblerConfig::default(),
        ));

        Self {
            _dir: dir,
            blobs,
            chunks,
            locks,
            store,
            assembler,
        }
    }

    /// Store content with one reference
    pub async fn referenced(&self, content: &[u8]) -> ContentHash {
        let hash = ContentHasher::hash_bytes(content).unwrap();
        self.store
            .put_bytes(content.to_vec(), &hash, None)
            .await
            .unwrap();
        hash
    }

    /// Store content and drop its only reference
    pub async fn orphan(&self, content: &[u8]) -> ContentHash {
        let hash = self.referenced(content).await;
        assert_eq!(self.store.release(&hash).await.unwrap(), 0);
        hash
    }

    /// Stage the first of two chunks of `content`
    pub async fn stage_partial(&self, content: &[u8]) -> ContentHash {
        let identifier = ContentHasher::hash_bytes(content).unwrap();
        let half = content.len() / 2;
        self.assembler
            .submit_chunk(
                OwnerId::new(1).unwrap(),
                &identifier,
                1,
                2,
                content.len() as u64,
                content[..half].to_vec(),
            )
            .await
            .unwrap();
        identifier
    }

    pub fn coordinator(&self) -> BlobDeletionCoordinator {
        BlobDeletionCoordinator::new(Arc::clone(&self.store), BatchConfig::new(4))
    }

    pub fn orphan_collector(&self, batch_size: i64) -> OrphanedBlobCollector {
        OrphanedBlobCollector::new(self.blobs.clone(), self.coordinator(), batch_size)
    }

    pub fn chunk_collector(&self, retention: Duration) -> AbandonedChunkCollector {
        AbandonedChunkCollector::new(
            self.chunks.clone(),
            Arc::clone(&self.assembler),
            retention,
            10,
        )
    }
}
