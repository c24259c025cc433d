use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::blob_deletion_coordinator::BlobDeletionCoordinator;
use super::collector::{CollectionResult, Collector};
use super::errors::GcResult;
use crate::application::ports::BlobRepository;
use crate::domain::value_objects::ContentHash;

/// Removes blobs whose reference count reached zero
///
/// Pages through the zero-refcount query until a page offers nothing new.
/// Candidates that were skipped or failed are remembered for the rest of
/// the run so the loop cannot spin on them.
pub struct OrphanedBlobCollector {
    blob_repo: Arc<dyn BlobRepository>,
    deletion_coordinator: BlobDeletionCoordinator,
    batch_size: i64,
}

pub const ORPHANED_BLOB_COLLECTOR: &str = "orphaned_blob_collector";

#[async_trait]
impl Collector for OrphanedBlobCollector {
    fn name(&self) -> &'static str {
        ORPHANED_BLOB_COLLECTOR
    }

    async fn collect(&self) -> GcResult<CollectionResult> {
        let mut result = CollectionResult::new(self.name());
        let mut passed: HashSet<ContentHash> = HashSet::new();

        loop {
            // Passed candidates still match the query; widen the page past them
            let limit = self.batch_size + passed.len() as i64;
            let page = self.blob_repo.find_orphaned(limit).await?;
            let candidates: Vec<ContentHash> = page
                .into_iter()
                .map(|blob| blob.content_hash().clone())
                .filter(|hash| !passed.contains(hash))
                .collect();

            if candidates.is_empty() {
                break;
            }
            debug!(count = candidates.len(), "Purging orphaned blobs");

            for attempt in self.deletion_coordinator.delete_blobs(candidates).await {
                if attempt.removed() {
                    result.items_cleaned += 1;
                    continue;
                }
                if attempt.skipped() {
                    result.skipped += 1;
                } else {
                    result.errors.push(attempt.to_string());
                }
                passed.insert(attempt.content_hash);
            }
        }

        if result.has_cleaned_items() {
            info!(removed = result.items_cleaned, "Cleaned up orphaned blobs");
        }
        Ok(result)
    }
}

impl OrphanedBlobCollector {
    pub fn new(
        blob_repo: Arc<dyn BlobRepository>,
        deletion_coordinator: BlobDeletionCoordinator,
        batch_size: i64,
    ) -> Self {
        Self {
            blob_repo,
            deletion_coordinator,
            batch_size: batch_size.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::gc::collectors::errors::GcError;
    use crate::application::gc::collectors::test_utils::GcHarness;
    use crate::application::gc::collectors::batch_processor::BatchConfig;
    use crate::application::ports::{MockBlobRepository, RepositoryError};
    use crate::application::services::{BlobStore, BlobStoreConfig, LockCoordinator};
    use crate::domain::entities::Blob;
    use crate::domain::value_objects::{LockKey, StoragePath};
    use crate::infrastructure::memory::InMemoryLeaseBackend;
    use crate::infrastructure::storage::LocalFilesystemStore;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_collect_nothing_to_do() {
        let h = GcHarness::new().await;
        h.referenced(b"live").await;

        let result = h.orphan_collector(100).collect().await.unwrap();

        assert_eq!(result.items_cleaned, 0);
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_collect_pages_through_all_orphans() {
        let h = GcHarness::new().await;
        for i in 0..7 {
            h.orphan(format!("orphan number {i}").as_bytes()).await;
        }
        let kept = h.referenced(b"survivor").await;

        let result = h.orphan_collector(2).collect().await.unwrap();

        assert_eq!(result.items_cleaned, 7);
        assert_eq!(h.blobs.len(), 1);
        assert!(h.store.contains(&kept).await.unwrap());
    }

    #[tokio::test]
    async fn test_contended_orphan_does_not_stall_the_run() {
        let h = GcHarness::new().await;
        let busy = h.orphan(b"busy orphan").await;
        h.orphan(b"free orphan one").await;
        h.orphan(b"free orphan two").await;
        let _held = h
            .locks
            .acquire(&LockKey::upload(&busy), Duration::from_secs(30))
            .await
            .unwrap();

        let result = h.orphan_collector(1).collect().await.unwrap();

        assert_eq!(result.items_cleaned, 2);
        assert_eq!(result.skipped, 1);
        assert!(h.store.contains(&busy).await.unwrap());
    }

    #[tokio::test]
    async fn test_query_failure_is_reported() {
        let h = GcHarness::new().await;
        let mut repo = MockBlobRepository::new();
        repo.expect_find_orphaned()
            .returning(|_| Err(RepositoryError::Internal("connection reset".into())));

        let collector = OrphanedBlobCollector::new(Arc::new(repo), h.coordinator(), 10);
        let err = collector.collect().await.unwrap_err();

        assert!(matches!(err, GcError::QueryError { .. }));
    }

    #[tokio::test]
    async fn test_panicking_purge_is_reported_once() {
        let dir = TempDir::new().unwrap();
        let objects = LocalFilesystemStore::with_options(dir.path().to_path_buf(), false, false);
        objects.init().await.unwrap();

        let hash = ContentHash::from_hex("ab".repeat(32)).unwrap();
        let orphan = Blob::reconstruct(
            hash.clone(),
            StoragePath::for_blob(&hash, None).unwrap(),
            3,
            0,
            chrono::Utc::now(),
            chrono::Utc::now(),
        );

        let mut repo = MockBlobRepository::new();
        repo.expect_find_orphaned()
            .returning(move |_| Ok(vec![orphan.clone()]));
        repo.expect_find().returning(|_| panic!("corrupt blob row"));
        let repo = Arc::new(repo);

        let store = Arc::new(BlobStore::new(
            repo.clone(),
            Arc::new(objects),
            LockCoordinator::new(Arc::new(InMemoryLeaseBackend::new())),
            BlobStoreConfig::default(),
        ));
        let collector = OrphanedBlobCollector::new(
            repo,
            BlobDeletionCoordinator::new(store, BatchConfig::default()),
            10,
        );

        let result = tokio::time::timeout(Duration::from_secs(5), collector.collect())
            .await
            .expect("collector kept retrying the failing candidate")
            .unwrap();

        assert_eq!(result.items_cleaned, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains(hash.as_hex()));
    }
}
