use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

use super::batch_processor::{BatchConfig, BatchProcessor};
use crate::application::services::{BlobStore, PurgeOutcome};
use crate::domain::value_objects::ContentHash;

/// What happened to one zero-refcount candidate
#[derive(Debug, Clone)]
pub struct BlobDeletionAttempt {
    pub content_hash: ContentHash,
    pub result: Result<PurgeOutcome, String>,
}

impl BlobDeletionAttempt {
    pub fn removed(&self) -> bool {
        matches!(self.result, Ok(PurgeOutcome::Removed { .. }))
    }

    /// The candidate was left for a later sweep without failing
    pub fn skipped(&self) -> bool {
        matches!(
            self.result,
            Ok(PurgeOutcome::Contended | PurgeOutcome::StillReferenced | PurgeOutcome::Missing)
        )
    }
}

impl fmt::Display for BlobDeletionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(outcome) => write!(f, "Blob {}: {:?}", self.content_hash, outcome),
            Err(e) => write!(f, "Blob {}: failed: {}", self.content_hash, e),
        }
    }
}

/// Purges candidate blobs through the blob store, a bounded number at a time
///
/// Each purge takes its own hash lease; nothing is held across the batch.
#[derive(Clone)]
pub struct BlobDeletionCoordinator {
    blob_store: Arc<BlobStore>,
    batch: BatchConfig,
}

impl BlobDeletionCoordinator {
    pub fn new(blob_store: Arc<BlobStore>, batch: BatchConfig) -> Self {
        Self { blob_store, batch }
    }

    pub async fn delete_blob(&self, content_hash: ContentHash) -> BlobDeletionAttempt {
        let result = match self.blob_store.purge(&content_hash).await {
            Ok(outcome) => {
                debug!(hash = %content_hash, outcome = ?outcome, "Purge attempted");
                Ok(outcome)
            }
            Err(e) => {
                error!(hash = %content_hash, error = %e, "Failed to purge blob");
                Err(e.to_string())
            }
        };

        BlobDeletionAttempt {
            content_hash,
            result,
        }
    }

    pub async fn delete_blobs(&self, hashes: Vec<ContentHash>) -> Vec<BlobDeletionAttempt> {
        let processor = {
            let coordinator = self.clone();
            move |content_hash: ContentHash| {
                let coordinator = coordinator.clone();
                async move { coordinator.delete_blob(content_hash).await }
            }
        };

        BatchProcessor::process_concurrent(hashes, &self.batch, processor)
            .await
            .into_iter()
            .map(|item| match item.result {
                Ok(attempt) => attempt,
                Err(e) => BlobDeletionAttempt {
                    content_hash: item.item,
                    result: Err(format!("purge task failed: {}", e)),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::gc::collectors::test_utils::GcHarness;
    use crate::domain::value_objects::LockKey;
    use std::time::Duration;

    #[tokio::test]
    async fn test_delete_orphan_removes_file_and_record() {
        let h = GcHarness::new().await;
        let hash = h.orphan(b"nobody wants me").await;
        let path = h.store.locate(&hash).await.unwrap().absolute_path;

        let attempt = h.coordinator().delete_blob(hash.clone()).await;

        assert!(attempt.removed());
        assert!(matches!(
            attempt.result,
            Ok(PurgeOutcome::Removed { file_deleted: true })
        ));
        assert!(!path.exists());
        assert!(!h.store.contains(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_referenced_blob_is_left_alone() {
        let h = GcHarness::new().await;
        let hash = h.referenced(b"still in use").await;

        let attempt = h.coordinator().delete_blob(hash.clone()).await;

        assert!(attempt.skipped());
        assert!(h.store.contains(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_contended_blob_is_skipped() {
        let h = GcHarness::new().await;
        let hash = h.orphan(b"locked elsewhere").await;
        let _held = h
            .locks
            .acquire(&LockKey::upload(&hash), Duration::from_secs(30))
            .await
            .unwrap();

        let attempt = h.coordinator().delete_blob(hash.clone()).await;

        assert!(matches!(attempt.result, Ok(PurgeOutcome::Contended)));
        assert!(attempt.skipped());
        assert!(h.store.contains(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_blobs_reports_every_candidate() {
        let h = GcHarness::new().await;
        let a = h.orphan(b"orphan a").await;
        let b = h.orphan(b"orphan b").await;
        let c = h.referenced(b"kept c").await;

        let attempts = h.coordinator().delete_blobs(vec![a, b, c.clone()]).await;

        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts.iter().filter(|a| a.removed()).count(), 2);
        let kept = attempts.iter().find(|a| a.content_hash == c).unwrap();
        assert!(kept.to_string().contains("StillReferenced"));
    }
}
