use async_trait::async_trait;
#[cfg(test)]
use mockall::{automock, predicate::*};

use crate::domain::entities::Blob;
use crate::domain::value_objects::ContentHash;

use super::RepositoryError;

/// Port for blob records and their reference counts
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlobRepository: Send + Sync {
    /// Point lookup by content hash
    async fn find(&self, content_hash: &ContentHash) -> Result<Option<Blob>, RepositoryError>;

    /// Insert a new blob row; `Ok(false)` if the hash is already recorded
    async fn insert_if_absent(&self, blob: &Blob) -> Result<bool, RepositoryError>;

    /// Atomically increment; returns the new count, `None` if no such blob
    async fn increment_ref(&self, content_hash: &ContentHash)
        -> Result<Option<i64>, RepositoryError>;

    /// Atomically decrement (saturating at zero); `None` if no such blob
    async fn decrement_ref(&self, content_hash: &ContentHash)
        -> Result<Option<i64>, RepositoryError>;

    /// Find blobs with zero references for the reaper
    async fn find_orphaned(&self, limit: i64) -> Result<Vec<Blob>, RepositoryError>;

    /// Delete the row only while its ref count is still zero
    async fn delete_if_orphaned(&self, content_hash: &ContentHash)
        -> Result<bool, RepositoryError>;
}
