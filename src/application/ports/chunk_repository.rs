use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::{automock, predicate::*};

use crate::domain::entities::ChunkRecord;
use crate::domain::value_objects::ContentHash;

use super::RepositoryError;

/// Port for staged-chunk bookkeeping of resumable uploads
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// All chunk records of one upload, any order
    async fn find_chunks(&self, identifier: &ContentHash)
        -> Result<Vec<ChunkRecord>, RepositoryError>;

    /// Record a staged chunk; `Ok(false)` if that chunk number already exists
    async fn insert_if_absent(&self, record: &ChunkRecord) -> Result<bool, RepositoryError>;

    /// Drop every record of one upload, returning how many were removed
    async fn delete_chunks(&self, identifier: &ContentHash) -> Result<u64, RepositoryError>;

    /// Uploads whose most recent chunk was staged before `older_than`
    async fn find_stale(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ContentHash>, RepositoryError>;
}
