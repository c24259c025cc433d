use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::application::ports::{ChunkRepository, RepositoryError};
use crate::domain::entities::ChunkRecord;
use crate::domain::value_objects::ContentHash;

#[derive(Debug, Default)]
pub struct InMemoryChunkRepository {
    uploads: DashMap<ContentHash, BTreeMap<u32, ChunkRecord>>,
}

impl InMemoryChunkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of uploads with at least one staged chunk
    pub fn upload_count(&self) -> usize {
        self.uploads.len()
    }
}

#[async_trait]
impl ChunkRepository for InMemoryChunkRepository {
    async fn find_chunks(
        &self,
        identifier: &ContentHash,
    ) -> Result<Vec<ChunkRecord>, RepositoryError> {
        Ok(self
            .uploads
            .get(identifier)
            .map(|chunks| chunks.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_if_absent(&self, record: &ChunkRecord) -> Result<bool, RepositoryError> {
        let mut chunks = self.uploads.entry(record.identifier.clone()).or_default();
        match chunks.entry(record.chunk_number) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn delete_chunks(&self, identifier: &ContentHash) -> Result<u64, RepositoryError> {
        Ok(self
            .uploads
            .remove(identifier)
            .map(|(_, chunks)| chunks.len() as u64)
            .unwrap_or(0))
    }

    async fn find_stale(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ContentHash>, RepositoryError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .uploads
            .iter()
            .filter(|upload| {
                upload
                    .value()
                    .values()
                    .map(|c| c.created_at)
                    .max()
                    .is_some_and(|newest| newest < older_than)
            })
            .take(limit)
            .map(|upload| upload.key().clone())
            .collect())
    }
}
