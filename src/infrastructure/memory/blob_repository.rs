use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::application::ports::{BlobRepository, RepositoryError};
use crate::domain::entities::Blob;
use crate::domain::value_objects::ContentHash;

#[derive(Debug, Default)]
pub struct InMemoryBlobRepository {
    blobs: DashMap<ContentHash, Blob>,
}

impl InMemoryBlobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobRepository for InMemoryBlobRepository {
    async fn find(&self, content_hash: &ContentHash) -> Result<Option<Blob>, RepositoryError> {
        Ok(self.blobs.get(content_hash).map(|b| b.value().clone()))
    }

    async fn insert_if_absent(&self, blob: &Blob) -> Result<bool, RepositoryError> {
        match self.blobs.entry(blob.content_hash().clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(blob.clone());
                Ok(true)
            }
        }
    }

    async fn increment_ref(
        &self,
        content_hash: &ContentHash,
    ) -> Result<Option<i64>, RepositoryError> {
        Ok(self.blobs.get_mut(content_hash).map(|mut blob| {
            blob.increment_ref();
            blob.ref_count()
        }))
    }

    async fn decrement_ref(
        &self,
        content_hash: &ContentHash,
    ) -> Result<Option<i64>, RepositoryError> {
        Ok(self.blobs.get_mut(content_hash).map(|mut blob| {
            blob.decrement_ref();
            blob.ref_count()
        }))
    }

    async fn find_orphaned(&self, limit: i64) -> Result<Vec<Blob>, RepositoryError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .blobs
            .iter()
            .filter(|b| b.value().can_gc())
            .take(limit)
            .map(|b| b.value().clone())
            .collect())
    }

    async fn delete_if_orphaned(
        &self,
        content_hash: &ContentHash,
    ) -> Result<bool, RepositoryError> {
        Ok(self
            .blobs
            .remove_if(content_hash, |_, blob| blob.can_gc())
            .is_some())
    }
}
