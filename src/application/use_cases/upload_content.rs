use bytes::Bytes;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::errors::UseCaseError;
use crate::application::services::{
    BlobRef, BlobStore, ChunkAssembler, ChunkReceipt, QuotaLedger,
};
use crate::domain::value_objects::{extension_of, ContentHash, OwnerId};

/// Answer to "do I need to send this content at all?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPrecheck {
    /// The content is already stored; link it instead of uploading
    pub skip_upload: bool,
    /// Chunks already staged for a resumable upload
    pub received_chunks: BTreeSet<u32>,
}

/// Use case: put content into an owner's storage, charging their quota
///
/// Admission is checked before any bytes move; the quota is charged only
/// after the blob reference exists. If charging fails, the new reference is
/// dropped again so refcounts never outlive an uncharged upload.
pub struct UploadContentUseCase {
    blobs: Arc<BlobStore>,
    chunks: Arc<ChunkAssembler>,
    quota: Arc<QuotaLedger>,
}

impl UploadContentUseCase {
    pub fn new(blobs: Arc<BlobStore>, chunks: Arc<ChunkAssembler>, quota: Arc<QuotaLedger>) -> Self {
        Self {
            blobs,
            chunks,
            quota,
        }
    }

    pub async fn precheck(&self, identifier: &ContentHash) -> Result<UploadPrecheck, UseCaseError> {
        if self.blobs.contains(identifier).await? {
            return Ok(UploadPrecheck {
                skip_upload: true,
                received_chunks: BTreeSet::new(),
            });
        }

        let progress = self.chunks.status(identifier).await?;
        Ok(UploadPrecheck {
            skip_upload: false,
            received_chunks: progress.received,
        })
    }

    /// Single-shot upload
    pub async fn upload(
        &self,
        owner: OwnerId,
        bytes: impl Into<Bytes>,
        declared: &ContentHash,
        file_name: &str,
    ) -> Result<BlobRef, UseCaseError> {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        self.quota.admit(owner, size).await?;

        let extension = extension_of(file_name);
        let blob = self
            .blobs
            .put_bytes(bytes, declared, extension.as_deref())
            .await?;

        self.charge(owner, &blob).await?;
        info!(owner = %owner, hash = %blob.content_hash, size, deduplicated = blob.deduplicated, "Content uploaded");
        Ok(blob)
    }

    /// Instant upload by hash; `None` if the content is not stored yet
    pub async fn instant_upload(
        &self,
        owner: OwnerId,
        identifier: &ContentHash,
        size: u64,
    ) -> Result<Option<BlobRef>, UseCaseError> {
        self.quota.admit(owner, size).await?;

        let Some(blob) = self.blobs.link(identifier).await? else {
            return Ok(None);
        };

        self.charge(owner, &blob).await?;
        info!(owner = %owner, hash = %identifier, "Instant upload");
        Ok(Some(blob))
    }

    /// Stage one chunk; admission is checked against the whole upload
    pub async fn submit_chunk(
        &self,
        owner: OwnerId,
        identifier: &ContentHash,
        chunk_number: u32,
        total_chunks: u32,
        total_size: u64,
        bytes: impl Into<Bytes>,
    ) -> Result<ChunkReceipt, UseCaseError> {
        self.quota.admit(owner, total_size).await?;

        let receipt = self
            .chunks
            .submit_chunk(owner, identifier, chunk_number, total_chunks, total_size, bytes)
            .await?;
        Ok(receipt)
    }

    pub async fn merge(
        &self,
        owner: OwnerId,
        identifier: &ContentHash,
        file_name: &str,
    ) -> Result<BlobRef, UseCaseError> {
        let extension = extension_of(file_name);
        let blob = self.chunks.merge(identifier, extension.as_deref()).await?;

        self.charge(owner, &blob).await?;
        Ok(blob)
    }

    /// Drop one reference and credit the owner
    pub async fn release(
        &self,
        owner: OwnerId,
        hash: &ContentHash,
        size: u64,
    ) -> Result<i64, UseCaseError> {
        let remaining = self.blobs.release(hash).await?;
        self.quota.decrement(owner, size).await?;
        Ok(remaining)
    }

    async fn charge(&self, owner: OwnerId, blob: &BlobRef) -> Result<(), UseCaseError> {
        if let Err(e) = self.quota.increment(owner, blob.size_bytes).await {
            if let Err(undo) = self.blobs.release(&blob.content_hash).await {
                warn!(hash = %blob.content_hash, error = %undo, "Failed to drop uncharged reference");
            }
            return Err(e.into());
        }
        Ok(())
    }
}
