//! Error types of the storage services
//!
//! Every service error maps onto a small, caller-facing [`ErrorKind`] so the
//! layer above can decide between rejecting, retrying and reporting without
//! matching on each service's variants.

use thiserror::Error;

use crate::application::ports::{RepositoryError, StorageError};
use crate::domain::errors::DomainError;
use crate::domain::value_objects::{ContentHash, OwnerId};

/// Caller-facing classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; rejected before any mutation
    Validation,
    /// A lease was contended; try again later
    ConcurrencyConflict,
    /// Merge requested before every chunk arrived
    IncompleteUpload,
    /// Bytes do not hash to the declared identifier
    IntegrityMismatch,
    /// Physical write, rename or delete failed
    StorageIo,
    QuotaExceeded,
    NotFound,
    /// Authoritative store or lease backend unavailable
    Backend,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::ConcurrencyConflict | ErrorKind::Backend)
    }
}

fn storage_kind(err: &StorageError) -> ErrorKind {
    match err {
        StorageError::HashMismatch { .. } => ErrorKind::IntegrityMismatch,
        StorageError::NotFound(_) => ErrorKind::NotFound,
        StorageError::Io(_) | StorageError::Internal(_) => ErrorKind::StorageIo,
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock {key} is held by another caller")]
    Contended { key: String },

    #[error("Lease backend error: {0}")]
    Backend(#[from] RepositoryError),
}

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LockError::Contended { .. } => ErrorKind::ConcurrencyConflict,
            LockError::Backend(_) => ErrorKind::Backend,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Content hashes to {actual}, expected {expected}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("Blob not found: {0}")]
    NotFound(ContentHash),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl BlobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BlobError::Domain(_) => ErrorKind::Validation,
            BlobError::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            BlobError::NotFound(_) => ErrorKind::NotFound,
            BlobError::Lock(e) => e.kind(),
            BlobError::Repository(_) => ErrorKind::Backend,
            BlobError::Storage(e) => storage_kind(e),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Upload {identifier} is missing chunks {missing:?}")]
    Incomplete {
        identifier: ContentHash,
        missing: Vec<u32>,
    },

    #[error("Reassembled content hashes to {actual}, expected {expected}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("No chunks staged for upload {0}")]
    UnknownUpload(ContentHash),

    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ChunkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChunkError::Domain(_) => ErrorKind::Validation,
            ChunkError::Incomplete { .. } => ErrorKind::IncompleteUpload,
            ChunkError::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            ChunkError::UnknownUpload(_) => ErrorKind::NotFound,
            ChunkError::Blob(e) => e.kind(),
            ChunkError::Lock(e) => e.kind(),
            ChunkError::Repository(_) => ErrorKind::Backend,
            ChunkError::Storage(e) => storage_kind(e),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Quota exceeded for owner {owner}: {used} of {total} used, {requested} requested")]
    QuotaExceeded {
        owner: OwnerId,
        total: u64,
        used: u64,
        requested: u64,
    },

    #[error("No quota record for owner {0}")]
    UnknownOwner(OwnerId),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl QuotaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuotaError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            QuotaError::UnknownOwner(_) => ErrorKind::NotFound,
            QuotaError::Lock(e) => e.kind(),
            QuotaError::Repository(_) => ErrorKind::Backend,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("Folder {folder_id} is not empty: contains file {file_id}")]
    FolderNotEmpty { folder_id: i64, file_id: i64 },

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl NamespaceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NamespaceError::FolderNotEmpty { .. } => ErrorKind::Validation,
            NamespaceError::Lock(e) => e.kind(),
            NamespaceError::Repository(_) => ErrorKind::Backend,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Error type of the upload use case
#[derive(Debug, Error)]
pub enum UseCaseError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("Chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("Quota error: {0}")]
    Quota(#[from] QuotaError),
}

impl UseCaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UseCaseError::Domain(_) => ErrorKind::Validation,
            UseCaseError::Blob(e) => e.kind(),
            UseCaseError::Chunk(e) => e.kind(),
            UseCaseError::Quota(e) => e.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
