use thiserror::Error;

use super::value_objects::UploadState;

#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("Invalid content hash: expected {expected}, got {actual}")]
    InvalidContentHash { expected: String, actual: String },

    #[error("Invalid owner ID: {0}")]
    InvalidOwnerId(String),

    #[error("Invalid lock key: {0}")]
    InvalidLockKey(String),

    #[error("Invalid storage path: {0}")]
    InvalidStoragePath(String),

    #[error("Chunk number {chunk_number} out of range 1..={total_chunks}")]
    ChunkOutOfRange { chunk_number: u32, total_chunks: u32 },

    #[error("Upload must declare at least one chunk")]
    NoChunksDeclared,

    #[error("Size mismatch: {0}")]
    SizeMismatch(String),

    #[error("Invalid upload state transition from {from} to {to}")]
    InvalidStateTransition { from: UploadState, to: UploadState },
}
