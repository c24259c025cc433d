pub mod abandoned_chunk_collector;
pub mod batch_processor;
pub mod blob_deletion_coordinator;
pub mod collector;
pub mod errors;
pub mod orphaned_blob_collector;
#[cfg(test)]
pub mod test_utils;

pub use abandoned_chunk_collector::{AbandonedChunkCollector, ABANDONED_CHUNK_COLLECTOR};
pub use batch_processor::{BatchConfig, BatchItemResult, BatchProcessor};
pub use blob_deletion_coordinator::{BlobDeletionAttempt, BlobDeletionCoordinator};
pub use collector::{CollectionResult, Collector};
pub use errors::{GcError, GcResult};
pub use orphaned_blob_collector::{OrphanedBlobCollector, ORPHANED_BLOB_COLLECTOR};
