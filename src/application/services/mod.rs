mod blob_store;
mod chunk_assembler;
mod lock_coordinator;
mod namespace_guard;
mod quota_ledger;

pub use blob_store::{BlobLocation, BlobRef, BlobStore, BlobStoreConfig, PurgeOutcome};
pub use chunk_assembler::{ChunkAssembler, ChunkAssemblerConfig, ChunkReceipt, UploadProgress};
pub use lock_coordinator::{LeasePolicy, LockCoordinator};
pub use namespace_guard::NamespaceGuard;
pub use quota_ledger::{Admission, QuotaLedger, QuotaLedgerConfig};
