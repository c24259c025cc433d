mod blob_repository;
mod cache_store;
mod chunk_repository;
mod directory_listing;
mod lease_backend;
mod object_store;
mod quota_repository;
mod repository_error;

pub use blob_repository::BlobRepository;
pub use cache_store::CacheStore;
pub use chunk_repository::ChunkRepository;
pub use directory_listing::{DirEntry, DirectoryListing, EntryKind};
pub use lease_backend::LeaseBackend;
pub use object_store::{BlobReader, ObjectStore, StorageError, WrittenObject};
pub use quota_repository::QuotaRepository;
pub use repository_error::RepositoryError;

#[cfg(test)]
pub use blob_repository::MockBlobRepository;
#[cfg(test)]
pub use cache_store::MockCacheStore;
#[cfg(test)]
pub use chunk_repository::MockChunkRepository;
#[cfg(test)]
pub use directory_listing::MockDirectoryListing;
#[cfg(test)]
pub use lease_backend::MockLeaseBackend;
#[cfg(test)]
pub use object_store::MockObjectStore;
#[cfg(test)]
pub use quota_repository::MockQuotaRepository;
