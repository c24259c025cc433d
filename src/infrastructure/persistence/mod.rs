mod postgres_blob_repository;
mod postgres_cache_store;
mod postgres_chunk_repository;
mod postgres_lease_backend;
mod postgres_quota_repository;

pub use postgres_blob_repository::PostgresBlobRepository;
pub use postgres_cache_store::PostgresCacheStore;
pub use postgres_chunk_repository::PostgresChunkRepository;
pub use postgres_lease_backend::PostgresLeaseBackend;
pub use postgres_quota_repository::PostgresQuotaRepository;
