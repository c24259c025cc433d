//! In-process adapters for single-node deployments and tests
//!
//! Same contracts as the Postgres adapters, with atomicity provided by
//! per-key `DashMap` entry locks.

mod blob_repository;
mod cache_store;
mod chunk_repository;
mod directory_tree;
mod lease_backend;
mod quota_repository;

pub use blob_repository::InMemoryBlobRepository;
pub use cache_store::InMemoryCacheStore;
pub use chunk_repository::InMemoryChunkRepository;
pub use directory_tree::InMemoryDirectoryTree;
pub use lease_backend::InMemoryLeaseBackend;
pub use quota_repository::InMemoryQuotaRepository;
