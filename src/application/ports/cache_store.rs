use async_trait::async_trait;
#[cfg(test)]
use mockall::{automock, predicate::*};
use std::time::Duration;

use super::RepositoryError;

/// Port for a shared string cache with per-entry expiry
///
/// Never a source of truth: every reader must be able to rebuild an entry
/// from its authority.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RepositoryError>;

    async fn evict(&self, key: &str) -> Result<(), RepositoryError>;
}
