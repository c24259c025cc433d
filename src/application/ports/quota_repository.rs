use async_trait::async_trait;
#[cfg(test)]
use mockall::{automock, predicate::*};

use crate::domain::entities::QuotaRecord;
use crate::domain::value_objects::OwnerId;

use super::RepositoryError;

/// Port for the authoritative per-owner quota rows
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QuotaRepository: Send + Sync {
    async fn find(&self, owner: OwnerId) -> Result<Option<QuotaRecord>, RepositoryError>;

    /// Create the owner's row with `used = 0`; `Ok(false)` if it already exists
    async fn insert_if_absent(
        &self,
        owner: OwnerId,
        total_quota: u64,
    ) -> Result<bool, RepositoryError>;

    /// Atomic `used += delta`; `Ok(false)` if the owner is unknown
    async fn increment_used(&self, owner: OwnerId, delta: u64) -> Result<bool, RepositoryError>;

    /// Atomic `used = max(used - delta, 0)`; `Ok(false)` if the owner is unknown
    async fn decrement_used(&self, owner: OwnerId, delta: u64) -> Result<bool, RepositoryError>;
}
