use async_trait::async_trait;
#[cfg(test)]
use mockall::{automock, predicate::*};
use std::time::Duration;

use crate::domain::value_objects::{LockKey, LockToken};

use super::RepositoryError;

/// The two atomic primitives a distributed lock needs
///
/// Any key-value backend that can do both atomically can back the lock
/// coordinator.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LeaseBackend: Send + Sync {
    /// Store `token` under `key` with expiry `ttl`, only if no unexpired
    /// value is present. Returns whether the value was stored.
    async fn try_set_if_absent(
        &self,
        key: &LockKey,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, RepositoryError>;

    /// Delete `key` only if it currently holds `token`. Returns whether a
    /// live value was deleted.
    async fn compare_and_delete(
        &self,
        key: &LockKey,
        token: &LockToken,
    ) -> Result<bool, RepositoryError>;
}
