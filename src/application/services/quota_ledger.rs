use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::errors::QuotaError;
use crate::application::ports::{CacheStore, QuotaRepository};
use crate::application::services::{LeasePolicy, LockCoordinator};
use crate::domain::entities::QuotaSnapshot;
use crate::domain::value_objects::{LockKey, OwnerId};

const CACHE_KEY_PREFIX: &str = "disk:cache:user:quota:";

#[derive(Debug, Clone)]
pub struct QuotaLedgerConfig {
    pub cache_ttl: Duration,
    /// Lease on `disk:lock:quota:{owner}` for strict admission
    pub exclusive_lease: LeasePolicy,
}

impl Default for QuotaLedgerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            exclusive_lease: LeasePolicy::blocking(
                Duration::from_secs(30),
                Duration::from_millis(100),
                50,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject { total: u64, used: u64, requested: u64 },
}

/// Per-owner capacity accounting with a cache-aside read path
///
/// The authoritative record is always written first; the cached copy is
/// patched afterwards and evicted whenever it cannot be parsed. Admission
/// through [`QuotaLedger::check`] reads the cache and may be stale, so two
/// concurrent admissions near the limit can both pass.
pub struct QuotaLedger {
    quotas: Arc<dyn QuotaRepository>,
    cache: Arc<dyn CacheStore>,
    locks: LockCoordinator,
    config: QuotaLedgerConfig,
}

fn cache_key(owner: OwnerId) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, owner)
}

impl QuotaLedger {
    pub fn new(
        quotas: Arc<dyn QuotaRepository>,
        cache: Arc<dyn CacheStore>,
        locks: LockCoordinator,
        config: QuotaLedgerConfig,
    ) -> Self {
        Self {
            quotas,
            cache,
            locks,
            config,
        }
    }

    /// Create the owner's record if it does not exist yet
    pub async fn provision(&self, owner: OwnerId, total_quota: u64) -> Result<bool, QuotaError> {
        let created = self.quotas.insert_if_absent(owner, total_quota).await?;
        if created {
            info!(owner = %owner, total_quota, "Quota provisioned");
        }
        Ok(created)
    }

    pub async fn snapshot(&self, owner: OwnerId) -> Result<QuotaSnapshot, QuotaError> {
        if let Some(cached) = self.read_cache(owner).await {
            return Ok(cached);
        }

        let snapshot = self.load_authoritative(owner).await?;
        self.write_cache(owner, snapshot).await;
        Ok(snapshot)
    }

    /// Advisory admission test against the cached view
    pub async fn check(&self, owner: OwnerId, requested: u64) -> Result<Admission, QuotaError> {
        let snapshot = self.snapshot(owner).await?;
        if snapshot.admits(requested) {
            Ok(Admission::Admit)
        } else {
            Ok(Admission::Reject {
                total: snapshot.total_quota,
                used: snapshot.used_quota,
                requested,
            })
        }
    }

    /// [`QuotaLedger::check`] with rejection as an error
    pub async fn admit(&self, owner: OwnerId, requested: u64) -> Result<(), QuotaError> {
        match self.check(owner, requested).await? {
            Admission::Admit => Ok(()),
            Admission::Reject {
                total,
                used,
                requested,
            } => Err(QuotaError::QuotaExceeded {
                owner,
                total,
                used,
                requested,
            }),
        }
    }

    /// Strict admit-and-charge under the owner's quota lease
    ///
    /// Reads the authority rather than the cache, so it cannot overcommit
    /// against other callers of this method.
    pub async fn admit_exclusive(
        &self,
        owner: OwnerId,
        requested: u64,
    ) -> Result<QuotaSnapshot, QuotaError> {
        let key = LockKey::quota(owner);
        self.locks
            .with_lease(&key, &self.config.exclusive_lease, || {
                self.admit_exclusive_locked(owner, requested)
            })
            .await
    }

    async fn admit_exclusive_locked(
        &self,
        owner: OwnerId,
        requested: u64,
    ) -> Result<QuotaSnapshot, QuotaError> {
        let snapshot = self.load_authoritative(owner).await?;
        if !snapshot.admits(requested) {
            return Err(QuotaError::QuotaExceeded {
                owner,
                total: snapshot.total_quota,
                used: snapshot.used_quota,
                requested,
            });
        }

        self.increment(owner, requested).await?;
        Ok(snapshot.with_delta(signed(requested)))
    }

    pub async fn increment(&self, owner: OwnerId, delta: u64) -> Result<(), QuotaError> {
        if !self.quotas.increment_used(owner, delta).await? {
            return Err(QuotaError::UnknownOwner(owner));
        }
        self.patch_cache(owner, signed(delta)).await;
        debug!(owner = %owner, delta, "Quota charged");
        Ok(())
    }

    /// Saturates at zero
    pub async fn decrement(&self, owner: OwnerId, delta: u64) -> Result<(), QuotaError> {
        if !self.quotas.decrement_used(owner, delta).await? {
            return Err(QuotaError::UnknownOwner(owner));
        }
        self.patch_cache(owner, -signed(delta)).await;
        debug!(owner = %owner, delta, "Quota credited");
        Ok(())
    }

    pub async fn evict_cache(&self, owner: OwnerId) -> Result<(), QuotaError> {
        self.cache.evict(&cache_key(owner)).await?;
        Ok(())
    }

    async fn load_authoritative(&self, owner: OwnerId) -> Result<QuotaSnapshot, QuotaError> {
        self.quotas
            .find(owner)
            .await?
            .map(|record| record.snapshot())
            .ok_or(QuotaError::UnknownOwner(owner))
    }

    /// `None` on miss, on backend failure and on an unparsable entry
    async fn read_cache(&self, owner: OwnerId) -> Option<QuotaSnapshot> {
        let key = cache_key(owner);
        let raw = match self.cache.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(owner = %owner, error = %e, "Quota cache unavailable, reading authority");
                return None;
            }
        };

        match serde_json::from_str::<QuotaSnapshot>(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                self.heal(&key, &e).await;
                None
            }
        }
    }

    async fn write_cache(&self, owner: OwnerId, snapshot: QuotaSnapshot) {
        let payload = match serde_json::to_string(&snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(owner = %owner, error = %e, "Failed to encode quota snapshot");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .set(&cache_key(owner), payload, self.config.cache_ttl)
            .await
        {
            warn!(owner = %owner, error = %e, "Failed to populate quota cache");
        }
    }

    /// Re-read the cached copy, apply `delta` and write it back
    ///
    /// A missing entry is left missing; the next read rebuilds it.
    async fn patch_cache(&self, owner: OwnerId, delta: i64) {
        if let Some(cached) = self.read_cache(owner).await {
            self.write_cache(owner, cached.with_delta(delta)).await;
        }
    }

    async fn heal(&self, key: &str, cause: &serde_json::Error) {
        warn!(key, error = %cause, "Corrupt quota cache entry, evicting");
        if let Err(e) = self.cache.evict(key).await {
            warn!(key, error = %e, "Failed to evict corrupt quota cache entry");
        }
    }
}

fn signed(delta: u64) -> i64 {
    i64::try_from(delta).unwrap_or(i64::MAX)
}
