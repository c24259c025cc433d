use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::application::ports::{LeaseBackend, RepositoryError};
use crate::domain::value_objects::{LockKey, LockToken};

/// Process-local lease table
///
/// Only provides mutual exclusion between tasks of one process. Expired
/// entries are replaced lazily on the next acquire.
#[derive(Debug, Default)]
pub struct InMemoryLeaseBackend {
    leases: DashMap<String, (String, Instant)>,
}

impl InMemoryLeaseBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with an unexpired holder
    pub fn live_leases(&self) -> usize {
        let now = Instant::now();
        self.leases.iter().filter(|e| e.value().1 > now).count()
    }
}

#[async_trait]
impl LeaseBackend for InMemoryLeaseBackend {
    async fn try_set_if_absent(
        &self,
        key: &LockKey,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, RepositoryError> {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            RepositoryError::ConstraintViolation(format!("lease ttl too large: {:?}", ttl))
        })?;

        match self.leases.entry(key.as_str().to_string()) {
            Entry::Occupied(mut held) => {
                if held.get().1 > now {
                    return Ok(false);
                }
                held.insert((token.as_str().to_string(), expires_at));
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert((token.as_str().to_string(), expires_at));
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(
        &self,
        key: &LockKey,
        token: &LockToken,
    ) -> Result<bool, RepositoryError> {
        let removed = self
            .leases
            .remove_if(key.as_str(), |_, (holder, _)| holder == token.as_str());

        Ok(matches!(removed, Some((_, (_, expires_at))) if expires_at > Instant::now()))
    }
}
