use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::application::ports::{QuotaRepository, RepositoryError};
use crate::domain::entities::QuotaRecord;
use crate::domain::value_objects::OwnerId;

#[derive(Debug, Default)]
pub struct InMemoryQuotaRepository {
    quotas: DashMap<OwnerId, QuotaRecord>,
}

impl InMemoryQuotaRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaRepository for InMemoryQuotaRepository {
    async fn find(&self, owner: OwnerId) -> Result<Option<QuotaRecord>, RepositoryError> {
        Ok(self.quotas.get(&owner).map(|q| q.value().clone()))
    }

    async fn insert_if_absent(
        &self,
        owner: OwnerId,
        total_quota: u64,
    ) -> Result<bool, RepositoryError> {
        match self.quotas.entry(owner) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(QuotaRecord {
                    owner,
                    total_quota,
                    used_quota: 0,
                    updated_at: Utc::now(),
                });
                Ok(true)
            }
        }
    }

    async fn increment_used(&self, owner: OwnerId, delta: u64) -> Result<bool, RepositoryError> {
        let Some(mut quota) = self.quotas.get_mut(&owner) else {
            return Ok(false);
        };
        quota.used_quota = quota.used_quota.checked_add(delta).ok_or_else(|| {
            RepositoryError::ConstraintViolation(format!("used quota of {} overflows", owner))
        })?;
        quota.updated_at = Utc::now();
        Ok(true)
    }

    async fn decrement_used(&self, owner: OwnerId, delta: u64) -> Result<bool, RepositoryError> {
        let Some(mut quota) = self.quotas.get_mut(&owner) else {
            return Ok(false);
        };
        quota.used_quota = quota.used_quota.saturating_sub(delta);
        quota.updated_at = Utc::now();
        Ok(true)
    }
}
