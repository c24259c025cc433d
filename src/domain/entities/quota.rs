use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::OwnerId;

/// Authoritative capacity row for one owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaRecord {
    pub owner: OwnerId,
    pub total_quota: u64,
    pub used_quota: u64,
    pub updated_at: DateTime<Utc>,
}

impl QuotaRecord {
    pub fn snapshot(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            total_quota: self.total_quota,
            used_quota: self.used_quota,
        }
    }
}

/// `(total, used)` pair as held in the shared cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub total_quota: u64,
    pub used_quota: u64,
}

impl QuotaSnapshot {
    /// `used + requested <= total`
    pub fn admits(&self, requested: u64) -> bool {
        self.used_quota
            .checked_add(requested)
            .is_some_and(|after| after <= self.total_quota)
    }

    pub fn remaining(&self) -> u64 {
        self.total_quota.saturating_sub(self.used_quota)
    }

    /// Apply a signed change to `used`, saturating at zero
    pub fn with_delta(self, delta: i64) -> Self {
        let used_quota = if delta >= 0 {
            self.used_quota.saturating_add(delta.unsigned_abs())
        } else {
            self.used_quota.saturating_sub(delta.unsigned_abs())
        };
        Self {
            total_quota: self.total_quota,
            used_quota,
        }
    }
}
