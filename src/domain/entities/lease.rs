use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::domain::value_objects::{LockKey, LockToken};

/// A granted, time-bounded hold on a lock key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    key: LockKey,
    token: LockToken,
    expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn new(key: LockKey, token: LockToken, duration: Duration) -> Self {
        let duration = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now()
            .checked_add_signed(duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            key,
            token,
            expires_at,
        }
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Local estimate of expiry; the backend's clock is authoritative
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_expiry_estimate() {
        let key = LockKey::new("test").unwrap();
        let live = Lease::new(key.clone(), LockToken::generate(), Duration::from_secs(30));
        assert!(!live.is_expired());

        let dead = Lease::new(key, LockToken::generate(), Duration::ZERO);
        assert!(dead.is_expired());
    }
}
