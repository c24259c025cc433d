use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::application::ports::{CacheStore, RepositoryError};

/// Process-local TTL cache
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: DashMap<String, (String, Instant)>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an entry without going through serialization; used to
    /// simulate a corrupted shared cache
    pub fn put_raw(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.value().1 > Instant::now())
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .filter(|e| e.value().1 > now)
            .map(|e| e.value().0.clone());

        if hit.is_none() {
            self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RepositoryError> {
        let expires_at = Instant::now().checked_add(ttl).ok_or_else(|| {
            RepositoryError::ConstraintViolation(format!("cache ttl too large: {:?}", ttl))
        })?;
        self.entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn evict(&self, key: &str) -> Result<(), RepositoryError> {
        self.entries.remove(key);
        Ok(())
    }
}
