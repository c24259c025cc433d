use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

use crate::application::ports::{CacheStore, RepositoryError};

/// Shared cache on an unlogged table; expired rows read as misses
pub struct PostgresCacheStore {
    pool: PgPool,
}

impl PostgresCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CacheStore for PostgresCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT payload FROM cache_entries WHERE cache_key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.0))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (cache_key, payload, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (cache_key) DO UPDATE
                SET payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn evict(&self, key: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cache_entries WHERE cache_key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
