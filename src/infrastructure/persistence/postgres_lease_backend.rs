use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

use crate::application::ports::{LeaseBackend, RepositoryError};
use crate::domain::value_objects::{LockKey, LockToken};

/// Lease backend on a single `leases` table
///
/// Acquire is an upsert that only overwrites an expired row, so the primary
/// key gives the same at-most-one-holder guarantee as a set-if-absent.
pub struct PostgresLeaseBackend {
    pool: PgPool,
}

impl PostgresLeaseBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseBackend for PostgresLeaseBackend {
    async fn try_set_if_absent(
        &self,
        key: &LockKey,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            INSERT INTO leases (lock_key, holder_token, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (lock_key) DO UPDATE
                SET holder_token = EXCLUDED.holder_token,
                    expires_at = EXCLUDED.expires_at
                WHERE leases.expires_at <= now()
            RETURNING lock_key
            "#,
        )
        .bind(key.as_str())
        .bind(token.as_str())
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn compare_and_delete(
        &self,
        key: &LockKey,
        token: &LockToken,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query_as::<_, (bool,)>(
            r#"
            DELETE FROM leases
            WHERE lock_key = $1 AND holder_token = $2
            RETURNING expires_at > now()
            "#,
        )
        .bind(key.as_str())
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(matches!(row, Some((true,))))
    }
}
