use async_trait::async_trait;
use sqlx::PgPool;

use crate::application::ports::{QuotaRepository, RepositoryError};
use crate::domain::entities::QuotaRecord;
use crate::domain::value_objects::OwnerId;

pub struct PostgresQuotaRepository {
    pool: PgPool,
}

impl PostgresQuotaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_i64(value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::ConstraintViolation("quota value overflows".into()))
}

#[async_trait]
impl QuotaRepository for PostgresQuotaRepository {
    async fn find(&self, owner: OwnerId) -> Result<Option<QuotaRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, (i64, i64, chrono::DateTime<chrono::Utc>)>(
            r#"
            SELECT total_quota, used_quota, updated_at
            FROM user_quotas
            WHERE owner_id = $1
            "#,
        )
        .bind(owner.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(total, used, updated_at)| QuotaRecord {
            owner,
            total_quota: total.max(0) as u64,
            used_quota: used.max(0) as u64,
            updated_at,
        }))
    }

    async fn insert_if_absent(
        &self,
        owner: OwnerId,
        total_quota: u64,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_quotas (owner_id, total_quota, used_quota, updated_at)
            VALUES ($1, $2, 0, now())
            ON CONFLICT (owner_id) DO NOTHING
            "#,
        )
        .bind(owner.as_i64())
        .bind(to_i64(total_quota)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment_used(&self, owner: OwnerId, delta: u64) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE user_quotas
            SET used_quota = used_quota + $2, updated_at = now()
            WHERE owner_id = $1
            "#,
        )
        .bind(owner.as_i64())
        .bind(to_i64(delta)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn decrement_used(&self, owner: OwnerId, delta: u64) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE user_quotas
            SET used_quota = GREATEST(used_quota - $2, 0), updated_at = now()
            WHERE owner_id = $1
            "#,
        )
        .bind(owner.as_i64())
        .bind(to_i64(delta)?)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
