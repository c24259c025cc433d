use async_trait::async_trait;
use sqlx::PgPool;

use crate::application::ports::{BlobRepository, RepositoryError};
use crate::domain::entities::Blob;
use crate::domain::value_objects::{ContentHash, StoragePath};

pub struct PostgresBlobRepository {
    pool: PgPool,
}

impl PostgresBlobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlobRepository for PostgresBlobRepository {
    async fn find(&self, content_hash: &ContentHash) -> Result<Option<Blob>, RepositoryError> {
        let row = sqlx::query_as::<_, BlobRow>(
            r#"
            SELECT content_hash, storage_path, size_bytes, ref_count, created_at, updated_at
            FROM blobs
            WHERE content_hash = $1
            "#,
        )
        .bind(content_hash.as_hex())
        .fetch_optional(&self.pool)
        .await?;

        row.map(BlobRow::into_domain).transpose()
    }

    async fn insert_if_absent(&self, blob: &Blob) -> Result<bool, RepositoryError> {
        let size = i64::try_from(blob.size_bytes())
            .map_err(|_| RepositoryError::ConstraintViolation("size_bytes overflows".into()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO blobs (content_hash, storage_path, size_bytes, ref_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (content_hash) DO NOTHING
            "#,
        )
        .bind(blob.content_hash().as_hex())
        .bind(blob.storage_path().as_str())
        .bind(size)
        .bind(blob.ref_count())
        .bind(blob.created_at())
        .bind(blob.updated_at())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment_ref(
        &self,
        content_hash: &ContentHash,
    ) -> Result<Option<i64>, RepositoryError> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            UPDATE blobs
            SET ref_count = ref_count + 1, updated_at = now()
            WHERE content_hash = $1
            RETURNING ref_count
            "#,
        )
        .bind(content_hash.as_hex())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.0))
    }

    async fn decrement_ref(
        &self,
        content_hash: &ContentHash,
    ) -> Result<Option<i64>, RepositoryError> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            UPDATE blobs
            SET ref_count = GREATEST(ref_count - 1, 0), updated_at = now()
            WHERE content_hash = $1
            RETURNING ref_count
            "#,
        )
        .bind(content_hash.as_hex())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.0))
    }

    async fn find_orphaned(&self, limit: i64) -> Result<Vec<Blob>, RepositoryError> {
        let rows = sqlx::query_as::<_, BlobRow>(
            r#"
            SELECT content_hash, storage_path, size_bytes, ref_count, created_at, updated_at
            FROM blobs
            WHERE ref_count = 0
            ORDER BY updated_at
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BlobRow::into_domain).collect()
    }

    async fn delete_if_orphaned(
        &self,
        content_hash: &ContentHash,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM blobs WHERE content_hash = $1 AND ref_count = 0")
            .bind(content_hash.as_hex())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[derive(sqlx::FromRow)]
struct BlobRow {
    content_hash: String,
    storage_path: String,
    size_bytes: i64,
    ref_count: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl BlobRow {
    fn into_domain(self) -> Result<Blob, RepositoryError> {
        let content_hash = ContentHash::from_hex(self.content_hash)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;
        let storage_path = StoragePath::new(self.storage_path)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        Ok(Blob::reconstruct(
            content_hash,
            storage_path,
            self.size_bytes.max(0) as u64,
            self.ref_count,
            self.created_at,
            self.updated_at,
        ))
    }
}
