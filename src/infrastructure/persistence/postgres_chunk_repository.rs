use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::application::ports::{ChunkRepository, RepositoryError};
use crate::domain::entities::ChunkRecord;
use crate::domain::value_objects::{ContentHash, OwnerId, StoragePath};

pub struct PostgresChunkRepository {
    pool: PgPool,
}

impl PostgresChunkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_i64(value: u64, field: &str) -> Result<i64, RepositoryError> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::ConstraintViolation(format!("{} overflows", field)))
}

#[async_trait]
impl ChunkRepository for PostgresChunkRepository {
    async fn find_chunks(
        &self,
        identifier: &ContentHash,
    ) -> Result<Vec<ChunkRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, ChunkRow>(
            r#"
            SELECT identifier, owner_id, chunk_number, chunk_size, total_chunks,
                   total_size, storage_path, created_at
            FROM upload_chunks
            WHERE identifier = $1
            ORDER BY chunk_number
            "#,
        )
        .bind(identifier.as_hex())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChunkRow::into_domain).collect()
    }

    async fn insert_if_absent(&self, record: &ChunkRecord) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO upload_chunks (identifier, owner_id, chunk_number, chunk_size,
                                       total_chunks, total_size, storage_path, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (identifier, chunk_number) DO NOTHING
            "#,
        )
        .bind(record.identifier.as_hex())
        .bind(record.owner.as_i64())
        .bind(record.chunk_number as i32)
        .bind(to_i64(record.chunk_size, "chunk_size")?)
        .bind(record.total_chunks as i32)
        .bind(to_i64(record.total_size, "total_size")?)
        .bind(record.storage_path.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_chunks(&self, identifier: &ContentHash) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM upload_chunks WHERE identifier = $1")
            .bind(identifier.as_hex())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_stale(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ContentHash>, RepositoryError> {
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT identifier
            FROM upload_chunks
            GROUP BY identifier
            HAVING max(created_at) < $1
            LIMIT $2
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(hex,)| {
                ContentHash::from_hex(hex)
                    .map_err(|e| RepositoryError::SerializationError(e.to_string()))
            })
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    identifier: String,
    owner_id: i64,
    chunk_number: i32,
    chunk_size: i64,
    total_chunks: i32,
    total_size: i64,
    storage_path: String,
    created_at: DateTime<Utc>,
}

impl ChunkRow {
    fn into_domain(self) -> Result<ChunkRecord, RepositoryError> {
        let bad = |e: crate::domain::errors::DomainError| {
            RepositoryError::SerializationError(e.to_string())
        };

        Ok(ChunkRecord {
            identifier: ContentHash::from_hex(self.identifier).map_err(bad)?,
            owner: OwnerId::new(self.owner_id).map_err(bad)?,
            chunk_number: self.chunk_number.max(0) as u32,
            chunk_size: self.chunk_size.max(0) as u64,
            total_chunks: self.total_chunks.max(0) as u32,
            total_size: self.total_size.max(0) as u64,
            storage_path: StoragePath::new(self.storage_path).map_err(bad)?,
            created_at: self.created_at,
        })
    }
}
