use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use sqlx::Row;
use std::env;

/// Check refcount, quota and chunk-staging invariants of a disk_engine database
#[derive(Parser)]
struct Cli {
    #[arg(long)]
    database_url: Option<String>,

    /// Repair what can be repaired safely
    #[arg(long)]
    fix: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let db_url = cli
        .database_url
        .or_else(|| env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set or passed with --database-url"))?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    // Blobs whose key is not a lowercase SHA-256 hex digest
    let invalid_hashes = sqlx::query(
        r#"SELECT content_hash, storage_path FROM blobs WHERE content_hash !~ '^[0-9a-f]{64}$'"#,
    )
    .fetch_all(&pool)
    .await?;

    println!("Invalid content_hash rows: {}", invalid_hashes.len());
    for r in invalid_hashes.iter() {
        let content_hash: String = r.get("content_hash");
        let storage_path: String = r.get("storage_path");
        println!("content_hash: {}, storage_path: {}", content_hash, storage_path);
    }

    // Blobs whose path does not live under their hash prefix
    let misplaced = sqlx::query(
        r#"SELECT content_hash, storage_path FROM blobs
           WHERE storage_path NOT LIKE 'blobs/' || substr(content_hash, 1, 2) || '/' || content_hash || '%'"#,
    )
    .fetch_all(&pool)
    .await?;

    println!("Misplaced blob rows: {}", misplaced.len());
    for r in misplaced.iter() {
        let content_hash: String = r.get("content_hash");
        let storage_path: String = r.get("storage_path");
        println!("content_hash: {}, storage_path: {}", content_hash, storage_path);
    }

    let pending: i64 = sqlx::query_scalar("SELECT count(*) FROM blobs WHERE ref_count = 0")
        .fetch_one(&pool)
        .await?;
    println!("Blobs awaiting the reaper: {}", pending);

    // Owners charged beyond capacity (possible through the advisory admission race)
    let over_quota = sqlx::query(
        r#"SELECT owner_id, total_quota, used_quota FROM user_quotas WHERE used_quota > total_quota"#,
    )
    .fetch_all(&pool)
    .await?;

    println!("Owners over quota: {}", over_quota.len());
    for r in over_quota.iter() {
        let owner_id: i64 = r.get("owner_id");
        let total: i64 = r.get("total_quota");
        let used: i64 = r.get("used_quota");
        println!("owner_id: {}, used: {} of {}", owner_id, used, total);
    }

    // Chunk rows left behind by a merge that already produced its blob
    let merged_leftovers = sqlx::query(
        r#"SELECT DISTINCT c.identifier FROM upload_chunks c
           JOIN blobs b ON b.content_hash = c.identifier"#,
    )
    .fetch_all(&pool)
    .await?;

    println!("Chunk sets already merged: {}", merged_leftovers.len());
    for r in merged_leftovers.iter() {
        let identifier: String = r.get("identifier");
        println!("identifier: {}", identifier);
        if cli.fix {
            sqlx::query("DELETE FROM upload_chunks WHERE identifier = $1")
                .bind(&identifier)
                .execute(&pool)
                .await?;
            println!("Fixed: removed chunk rows of {}", identifier);
        }
    }

    // Chunk sets whose submissions disagree on the declared totals
    let inconsistent = sqlx::query(
        r#"SELECT identifier FROM upload_chunks GROUP BY identifier
           HAVING count(DISTINCT total_chunks) > 1 OR count(DISTINCT total_size) > 1"#,
    )
    .fetch_all(&pool)
    .await?;

    println!("Chunk sets with inconsistent totals: {}", inconsistent.len());
    for r in inconsistent.iter() {
        let identifier: String = r.get("identifier");
        println!("identifier: {}", identifier);
    }

    let expired_leases: i64 =
        sqlx::query_scalar("SELECT count(*) FROM leases WHERE expires_at <= now()")
            .fetch_one(&pool)
            .await?;
    println!("Expired leases: {}", expired_leases);
    if cli.fix && expired_leases > 0 {
        let removed = sqlx::query("DELETE FROM leases WHERE expires_at <= now()")
            .execute(&pool)
            .await?
            .rows_affected();
        println!("Fixed: removed {} expired leases", removed);
    }

    Ok(())
}
