use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::application::{
    gc::OrphanReaper,
    ports::{
        BlobRepository, CacheStore, ChunkRepository, DirectoryListing, LeaseBackend, ObjectStore,
        QuotaRepository,
    },
    services::{BlobStore, ChunkAssembler, LockCoordinator, NamespaceGuard, QuotaLedger},
    use_cases::UploadContentUseCase,
};
use crate::config::{Config, MetadataBackend};
use crate::infrastructure::{
    memory::{
        InMemoryBlobRepository, InMemoryCacheStore, InMemoryChunkRepository,
        InMemoryLeaseBackend, InMemoryQuotaRepository,
    },
    persistence::{
        PostgresBlobRepository, PostgresCacheStore, PostgresChunkRepository,
        PostgresLeaseBackend, PostgresQuotaRepository,
    },
    storage::LocalFilesystemStore,
};

type BuildResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Fully wired storage engine
pub struct Engine {
    pub config: Config,
    pub pool: Option<PgPool>,
    pub locks: LockCoordinator,
    pub blob_store: Arc<BlobStore>,
    pub chunk_assembler: Arc<ChunkAssembler>,
    pub quota_ledger: Arc<QuotaLedger>,
    pub upload: Arc<UploadContentUseCase>,
    pub reaper: Arc<OrphanReaper>,
    /// Only present when a directory listing was supplied
    pub namespace_guard: Option<NamespaceGuard>,
}

/// Backends the services are built on
struct Adapters {
    objects: Arc<dyn ObjectStore>,
    leases: Arc<dyn LeaseBackend>,
    cache: Arc<dyn CacheStore>,
    blobs: Arc<dyn BlobRepository>,
    chunks: Arc<dyn ChunkRepository>,
    quotas: Arc<dyn QuotaRepository>,
}

/// Composition root: connects backends and injects them into the services
pub struct ApplicationBuilder {
    config: Config,
    pool: Option<PgPool>,
    adapters: Option<Adapters>,
    listing: Option<Arc<dyn DirectoryListing>>,
}

impl ApplicationBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            pool: None,
            adapters: None,
            listing: None,
        }
    }

    /// Connect the Postgres pool with retry; no-op for the memory backend
    pub async fn with_database(mut self) -> BuildResult<Self> {
        if self.config.metadata_backend == MetadataBackend::Memory {
            return Ok(self);
        }

        info!("Connecting to database");

        let mut retries = 3;
        let mut delay = Duration::from_secs(1);
        let pool = loop {
            match PgPoolOptions::new()
                .max_connections(self.config.db_max_connections)
                .min_connections(self.config.db_min_connections)
                .acquire_timeout(Duration::from_secs(self.config.db_acquire_timeout_secs))
                .idle_timeout(Some(Duration::from_secs(self.config.db_idle_timeout_secs)))
                .max_lifetime(Some(Duration::from_secs(self.config.db_max_lifetime_secs)))
                .connect(&self.config.database_url)
                .await
            {
                Ok(pool) => break pool,
                Err(e) if retries > 0 => {
                    retries -= 1;
                    tracing::warn!(
                        "Database connection failed, retrying in {:?} ({} retries left): {}",
                        delay,
                        retries,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    tracing::error!("Failed to connect to database after retries: {}", e);
                    return Err(Box::new(e));
                }
            }
        };

        info!(
            max = self.config.db_max_connections,
            min = self.config.db_min_connections,
            "Database pool configured"
        );

        self.pool = Some(pool);
        Ok(self)
    }

    /// Apply pending migrations to the connected database
    pub async fn run_migrations(&self) -> BuildResult<()> {
        let pool = self.pool.as_ref().ok_or("Database pool not initialized")?;
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
            tracing::error!("Failed to run migrations: {}", e);
            e
        })?;
        Ok(())
    }

    /// Prepare the storage tree and the metadata adapters
    pub async fn with_infrastructure(mut self) -> BuildResult<Self> {
        let objects = Arc::new(LocalFilesystemStore::with_durability(
            self.config.storage_root.clone(),
            self.config.durable_writes,
        ));
        objects.init().await?;
        let objects: Arc<dyn ObjectStore> = objects;

        let adapters = match self.config.metadata_backend {
            MetadataBackend::Postgres => {
                let pool = self.pool.as_ref().ok_or("Database pool not initialized")?;
                Adapters {
                    objects,
                    leases: Arc::new(PostgresLeaseBackend::new(pool.clone())),
                    cache: Arc::new(PostgresCacheStore::new(pool.clone())),
                    blobs: Arc::new(PostgresBlobRepository::new(pool.clone())),
                    chunks: Arc::new(PostgresChunkRepository::new(pool.clone())),
                    quotas: Arc::new(PostgresQuotaRepository::new(pool.clone())),
                }
            }
            MetadataBackend::Memory => {
                tracing::warn!("Using in-memory metadata; state is lost on exit");
                Adapters {
                    objects,
                    leases: Arc::new(InMemoryLeaseBackend::new()),
                    cache: Arc::new(InMemoryCacheStore::new()),
                    blobs: Arc::new(InMemoryBlobRepository::new()),
                    chunks: Arc::new(InMemoryChunkRepository::new()),
                    quotas: Arc::new(InMemoryQuotaRepository::new()),
                }
            }
        };

        self.adapters = Some(adapters);
        info!(root = %self.config.storage_root.display(), "Infrastructure layer initialized");
        Ok(self)
    }

    /// Enable folder-subtree checks over an external directory tree
    pub fn with_directory_listing(mut self, listing: Arc<dyn DirectoryListing>) -> Self {
        self.listing = Some(listing);
        self
    }

    pub fn build(self) -> BuildResult<Engine> {
        let adapters = self
            .adapters
            .ok_or("Infrastructure not initialized")?;
        let config = self.config;

        let locks = LockCoordinator::new(adapters.leases);

        let blob_store = Arc::new(BlobStore::new(
            Arc::clone(&adapters.blobs),
            Arc::clone(&adapters.objects),
            locks.clone(),
            config.blob_store_config(),
        ));
        let chunk_assembler = Arc::new(ChunkAssembler::new(
            Arc::clone(&adapters.chunks),
            adapters.objects,
            Arc::clone(&blob_store),
            locks.clone(),
            config.chunk_assembler_config(),
        ));
        let quota_ledger = Arc::new(QuotaLedger::new(
            adapters.quotas,
            adapters.cache,
            locks.clone(),
            config.quota_ledger_config(),
        ));

        let upload = Arc::new(UploadContentUseCase::new(
            Arc::clone(&blob_store),
            Arc::clone(&chunk_assembler),
            Arc::clone(&quota_ledger),
        ));

        let reaper = Arc::new(
            OrphanReaper::new(adapters.blobs, Arc::clone(&blob_store), config.reaper_config())
                .with_chunk_expiry(adapters.chunks, Arc::clone(&chunk_assembler)),
        );

        let namespace_guard = self
            .listing
            .map(|listing| NamespaceGuard::new(listing, locks.clone(), config.blocking_lease()));

        info!("Application layer initialized");

        Ok(Engine {
            config,
            pool: self.pool,
            locks,
            blob_store,
            chunk_assembler,
            quota_ledger,
            upload,
            reaper,
            namespace_guard,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
