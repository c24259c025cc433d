use std::time::Duration;

/// Configuration of the orphan reaper
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How often `run` starts a sweep
    pub interval: Duration,
    /// Page size when querying zero-refcount blobs and stale chunk sets
    pub batch_size: i64,
    /// Blobs purged concurrently within one page
    pub concurrency: usize,
    /// Chunk sets idle longer than this are expired; `None` keeps them forever
    pub chunk_retention: Option<Duration>,
    /// Abandoned-chunk collection runs once every this many sweeps
    pub chunk_sweep_multiplier: u32,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            batch_size: 100,
            concurrency: 10,
            chunk_retention: None,
            chunk_sweep_multiplier: 6,
        }
    }
}

impl ReaperConfig {
    pub fn new(interval: Duration, batch_size: i64) -> Self {
        Self {
            interval,
            batch_size,
            ..Self::default()
        }
    }

    pub fn with_chunk_retention(mut self, retention: Duration) -> Self {
        self.chunk_retention = Some(retention);
        self
    }

    /// Interval between abandoned-chunk collections
    pub fn chunk_sweep_interval(&self) -> Duration {
        self.interval * self.chunk_sweep_multiplier
    }
}
