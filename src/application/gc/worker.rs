use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use crate::application::gc::collectors::{
    AbandonedChunkCollector, BatchConfig, BlobDeletionCoordinator, Collector,
    OrphanedBlobCollector, ABANDONED_CHUNK_COLLECTOR, ORPHANED_BLOB_COLLECTOR,
};
use crate::application::gc::config::ReaperConfig;
use crate::application::gc::results::{ReaperStatistics, SweepReport};
use crate::application::gc::scheduler::TaskScheduler;
use crate::application::ports::{BlobRepository, ChunkRepository};
use crate::application::services::{BlobStore, ChunkAssembler};

/// Scheduled removal of unreferenced blobs
///
/// Runs outside request traffic. A sweep pages through zero-refcount blobs
/// and purges each one under its own hash lease; no lease spans the sweep.
/// When a chunk retention is configured, abandoned chunk sets are expired
/// as well, at a lower cadence.
///
/// ```rust,ignore
/// let reaper = Arc::new(OrphanReaper::new(blob_repo, blob_store, ReaperConfig::default()));
///
/// let report = reaper.sweep().await;
/// println!("{}", report.summary());
///
/// // or keep sweeping on the configured interval
/// reaper.run().await;
/// ```
pub struct OrphanReaper {
    collectors: Vec<Box<dyn Collector>>,
    config: ReaperConfig,
    chunk_scheduler: Option<TaskScheduler>,
    statistics: Mutex<ReaperStatistics>,
}

impl OrphanReaper {
    /// Reaper for orphaned blobs only
    pub fn new(
        blob_repo: Arc<dyn BlobRepository>,
        blob_store: Arc<BlobStore>,
        config: ReaperConfig,
    ) -> Self {
        let coordinator =
            BlobDeletionCoordinator::new(blob_store, BatchConfig::new(config.concurrency));
        let orphaned = OrphanedBlobCollector::new(blob_repo, coordinator, config.batch_size);

        Self {
            collectors: vec![Box::new(orphaned)],
            config,
            chunk_scheduler: None,
            statistics: Mutex::new(ReaperStatistics::default()),
        }
    }

    /// Also expire abandoned chunk sets, if a retention is configured
    pub fn with_chunk_expiry(
        mut self,
        chunk_repo: Arc<dyn ChunkRepository>,
        assembler: Arc<ChunkAssembler>,
    ) -> Self {
        let Some(retention) = self.config.chunk_retention else {
            return self;
        };

        self.collectors.push(Box::new(AbandonedChunkCollector::new(
            chunk_repo,
            assembler,
            retention,
            self.config.batch_size,
        )));
        self.chunk_scheduler = Some(TaskScheduler::new(self.config.chunk_sweep_interval()));
        self
    }

    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    pub fn statistics(&self) -> ReaperStatistics {
        self.statistics.lock().clone()
    }

    /// Sweep forever on the configured interval
    pub async fn run(self: Arc<Self>) {
        info!(interval = ?self.config.interval, "Starting orphan reaper");

        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let report = self.sweep().await;
            if report.has_deletions() {
                info!("{}", report.summary());
            }
            for failure in &report.errors {
                error!(error = %failure, "Reaper error");
            }
        }
    }

    /// Run every due collector once
    ///
    /// Never fails as a whole: collector and per-item failures are recorded
    /// in the report.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::new();

        for collector in &self.collectors {
            let name = collector.name();
            if name == ABANDONED_CHUNK_COLLECTOR && !self.chunk_sweep_due() {
                continue;
            }

            match collector.collect().await {
                Ok(result) => {
                    match name {
                        ORPHANED_BLOB_COLLECTOR => report.blobs_removed += result.items_cleaned,
                        ABANDONED_CHUNK_COLLECTOR => {
                            report.chunk_sets_expired += result.items_cleaned
                        }
                        _ => {}
                    }
                    report.skipped += result.skipped;
                    report.errors.extend(result.errors);
                }
                Err(e) => report.add_error(format!("{} failed: {}", name, e)),
            }
        }

        self.statistics.lock().update(&report);
        report
    }

    fn chunk_sweep_due(&self) -> bool {
        self.chunk_scheduler
            .as_ref()
            .is_some_and(|scheduler| scheduler.should_run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::gc::collectors::test_utils::GcHarness;
    use crate::application::ports::{MockBlobRepository, RepositoryError};
    use std::time::Duration;

    fn reaper(h: &GcHarness, config: ReaperConfig) -> OrphanReaper {
        OrphanReaper::new(h.blobs.clone(), Arc::clone(&h.store), config)
            .with_chunk_expiry(h.chunks.clone(), Arc::clone(&h.assembler))
    }

    #[tokio::test]
    async fn test_sweep_with_nothing_orphaned() {
        let h = GcHarness::new().await;
        h.referenced(b"in use").await;

        let report = reaper(&h, ReaperConfig::default()).sweep().await;

        assert_eq!(report, SweepReport::default());
        assert_eq!(h.blobs.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_zero_refcount_blobs() {
        let h = GcHarness::new().await;
        let gone = h.orphan(b"drop me").await;
        let kept = h.referenced(b"keep me").await;

        let report = reaper(&h, ReaperConfig::default()).sweep().await;

        assert_eq!(report.blobs_removed, 1);
        assert!(report.is_success());
        assert!(!h.store.contains(&gone).await.unwrap());
        assert!(h.store.contains(&kept).await.unwrap());
    }

    #[tokio::test]
    async fn test_chunk_sets_untouched_without_retention() {
        let h = GcHarness::new().await;
        h.stage_partial(b"unfinished business").await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let report = reaper(&h, ReaperConfig::default()).sweep().await;

        assert_eq!(report.chunk_sets_expired, 0);
        assert_eq!(h.chunks.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_chunk_expiry_runs_at_lower_cadence() {
        let h = GcHarness::new().await;
        let config = ReaperConfig::new(Duration::from_secs(60), 10)
            .with_chunk_retention(Duration::ZERO);
        let reaper = reaper(&h, config);

        h.stage_partial(b"abandoned first").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let first = reaper.sweep().await;
        assert_eq!(first.chunk_sets_expired, 1);

        h.stage_partial(b"abandoned second").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = reaper.sweep().await;
        assert_eq!(second.chunk_sets_expired, 0);
        assert_eq!(h.chunks.upload_count(), 1);

        assert_eq!(reaper.statistics().sweeps_completed, 2);
        assert_eq!(reaper.statistics().total_chunk_sets_expired, 1);
    }

    #[tokio::test]
    async fn test_collector_failure_is_reported_not_raised() {
        let h = GcHarness::new().await;
        let mut repo = MockBlobRepository::new();
        repo.expect_find_orphaned()
            .returning(|_| Err(RepositoryError::Internal("db gone".into())));

        let reaper = OrphanReaper::new(Arc::new(repo), Arc::clone(&h.store), ReaperConfig::default());
        let report = reaper.sweep().await;

        assert!(!report.is_success());
        assert!(report.errors[0].contains("orphaned_blob_collector failed"));
        assert_eq!(reaper.statistics().total_errors, 1);
    }

    #[tokio::test]
    async fn test_run_sweeps_on_interval() {
        let h = GcHarness::new().await;
        let hash = h.orphan(b"reaped by the loop").await;
        let reaper = Arc::new(OrphanReaper::new(
            h.blobs.clone(),
            Arc::clone(&h.store),
            ReaperConfig::new(Duration::from_millis(20), 10),
        ));

        let _ = time::timeout(Duration::from_millis(100), Arc::clone(&reaper).run()).await;

        assert!(!h.store.contains(&hash).await.unwrap());
        assert!(reaper.statistics().sweeps_completed >= 2);
    }
}
