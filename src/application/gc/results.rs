//! Reports produced by reaper sweeps

/// Outcome of one reaper sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Zero-refcount blobs whose record (and file) were deleted
    pub blobs_removed: usize,
    /// Abandoned chunk sets that were expired
    pub chunk_sets_expired: usize,
    /// Candidates left for a later sweep: contended leases or revived blobs
    pub skipped: usize,
    /// One entry per failed item or collector
    pub errors: Vec<String>,
}

impl SweepReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no item or collector failed
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_deletions(&self) -> bool {
        self.blobs_removed > 0 || self.chunk_sets_expired > 0
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn merge(&mut self, other: SweepReport) {
        self.blobs_removed += other.blobs_removed;
        self.chunk_sets_expired += other.chunk_sets_expired;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }

    pub fn summary(&self) -> String {
        let base = format!(
            "{} blobs removed, {} chunk sets expired, {} skipped",
            self.blobs_removed, self.chunk_sets_expired, self.skipped
        );
        if self.errors.is_empty() {
            format!("Sweep completed: {}", base)
        } else {
            format!("Sweep completed with {} errors: {}", self.errors.len(), base)
        }
    }
}

/// Running totals across sweeps of one reaper
#[derive(Debug, Clone, Default)]
pub struct ReaperStatistics {
    pub sweeps_completed: usize,
    pub total_blobs_removed: usize,
    pub total_chunk_sets_expired: usize,
    pub total_errors: usize,
}

impl ReaperStatistics {
    pub fn update(&mut self, report: &SweepReport) {
        self.sweeps_completed += 1;
        self.total_blobs_removed += report.blobs_removed;
        self.total_chunk_sets_expired += report.chunk_sets_expired;
        self.total_errors += report.errors.len();
    }

    pub fn average_removed_per_sweep(&self) -> f64 {
        if self.sweeps_completed == 0 {
            return 0.0;
        }
        self.total_blobs_removed as f64 / self.sweeps_completed as f64
    }
}
