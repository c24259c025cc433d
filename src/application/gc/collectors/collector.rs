use super::errors::GcResult;

/// One kind of garbage the reaper knows how to remove
///
/// Implementations must be idempotent: a collector interrupted half way
/// leaves state the next run can finish.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    /// Stable snake_case name used in logs and reports
    fn name(&self) -> &'static str;

    /// Run one collection pass
    ///
    /// Returns `Err` only if candidates could not be listed at all.
    async fn collect(&self) -> GcResult<CollectionResult>;
}

/// Outcome of a single collector run
#[derive(Debug, Clone, Default)]
pub struct CollectionResult {
    pub collector_name: String,
    pub items_cleaned: usize,
    /// Candidates left alone this time (lease contended, revived, gone)
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl CollectionResult {
    pub fn new(collector_name: impl Into<String>) -> Self {
        Self {
            collector_name: collector_name.into(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_cleaned_items(&self) -> bool {
        self.items_cleaned > 0
    }
}
