use std::future::Future;
use tracing::warn;

/// Concurrency bound for batch processing
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Items in flight at once
    pub concurrent_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrent_batch_size: 10,
        }
    }
}

impl BatchConfig {
    pub fn new(concurrent_batch_size: usize) -> Self {
        Self {
            concurrent_batch_size: concurrent_batch_size.max(1),
        }
    }
}

/// An item paired with what processing it produced
///
/// `result` is `Err` when the item's task panicked or was cancelled.
#[derive(Debug)]
pub struct BatchItemResult<T, R = ()> {
    pub item: T,
    pub result: Result<R, String>,
}

/// Runs an async processor over items, a bounded group at a time
///
/// Each item runs on its own task. A panicking item is logged and reported
/// as failed without affecting its neighbours; every item gets a result.
pub struct BatchProcessor;

impl BatchProcessor {
    pub async fn process_concurrent<F, Fut, T, R>(
        items: Vec<T>,
        config: &BatchConfig,
        processor: F,
    ) -> Vec<BatchItemResult<T, R>>
    where
        F: Fn(T) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = R> + Send + 'static,
        T: Send + Clone + 'static,
        R: Send + 'static,
    {
        let mut results = Vec::with_capacity(items.len());
        let group_size = config.concurrent_batch_size.max(1);

        for group in items.chunks(group_size) {
            let handles: Vec<_> = group
                .iter()
                .cloned()
                .map(|item| {
                    let processor = processor.clone();
                    tokio::spawn(async move { processor(item).await })
                })
                .collect();

            let joined = futures_util::future::join_all(handles).await;
            for (item, outcome) in group.iter().cloned().zip(joined) {
                let result = outcome.map_err(|e| {
                    warn!(error = %e, "Batch item task failed");
                    e.to_string()
                });
                results.push(BatchItemResult { item, result });
            }
        }

        results
    }
}
