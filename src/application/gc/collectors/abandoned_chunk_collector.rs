use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::collector::{CollectionResult, Collector};
use super::errors::{GcError, GcResult};
use crate::application::ports::ChunkRepository;
use crate::application::services::ChunkAssembler;
use crate::application::ErrorKind;
use crate::domain::value_objects::ContentHash;

pub const ABANDONED_CHUNK_COLLECTOR: &str = "abandoned_chunk_collector";

/// Expires chunk sets that stopped receiving chunks
///
/// A set is abandoned once its newest chunk is older than the retention.
/// Expiry goes through the assembler's merge lease, so a merge in progress
/// is never undercut.
pub struct AbandonedChunkCollector {
    chunk_repo: Arc<dyn ChunkRepository>,
    assembler: Arc<ChunkAssembler>,
    retention: Duration,
    batch_size: i64,
}

#[async_trait]
impl Collector for AbandonedChunkCollector {
    fn name(&self) -> &'static str {
        ABANDONED_CHUNK_COLLECTOR
    }

    async fn collect(&self) -> GcResult<CollectionResult> {
        let retention = chrono::Duration::from_std(self.retention)
            .map_err(|e| GcError::config(format!("chunk retention out of range: {e}")))?;
        let cutoff = Utc::now() - retention;

        let mut result = CollectionResult::new(self.name());
        let mut passed: HashSet<ContentHash> = HashSet::new();

        loop {
            let limit = self.batch_size + passed.len() as i64;
            let candidates: Vec<ContentHash> = self
                .chunk_repo
                .find_stale(cutoff, limit)
                .await?
                .into_iter()
                .filter(|identifier| !passed.contains(identifier))
                .collect();

            if candidates.is_empty() {
                break;
            }

            for identifier in candidates {
                match self.assembler.expire(&identifier, cutoff).await {
                    Ok(true) => {
                        result.items_cleaned += 1;
                        continue;
                    }
                    Ok(false) => result.skipped += 1,
                    Err(e) if e.kind() == ErrorKind::ConcurrencyConflict => result.skipped += 1,
                    Err(e) => {
                        warn!(identifier = %identifier, error = %e, "Failed to expire chunk set");
                        result
                            .errors
                            .push(format!("Chunk set {}: failed: {}", identifier, e));
                    }
                }
                passed.insert(identifier);
            }
        }

        if result.has_cleaned_items() {
            info!(expired = result.items_cleaned, "Expired abandoned chunk sets");
        }
        Ok(result)
    }
}

impl AbandonedChunkCollector {
    pub fn new(
        chunk_repo: Arc<dyn ChunkRepository>,
        assembler: Arc<ChunkAssembler>,
        retention: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            chunk_repo,
            assembler,
            retention,
            batch_size: batch_size.max(1),
        }
    }
}
