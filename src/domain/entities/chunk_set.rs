use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::errors::DomainError;
use crate::domain::value_objects::{ContentHash, OwnerId, StoragePath, UploadState};

/// One staged chunk as persisted by the chunk repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub identifier: ContentHash,
    pub owner: OwnerId,
    pub chunk_number: u32,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub total_size: u64,
    pub storage_path: StoragePath,
    pub created_at: DateTime<Utc>,
}

/// In-progress state of a resumable upload, rebuilt from its chunk records
#[derive(Debug, Clone)]
pub struct ChunkSet {
    identifier: ContentHash,
    owner: OwnerId,
    total_chunks: u32,
    total_size: u64,
    chunks: BTreeMap<u32, ChunkRecord>,
}

impl ChunkSet {
    /// Validate a submission's chunk number against its declared totals
    pub fn validate_submission(
        chunk_number: u32,
        total_chunks: u32,
        total_size: u64,
        chunk_size: u64,
    ) -> Result<(), DomainError> {
        if total_chunks == 0 {
            return Err(DomainError::NoChunksDeclared);
        }
        if chunk_number == 0 || chunk_number > total_chunks {
            return Err(DomainError::ChunkOutOfRange {
                chunk_number,
                total_chunks,
            });
        }
        if chunk_size > total_size {
            return Err(DomainError::SizeMismatch(format!(
                "chunk of {} bytes exceeds declared total of {} bytes",
                chunk_size, total_size
            )));
        }
        Ok(())
    }

    /// Rebuild from persisted records; `None` when nothing has been staged yet
    pub fn from_records(records: Vec<ChunkRecord>) -> Result<Option<Self>, DomainError> {
        let mut iter = records.into_iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };

        let mut set = Self {
            identifier: first.identifier.clone(),
            owner: first.owner,
            total_chunks: first.total_chunks,
            total_size: first.total_size,
            chunks: BTreeMap::new(),
        };
        set.chunks.insert(first.chunk_number, first);

        for record in iter {
            if record.identifier != set.identifier {
                return Err(DomainError::SizeMismatch(format!(
                    "chunk record for {} mixed into chunk set {}",
                    record.identifier, set.identifier
                )));
            }
            set.check_declared(record.total_chunks, record.total_size)?;
            set.chunks.insert(record.chunk_number, record);
        }

        Ok(Some(set))
    }

    /// Later submissions must agree with the totals the set was opened with
    pub fn check_declared(&self, total_chunks: u32, total_size: u64) -> Result<(), DomainError> {
        if total_chunks != self.total_chunks || total_size != self.total_size {
            return Err(DomainError::SizeMismatch(format!(
                "upload {} declared {} chunks / {} bytes, submission declares {} chunks / {} bytes",
                self.identifier, self.total_chunks, self.total_size, total_chunks, total_size
            )));
        }
        Ok(())
    }

    pub fn has_chunk(&self, chunk_number: u32) -> bool {
        self.chunks.contains_key(&chunk_number)
    }

    pub fn received(&self) -> BTreeSet<u32> {
        self.chunks.keys().copied().collect()
    }

    pub fn missing(&self) -> Vec<u32> {
        (1..=self.total_chunks)
            .filter(|n| !self.chunks.contains_key(n))
            .collect()
    }

    /// Received set equals exactly {1..=total_chunks}
    pub fn is_complete(&self) -> bool {
        self.chunks.len() == self.total_chunks as usize
            && self.chunks.keys().copied().eq(1..=self.total_chunks)
    }

    pub fn state(&self) -> UploadState {
        if self.is_complete() {
            UploadState::Complete
        } else {
            UploadState::Collecting
        }
    }

    pub fn staged_size(&self) -> u64 {
        self.chunks.values().map(|c| c.chunk_size).sum()
    }

    /// Chunks in ascending chunk-number order
    pub fn ordered_chunks(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.chunks.values()
    }

    pub fn identifier(&self) -> &ContentHash {
        &self.identifier
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identifier() -> ContentHash {
        ContentHash::from_hex("e".repeat(64)).unwrap()
    }

    fn record(chunk_number: u32, total_chunks: u32) -> ChunkRecord {
        ChunkRecord {
            identifier: identifier(),
            owner: OwnerId::new(1).unwrap(),
            chunk_number,
            chunk_size: 10,
            total_chunks,
            total_size: 10 * total_chunks as u64,
            storage_path: StoragePath::new(format!("chunks/x/{}", chunk_number)).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_submission_bounds() {
        assert!(ChunkSet::validate_submission(1, 3, 30, 10).is_ok());
        assert!(ChunkSet::validate_submission(3, 3, 30, 10).is_ok());
        assert!(matches!(
            ChunkSet::validate_submission(0, 3, 30, 10),
            Err(DomainError::ChunkOutOfRange { .. })
        ));
        assert!(matches!(
            ChunkSet::validate_submission(4, 3, 30, 10),
            Err(DomainError::ChunkOutOfRange { .. })
        ));
        assert!(matches!(
            ChunkSet::validate_submission(1, 0, 30, 10),
            Err(DomainError::NoChunksDeclared)
        ));
        assert!(matches!(
            ChunkSet::validate_submission(1, 3, 5, 10),
            Err(DomainError::SizeMismatch(_))
        ));
    }

    #[test]
    fn test_empty_records_yield_no_set() {
        assert!(ChunkSet::from_records(vec![]).unwrap().is_none());
    }

    #[test]
    fn test_incomplete_set_reports_missing() {
        let set = ChunkSet::from_records(vec![record(1, 3), record(3, 3)])
            .unwrap()
            .unwrap();
        assert!(!set.is_complete());
        assert_eq!(set.state(), UploadState::Collecting);
        assert_eq!(set.missing(), vec![2]);
        assert_eq!(set.received().into_iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_complete_set_orders_chunks() {
        let set = ChunkSet::from_records(vec![record(2, 2), record(1, 2)])
            .unwrap()
            .unwrap();
        assert!(set.is_complete());
        assert_eq!(set.state(), UploadState::Complete);
        let order: Vec<u32> = set.ordered_chunks().map(|c| c.chunk_number).collect();
        assert_eq!(order, vec![1, 2]);
        assert_eq!(set.staged_size(), 20);
    }

    #[test]
    fn test_conflicting_totals_rejected() {
        let mut other = record(2, 4);
        other.total_size = 40;
        let err = ChunkSet::from_records(vec![record(1, 3), other]).unwrap_err();
        assert!(matches!(err, DomainError::SizeMismatch(_)));
    }
}
