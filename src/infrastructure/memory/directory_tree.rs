use async_trait::async_trait;
use dashmap::DashMap;

use crate::application::ports::{DirEntry, DirectoryListing, EntryKind, RepositoryError};
use crate::domain::value_objects::OwnerId;

/// Minimal in-process file tree: `(owner, id) -> (parent, kind)`
#[derive(Debug, Default)]
pub struct InMemoryDirectoryTree {
    entries: DashMap<(OwnerId, i64), (i64, EntryKind)>,
}

impl InMemoryDirectoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, owner: OwnerId, id: i64, parent: i64, kind: EntryKind) {
        self.entries.insert((owner, id), (parent, kind));
    }

    pub fn contains(&self, owner: OwnerId, id: i64) -> bool {
        self.entries.contains_key(&(owner, id))
    }
}

#[async_trait]
impl DirectoryListing for InMemoryDirectoryTree {
    async fn children(
        &self,
        owner: OwnerId,
        folder_id: i64,
    ) -> Result<Vec<DirEntry>, RepositoryError> {
        let mut children: Vec<DirEntry> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == owner && e.value().0 == folder_id)
            .map(|e| DirEntry {
                id: e.key().1,
                kind: e.value().1,
            })
            .collect();
        children.sort_by_key(|c| c.id);
        Ok(children)
    }

    async fn remove(&self, owner: OwnerId, id: i64) -> Result<(), RepositoryError> {
        self.entries.remove(&(owner, id));
        Ok(())
    }
}
