use async_trait::async_trait;
#[cfg(test)]
use mockall::{automock, predicate::*};

use crate::domain::value_objects::OwnerId;

use super::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

/// A directory entry of the file tree owned by the application layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub id: i64,
    pub kind: EntryKind,
}

/// Narrow view over the externally owned file tree
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DirectoryListing: Send + Sync {
    /// Live (non-recycled) children of `folder_id`
    async fn children(&self, owner: OwnerId, folder_id: i64)
        -> Result<Vec<DirEntry>, RepositoryError>;

    /// Remove one entry
    async fn remove(&self, owner: OwnerId, id: i64) -> Result<(), RepositoryError>;
}
