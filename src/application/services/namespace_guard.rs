use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::application::errors::NamespaceError;
use crate::application::ports::{DirectoryListing, EntryKind};
use crate::application::services::{LeasePolicy, LockCoordinator};
use crate::domain::value_objects::{LockKey, OwnerId};

/// Subtree checks over the external folder tree
///
/// Traversals use an explicit stack, so tree depth never grows the call
/// stack. Already-visited folders are skipped in case the tree has a cycle.
pub struct NamespaceGuard {
    listing: Arc<dyn DirectoryListing>,
    locks: LockCoordinator,
    policy: LeasePolicy,
}

impl NamespaceGuard {
    pub fn new(
        listing: Arc<dyn DirectoryListing>,
        locks: LockCoordinator,
        policy: LeasePolicy,
    ) -> Self {
        Self {
            listing,
            locks,
            policy,
        }
    }

    /// Reject if any descendant of `folder_id` is a file
    pub async fn ensure_subtree_empty(
        &self,
        owner: OwnerId,
        folder_id: i64,
    ) -> Result<(), NamespaceError> {
        self.collect_folders(owner, folder_id).await.map(|_| ())
    }

    /// Remove an empty folder and all its (empty) subfolders, children first
    ///
    /// Runs under the folder's lease. Returns the number of folders removed,
    /// including `folder_id` itself.
    pub async fn delete_empty_subtree(
        &self,
        owner: OwnerId,
        folder_id: i64,
    ) -> Result<usize, NamespaceError> {
        let key = LockKey::folder(owner, folder_id);
        self.locks
            .with_lease(&key, &self.policy, || self.delete_locked(owner, folder_id))
            .await
    }

    async fn delete_locked(
        &self,
        owner: OwnerId,
        folder_id: i64,
    ) -> Result<usize, NamespaceError> {
        let preorder = self.collect_folders(owner, folder_id).await?;

        // Reverse pre-order visits every child before its parent
        for id in preorder.iter().rev() {
            self.listing.remove(owner, *id).await?;
        }

        debug!(owner = %owner, folder_id, removed = preorder.len(), "Folder subtree removed");
        Ok(preorder.len())
    }

    /// Folders of the subtree in pre-order, failing on the first file found
    async fn collect_folders(
        &self,
        owner: OwnerId,
        folder_id: i64,
    ) -> Result<Vec<i64>, NamespaceError> {
        let mut stack = vec![folder_id];
        let mut seen = HashSet::from([folder_id]);
        let mut preorder = Vec::new();

        while let Some(current) = stack.pop() {
            preorder.push(current);
            for entry in self.listing.children(owner, current).await? {
                match entry.kind {
                    EntryKind::File => {
                        return Err(NamespaceError::FolderNotEmpty {
                            folder_id,
                            file_id: entry.id,
                        })
                    }
                    EntryKind::Folder => {
                        if seen.insert(entry.id) {
                            stack.push(entry.id);
                        }
                    }
                }
            }
        }

        Ok(preorder)
    }
}
