use std::path::{Path, PathBuf};

use crate::domain::value_objects::StoragePath;

/// Utility for turning relative storage paths into filesystem paths
pub struct PathBuilder {
    root: PathBuf,
}

impl PathBuilder {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generate temp upload path: /root/temp/{uuid}
    pub fn temp_path(&self, id: uuid::Uuid) -> PathBuf {
        self.root.join("temp").join(id.to_string())
    }

    /// Absolute location of a relative storage path
    pub fn resolve(&self, path: &StoragePath) -> PathBuf {
        path.segments()
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }
}
