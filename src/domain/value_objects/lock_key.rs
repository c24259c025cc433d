use serde::{Deserialize, Serialize};

use super::{ContentHash, OwnerId};
use crate::domain::errors::DomainError;

const LOCK_PREFIX: &str = "disk:lock:";
const MAX_KEY_LEN: usize = 512;

/// Namespaced key guarded by the lock coordinator
///
/// Keys for the same logical resource must be built through the same
/// constructor on every instance, otherwise two instances would serialize on
/// different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockKey(String);

impl LockKey {
    /// Arbitrary key under the `disk:lock:` namespace
    pub fn new(scope: impl AsRef<str>) -> Result<Self, DomainError> {
        let scope = scope.as_ref();
        if scope.is_empty() {
            return Err(DomainError::InvalidLockKey(
                "lock key cannot be empty".to_string(),
            ));
        }
        if scope.chars().any(|c| c.is_control()) {
            return Err(DomainError::InvalidLockKey(
                "lock key cannot contain control characters".to_string(),
            ));
        }
        let key = format!("{}{}", LOCK_PREFIX, scope);
        if key.len() > MAX_KEY_LEN {
            return Err(DomainError::InvalidLockKey(format!(
                "lock key longer than {} bytes",
                MAX_KEY_LEN
            )));
        }
        Ok(Self(key))
    }

    /// Serializes physical writes of one content hash
    pub fn upload(hash: &ContentHash) -> Self {
        Self(format!("{}upload:{}", LOCK_PREFIX, hash))
    }

    /// Serializes merges of one chunked upload
    pub fn merge(identifier: &ContentHash) -> Self {
        Self(format!("{}merge:{}", LOCK_PREFIX, identifier))
    }

    /// Name uniqueness of a folder inside `parent_id`
    pub fn folder_name(owner: OwnerId, parent_id: i64, name: &str) -> Result<Self, DomainError> {
        Self::new(format!("folder:{}:{}:{}", owner, parent_id, name))
    }

    /// Structural operations on an existing folder
    pub fn folder(owner: OwnerId, folder_id: i64) -> Self {
        Self(format!("{}folder:{}:{}", LOCK_PREFIX, owner, folder_id))
    }

    /// Name uniqueness of a file inside `parent_id`
    pub fn file_name(owner: OwnerId, parent_id: i64, name: &str) -> Result<Self, DomainError> {
        Self::new(format!("file:{}:{}:{}", owner, parent_id, name))
    }

    /// Structural operations on an existing file
    pub fn file(owner: OwnerId, file_id: i64) -> Self {
        Self(format!("{}file:{}:{}", LOCK_PREFIX, owner, file_id))
    }

    pub fn recycle(owner: OwnerId) -> Self {
        Self(format!("{}recycle:{}", LOCK_PREFIX, owner))
    }

    pub fn quota(owner: OwnerId) -> Self {
        Self(format!("{}quota:{}", LOCK_PREFIX, owner))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> OwnerId {
        OwnerId::new(1).unwrap()
    }

    #[test]
    fn test_folder_name_key_layout() {
        let key = LockKey::folder_name(OwnerId::new(5).unwrap(), 0, "reports").unwrap();
        assert_eq!(key.as_str(), "disk:lock:folder:5:0:reports");
    }

    #[test]
    fn test_upload_key_layout() {
        let hash = ContentHash::from_hex("a".repeat(64)).unwrap();
        assert_eq!(
            LockKey::upload(&hash).as_str(),
            format!("disk:lock:upload:{}", "a".repeat(64))
        );
        assert_ne!(LockKey::upload(&hash), LockKey::merge(&hash));
    }

    #[test]
    fn test_name_keys_differ_by_kind() {
        let folder = LockKey::folder_name(owner(), 3, "x").unwrap();
        let file = LockKey::file_name(owner(), 3, "x").unwrap();
        assert_ne!(folder, file);
    }

    #[test]
    fn test_rejects_empty_and_control_chars() {
        assert!(LockKey::new("").is_err());
        assert!(LockKey::file_name(owner(), 0, "bad\nname").is_err());
    }

    #[test]
    fn test_rejects_oversized_key() {
        let name = "n".repeat(600);
        assert!(LockKey::file_name(owner(), 0, &name).is_err());
    }
}
