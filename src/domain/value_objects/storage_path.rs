use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

use super::ContentHash;

const MAX_EXTENSION_LEN: usize = 16;

/// Lower-cased extension of a file name, `None` when absent or unusable
pub fn extension_of(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    normalize_extension(ext).ok()
}

fn normalize_extension(ext: &str) -> Result<String, DomainError> {
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(DomainError::InvalidStoragePath(format!(
            "unusable file extension: {:?}",
            ext
        )));
    }
    Ok(ext.to_ascii_lowercase())
}

/// Location of an object relative to the storage root
///
/// Always relative, `/`-separated, and free of `.`/`..` segments, so it can
/// never escape the root it is resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoragePath(String);

impl StoragePath {
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into();
        if path.is_empty() {
            return Err(DomainError::InvalidStoragePath(
                "storage path cannot be empty".to_string(),
            ));
        }
        if path.starts_with('/') || path.contains('\\') {
            return Err(DomainError::InvalidStoragePath(format!(
                "storage path must be relative: {}",
                path
            )));
        }
        if path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(DomainError::InvalidStoragePath(format!(
                "storage path has an invalid segment: {}",
                path
            )));
        }
        Ok(Self(path))
    }

    /// `blobs/{prefix}/{hash}[.{ext}]`
    pub fn for_blob(hash: &ContentHash, extension: Option<&str>) -> Result<Self, DomainError> {
        let mut path = format!("blobs/{}/{}", hash.prefix(), hash.as_hex());
        if let Some(ext) = extension {
            path.push('.');
            path.push_str(&normalize_extension(ext)?);
        }
        Ok(Self(path))
    }

    /// Directory holding every staged chunk of one upload
    pub fn chunk_dir(identifier: &ContentHash) -> Self {
        Self(format!("chunks/{}", identifier.as_hex()))
    }

    /// `chunks/{identifier}/{n}-{token}`; the token keeps racing submitters apart
    pub fn for_chunk(
        identifier: &ContentHash,
        chunk_number: u32,
        token: &str,
    ) -> Result<Self, DomainError> {
        Self::new(format!(
            "chunks/{}/{}-{}",
            identifier.as_hex(),
            chunk_number,
            token
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Segments of the path, in order
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Parent directory, `None` for a top-level entry
    pub fn parent(&self) -> Option<StoragePath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| StoragePath(parent.to_string()))
    }
}

impl std::fmt::Display for StoragePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for StoragePath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StoragePath> for String {
    fn from(path: StoragePath) -> Self {
        path.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_relative_path() {
        let path = StoragePath::new("blobs/ab/abcd.txt").unwrap();
        assert_eq!(path.segments().count(), 3);
        assert_eq!(path.parent().unwrap().as_str(), "blobs/ab");
        assert!(StoragePath::new("top").unwrap().parent().is_none());
    }

    #[test]
    fn test_blob_layout() {
        let hash = ContentHash::from_hex("ab".repeat(32)).unwrap();
        let plain = StoragePath::for_blob(&hash, None).unwrap();
        assert_eq!(plain.as_str(), format!("blobs/ab/{}", "ab".repeat(32)));

        let with_ext = StoragePath::for_blob(&hash, Some("PDF")).unwrap();
        assert!(with_ext.as_str().ends_with(".pdf"));
        assert!(StoragePath::for_blob(&hash, Some("../x")).is_err());
    }

    #[test]
    fn test_chunk_layout() {
        let hash = ContentHash::from_hex("0".repeat(64)).unwrap();
        let chunk = StoragePath::for_chunk(&hash, 3, "tok").unwrap();
        assert_eq!(chunk.parent().unwrap(), StoragePath::chunk_dir(&hash));
        assert!(chunk.as_str().ends_with("/3-tok"));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("report.TXT").as_deref(), Some("txt"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("trailing."), None);
        assert_eq!(extension_of("weird.e x e"), None);
    }

    #[test]
    fn test_rejects_escaping_paths() {
        assert!(StoragePath::new("").is_err());
        assert!(StoragePath::new("/etc/passwd").is_err());
        assert!(StoragePath::new("blobs/../../etc").is_err());
        assert!(StoragePath::new("blobs//x").is_err());
        assert!(StoragePath::new("blobs\\x").is_err());
    }
}
