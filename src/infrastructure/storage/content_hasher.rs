use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};

use crate::application::ports::StorageError;
use crate::domain::value_objects::ContentHash;

/// Buffer size for I/O operations. 256KB provides optimal throughput
/// for most modern storage systems while balancing memory usage.
const BUFFER_SIZE: usize = 256 * 1024;

/// Streaming SHA-256 over readers and files.
///
/// Hashing happens in the same pass as the write, so content is never read
/// twice on the upload path. SIMD acceleration comes from the `asm` features
/// of `sha2`.
pub struct ContentHasher;

impl ContentHasher {
    /// Write stream to file and compute SHA-256 hash simultaneously.
    ///
    /// Returns the hash and the number of bytes written. With `durable`, the
    /// file is fsynced before returning.
    pub async fn write_and_hash(
        dest_path: &Path,
        mut reader: impl AsyncRead + Unpin,
        durable: bool,
    ) -> Result<(ContentHash, u64), StorageError> {
        // Using 2x buffer size for BufWriter to minimize syscalls
        let mut file =
            tokio::io::BufWriter::with_capacity(BUFFER_SIZE * 2, File::create(dest_path).await?);

        let mut hasher = Sha256::new();
        let mut total_bytes = 0u64;
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }

            hasher.update(&buffer[..n]);
            file.write_all(&buffer[..n]).await?;

            total_bytes += n as u64;
        }

        file.flush().await?;

        if durable {
            file.get_mut().sync_all().await?;
        }

        Ok((Self::finish(hasher)?, total_bytes))
    }

    /// Hash a stream without writing it anywhere
    pub async fn hash_reader(
        mut reader: impl AsyncRead + Unpin,
    ) -> Result<(ContentHash, u64), StorageError> {
        let mut hasher = Sha256::new();
        let mut total_bytes = 0u64;
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            total_bytes += n as u64;
        }

        Ok((Self::finish(hasher)?, total_bytes))
    }

    /// Compute SHA-256 hash of an existing file.
    pub async fn hash_file(path: &Path) -> Result<ContentHash, StorageError> {
        let file = File::open(path).await?;
        let (hash, _) = Self::hash_reader(BufReader::with_capacity(BUFFER_SIZE, file)).await?;
        Ok(hash)
    }

    /// Hash an in-memory buffer
    pub fn hash_bytes(bytes: &[u8]) -> Result<ContentHash, StorageError> {
        ContentHash::from_digest(&Sha256::digest(bytes))
            .map_err(|e| StorageError::Internal(e.to_string()))
    }

    fn finish(hasher: Sha256) -> Result<ContentHash, StorageError> {
        ContentHash::from_digest(&hasher.finalize())
            .map_err(|e| StorageError::Internal(e.to_string()))
    }
}
