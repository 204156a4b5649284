//! Content equality check: size pre-check, then streamed digest comparison

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::error::{Result, SyncError};

/// Digest used for content comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256 hash
    Sha256,
    /// Blake3 hash (faster)
    #[default]
    Blake3,
}

/// Decides whether two files hold identical bytes
#[derive(Debug, Clone)]
pub struct ContentComparator {
    algorithm: HashAlgorithm,
    /// Read buffer size used while hashing
    buffer_size: usize,
}

impl Default for ContentComparator {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

impl ContentComparator {
    /// Create a new comparator using the given digest
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            buffer_size: 64 * 1024, // 64KB buffer
        }
    }

    /// Create a new comparator with custom buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Returns `true` when both files have the same size and digest.
    ///
    /// Two empty files are equal.
    pub async fn equal<P1: AsRef<Path>, P2: AsRef<Path>>(&self, a: P1, b: P2) -> Result<bool> {
        let a = a.as_ref();
        let b = b.as_ref();

        let a_len = file_len(a).await?;
        let b_len = file_len(b).await?;
        if a_len != b_len {
            return Ok(false);
        }

        let a_digest = self.digest(a).await?;
        let b_digest = self.digest(b).await?;
        Ok(a_digest == b_digest)
    }

    /// Stream a file through the configured digest
    pub async fn digest(&self, path: &Path) -> Result<Vec<u8>> {
        let mut file = fs::File::open(path).await.map_err(|e| {
            SyncError::hash_error(path, format!("Failed to open file: {}", e))
        })?;

        let mut buffer = vec![0u8; self.buffer_size];

        match self.algorithm {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                loop {
                    let bytes_read = file.read(&mut buffer).await.map_err(|e| {
                        SyncError::hash_error(path, format!("Failed to read file: {}", e))
                    })?;

                    if bytes_read == 0 {
                        break;
                    }

                    hasher.update(&buffer[..bytes_read]);
                }
                Ok(hasher.finalize().to_vec())
            }
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                loop {
                    let bytes_read = file.read(&mut buffer).await.map_err(|e| {
                        SyncError::hash_error(path, format!("Failed to read file: {}", e))
                    })?;

                    if bytes_read == 0 {
                        break;
                    }

                    hasher.update(&buffer[..bytes_read]);
                }
                Ok(hasher.finalize().as_bytes().to_vec())
            }
        }
    }
}

async fn file_len(path: &Path) -> Result<u64> {
    fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|e| SyncError::hash_error(path, format!("Failed to read metadata: {}", e)))
}
