//! Storage error types.

use crate::bucket::Bucket;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key {key} not found in bucket {bucket}")]
    NotFound { bucket: Bucket, key: String },

    #[error("bucket {0} not found")]
    BucketMissing(Bucket),

    #[error("failed to marshal value: {0}")]
    Encode(String),

    #[error("failed to unmarshal data: {0}")]
    Decode(String),

    #[error("failed to encrypt data: {0}")]
    Encrypt(String),

    /// Authentication failure on a stored value: wrong key or corrupted blob.
    #[error("failed to decrypt data: {0}")]
    Decrypt(String),

    #[error("database is in use by another process: {0}")]
    Locked(String),

    #[error("invalid backup data: {0}")]
    InvalidBackup(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
