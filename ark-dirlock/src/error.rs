use ark_crypto::CryptoError;
use ark_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

pub type DirLockResult<T> = Result<T, DirLockError>;

#[derive(Debug, Error)]
pub enum DirLockError {
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("directory is already locked: {}", .0.display())]
    AlreadyLocked(PathBuf),

    #[error("directory is not locked: {}", .0.display())]
    NotLocked(PathBuf),

    /// Another lock/unlock holds the path.
    #[error("directory is busy: {}", .0.display())]
    Busy(PathBuf),

    #[error("invalid password")]
    InvalidPassword,

    #[error("a password is required for this directory")]
    PasswordRequired,

    #[error("master key is not available")]
    MasterKeyUnavailable,

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
