use ark_storage::models::InvalidFormat;
use ark_storage::StorageError;
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("credential not found: {0}")]
    NotFound(String),

    #[error("credential key cannot be empty")]
    EmptyKey,

    #[error(transparent)]
    InvalidFormat(#[from] InvalidFormat),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
