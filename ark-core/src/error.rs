use ark_crypto::CryptoError;
use ark_dirlock::DirLockError;
use ark_keys::KeyError;
use ark_storage::StorageError;
use ark_vault::VaultError;
use thiserror::Error;

pub type ArkResult<T> = Result<T, ArkError>;

#[derive(Debug, Error)]
pub enum ArkError {
    #[error("ark is not initialized, run `ark init` first")]
    NotInitialized,

    #[error("invalid password")]
    InvalidPassword,

    #[error("invalid backup: {0}")]
    InvalidBackup(String),

    #[error(transparent)]
    Key(KeyError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    DirLock(#[from] DirLockError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<KeyError> for ArkError {
    fn from(e: KeyError) -> Self {
        match e {
            KeyError::NotInitialized => ArkError::NotInitialized,
            KeyError::InvalidPassword => ArkError::InvalidPassword,
            other => ArkError::Key(other),
        }
    }
}
