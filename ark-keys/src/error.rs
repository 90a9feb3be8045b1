//! Key lifecycle error types.

use thiserror::Error;

/// Result type for key lifecycle operations.
pub type KeyResult<T> = Result<T, KeyError>;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("no salt found in config - Ark may not be initialized. Run 'ark init' first")]
    NotInitialized,

    #[error("Ark is already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("failed to get master password: {0}")]
    PromptFailed(String),

    #[error("failed to derive master key: {0}")]
    DerivationFailed(String),

    #[error("invalid password")]
    InvalidPassword,

    #[error("{0}")]
    WeakPassword(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] ark_crypto::CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for KeyError {
    fn from(e: serde_yaml::Error) -> Self {
        KeyError::Config(e.to_string())
    }
}
