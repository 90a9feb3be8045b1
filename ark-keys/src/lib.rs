//! Master key lifecycle for Ark.
//!
//! Owns everything between "the user typed a password" and "a 32-byte key is
//! in memory":
//!
//! - [`ArkConfig`]: the plaintext `config.yaml`, including the KDF salt
//! - [`PasswordPrompt`]: interactive (or injected) password input
//! - [`MasterKeyCache`]: the encrypted, expiring on-disk copy of the key
//! - [`MasterKeyManager`]: the single "get or prompt" entry point
//!
//! The cache file is guarded by a mutex scoped to its [`MasterKeyCache`]
//! instance. Two separate processes racing on the same file are not
//! coordinated; the worst outcome is a redundant prompt.

mod cache;
mod config;
mod error;
mod manager;
pub mod prompt;

pub use cache::{CacheEntry, MasterKeyCache, CACHE_FILE_NAME};
pub use config::{
    default_config_dir, ArkConfig, AwsConfig, BackupConfig, LogRotationConfig, SecurityConfig,
    CONFIG_FILE_NAME, DEFAULT_CACHE_TIMEOUT_SECS,
};
pub use error::{KeyError, KeyResult};
pub use manager::MasterKeyManager;
pub use prompt::{PasswordPrompt, TerminalPrompt};
