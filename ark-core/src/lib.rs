//! Ark: a local secrets manager.
//!
//! [`Ark`] wires the pieces of one installation together:
//!
//! ```text
//! config.yaml ──► MasterKeyManager ──► master key
//!                                        │
//!                      ┌─────────────────┼──────────────────┐
//!                      ▼                 ▼                  ▼
//!                 Database          VaultManager        LockService
//!           (per-value AEAD)     (vault bucket)    (locked_dirs bucket)
//! ```
//!
//! Backups are the raw store file wrapped in one more layer of encryption
//! under the master key.

mod ark;
mod error;
pub mod logging;

pub use ark::{Ark, ArkBuilder, Backup};
pub use error::{ArkError, ArkResult};

pub use ark_crypto::KdfParams;
pub use ark_dirlock::{LockMode, LockService};
pub use ark_keys::{ArkConfig, MasterKeyManager, PasswordPrompt, TerminalPrompt};
pub use ark_storage::models::{BackupRecord, LockedDirectoryRecord, VaultEntry, VaultFormat};
pub use ark_storage::{Bucket, Database};
pub use ark_vault::VaultManager;
