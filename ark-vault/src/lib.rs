//! Credential vault for Ark.
//!
//! [`VaultManager`] is the domain layer over the `vault` bucket: it validates
//! formats, maintains timestamps and tags, and implements the content-aware
//! search that the raw store cannot do on encrypted values.

mod error;
mod manager;

pub use ark_storage::models::{VaultEntry, VaultFormat};
pub use error::{VaultError, VaultResult};
pub use manager::VaultManager;
