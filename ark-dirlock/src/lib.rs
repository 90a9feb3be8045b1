//! Directory lock/unlock engine for Ark.
//!
//! Locking replaces a directory with a single encrypted archive file at the
//! same path, sets it to mode `000` and optionally hides it. Unlocking
//! reverses this. Each transform holds an advisory lock on the path, stages
//! its output next to the target and swaps it in with renames, so an
//! interrupted operation leaves either the old state or the new one.
//!
//! Directory keys are either the master key or derived from a per-directory
//! password with a fresh salt, which is stored in the lock record together
//! with a verifier used to reject wrong passwords before the archive is read.

mod archive;
mod attrs;
mod error;
mod pathlock;
mod service;

pub use archive::{extract_archive, write_archive, ArchiveSummary};
pub use error::{DirLockError, DirLockResult};
pub use pathlock::PathLock;
pub use service::{LockMode, LockService};
