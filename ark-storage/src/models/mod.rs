//! Record types stored by the domain crates.

mod backup;
mod dirlock;
mod vault;

pub use backup::BackupRecord;
pub use dirlock::LockedDirectoryRecord;
pub use vault::{InvalidFormat, VaultEntry, VaultFormat};
