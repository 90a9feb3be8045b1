use crate::bucket::{Bucket, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A directory currently replaced on disk by its encrypted archive.
///
/// The record exists exactly while the archive does.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LockedDirectoryRecord {
    pub path: PathBuf,
    pub uses_master_key: bool,
    /// KDF salt for password-protected locks. `None` iff `uses_master_key`.
    #[serde(default)]
    pub password_salt: Option<Vec<u8>>,
    /// Fixed token encrypted under the directory key.
    pub verifier: Vec<u8>,
    pub hidden: bool,
    pub locked_at: DateTime<Utc>,
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl LockedDirectoryRecord {
    pub fn new(path: impl Into<PathBuf>, password_salt: Option<Vec<u8>>, verifier: Vec<u8>, hidden: bool) -> Self {
        Self {
            path: path.into(),
            uses_master_key: password_salt.is_none(),
            password_salt,
            verifier,
            hidden,
            locked_at: Utc::now(),
            last_accessed_at: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn stamp(&mut self) {
        self.last_accessed_at = Some(Utc::now());
    }
}

impl Record for LockedDirectoryRecord {
    const BUCKET: Bucket = Bucket::LockedDirs;

    fn record_key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}
