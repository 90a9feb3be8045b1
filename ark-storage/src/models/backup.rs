use crate::bucket::{Bucket, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bookkeeping for one backup produced by this installation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Size of the encrypted backup in bytes.
    pub size: u64,
    /// Hex SHA-256 of the encrypted backup.
    pub sha256: String,
}

impl BackupRecord {
    /// Id derived from the creation time, e.g. `20260115-093000.125`.
    pub fn new(created_at: DateTime<Utc>, size: u64, sha256: impl Into<String>) -> Self {
        Self {
            id: created_at.format("%Y%m%d-%H%M%S%.3f").to_string(),
            created_at,
            size,
            sha256: sha256.into(),
        }
    }
}

impl Record for BackupRecord {
    const BUCKET: Bucket = Bucket::BackupMetadata;

    fn record_key(&self) -> String {
        self.id.clone()
    }
}
