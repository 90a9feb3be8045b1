//! Bucket identifiers and typed records.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named partition of the store. The set is closed; every bucket exists
/// from the moment the store is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Vault,
    AwsProfiles,
    Ec2Instances,
    LockedDirs,
    BackupMetadata,
    Config,
}

impl Bucket {
    pub const ALL: [Bucket; 6] = [
        Bucket::Vault,
        Bucket::AwsProfiles,
        Bucket::Ec2Instances,
        Bucket::LockedDirs,
        Bucket::BackupMetadata,
        Bucket::Config,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Bucket::Vault => "vault",
            Bucket::AwsProfiles => "aws_profiles",
            Bucket::Ec2Instances => "ec2_instances",
            Bucket::LockedDirs => "locked_dirs",
            Bucket::BackupMetadata => "backup_metadata",
            Bucket::Config => "config",
        }
    }

    /// Backing table name. Derived from the enum only, never from input.
    pub(crate) fn table(self) -> String {
        format!("bucket_{}", self.name())
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value type that lives in exactly one bucket.
pub trait Record: Serialize + DeserializeOwned {
    const BUCKET: Bucket;

    /// Key under which this record is stored.
    fn record_key(&self) -> String;
}
