use crate::bucket::{Bucket, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How a vault value should be interpreted by clients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultFormat {
    Json,
    Yaml,
    #[default]
    Text,
}

impl VaultFormat {
    pub const ALL: [VaultFormat; 3] = [VaultFormat::Json, VaultFormat::Yaml, VaultFormat::Text];

    pub fn as_str(self) -> &'static str {
        match self {
            VaultFormat::Json => "json",
            VaultFormat::Yaml => "yaml",
            VaultFormat::Text => "text",
        }
    }
}

impl fmt::Display for VaultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid format: {0} (supported formats: json, yaml, text)")]
pub struct InvalidFormat(pub String);

impl FromStr for VaultFormat {
    type Err = InvalidFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(VaultFormat::Json),
            "yaml" => Ok(VaultFormat::Yaml),
            "text" => Ok(VaultFormat::Text),
            _ => Err(InvalidFormat(s.to_string())),
        }
    }
}

/// A stored credential with its descriptive metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub key: String,
    pub value: String,
    pub format: VaultFormat,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VaultEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, format: VaultFormat) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            value: value.into(),
            format,
            description: String::new(),
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Bumps `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Returns `false` if the tag was already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let added = self.tags.insert(tag.into());
        if added {
            self.touch();
        }
        added
    }

    /// Returns `false` if the tag was not present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let removed = self.tags.remove(tag);
        if removed {
            self.touch();
        }
        removed
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
        self.touch();
    }

    pub fn get_metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// Case-insensitive match over key, description, tags, and the value
    /// itself when the entry is plain text.
    pub fn matches_search(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        if self.key.to_lowercase().contains(&query) || self.description.to_lowercase().contains(&query) {
            return true;
        }
        if self.tags.iter().any(|t| t.to_lowercase().contains(&query)) {
            return true;
        }
        self.format == VaultFormat::Text && self.value.to_lowercase().contains(&query)
    }
}

impl Record for VaultEntry {
    const BUCKET: Bucket = Bucket::Vault;

    fn record_key(&self) -> String {
        self.key.clone()
    }
}
