use crate::error::{VaultError, VaultResult};
use ark_storage::models::{VaultEntry, VaultFormat};
use ark_storage::{Bucket, Database, StorageError};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Domain operations over the `vault` bucket.
#[derive(Clone, Debug)]
pub struct VaultManager {
    db: Database,
}

impl VaultManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates or replaces the entry under `key`.
    ///
    /// Replacing keeps the original `created_at`; tags and metadata are reset.
    pub fn set(
        &self,
        key: &str,
        value: &str,
        format: &str,
        description: &str,
        tags: &[String],
    ) -> VaultResult<VaultEntry> {
        if key.is_empty() {
            return Err(VaultError::EmptyKey);
        }
        let format: VaultFormat = format.parse()?;

        let mut entry = VaultEntry::new(key, value, format)
            .with_description(description)
            .with_tags(tags.iter().cloned());
        if let Some(previous) = self.find(key)? {
            entry.created_at = previous.created_at;
        }

        self.db.put(&entry)?;
        info!(key, %format, "stored credential");
        Ok(entry)
    }

    /// Reads an entry without modifying it.
    pub fn get(&self, key: &str) -> VaultResult<VaultEntry> {
        self.find(key)?.ok_or_else(|| VaultError::NotFound(key.to_string()))
    }

    /// Reads an entry and records the access by bumping `updated_at`.
    pub fn touch(&self, key: &str) -> VaultResult<VaultEntry> {
        self.modify(key, |entry| entry.touch())
    }

    /// Every decodable entry, ordered by key.
    pub fn list(&self) -> VaultResult<Vec<VaultEntry>> {
        let mut entries = Vec::new();
        for (key, result) in self.db.fetch_all::<VaultEntry>()? {
            match result {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(%key, "skipping unreadable vault entry: {e}"),
            }
        }
        Ok(entries)
    }

    /// Entries whose key contains `query` (case-sensitive), further filtered
    /// by [`VaultEntry::matches_search`]. Undecodable entries are skipped.
    pub fn search(&self, query: &str) -> VaultResult<Vec<VaultEntry>> {
        let mut entries = Vec::new();
        for key in self.db.search(Bucket::Vault, query)? {
            match self.db.fetch::<VaultEntry>(&key) {
                Ok(entry) if entry.matches_search(query) => entries.push(entry),
                Ok(_) => {}
                Err(e) => warn!(%key, "skipping unreadable vault entry: {e}"),
            }
        }
        Ok(entries)
    }

    pub fn delete(&self, key: &str) -> VaultResult<()> {
        if !self.exists(key)? {
            return Err(VaultError::NotFound(key.to_string()));
        }
        self.db.remove::<VaultEntry>(key)?;
        info!(key, "deleted credential");
        Ok(())
    }

    /// Replaces value, format, description and tags of an existing entry.
    /// Metadata and `created_at` are kept.
    pub fn update(
        &self,
        key: &str,
        value: &str,
        format: &str,
        description: &str,
        tags: &[String],
    ) -> VaultResult<VaultEntry> {
        let format: VaultFormat = format.parse()?;
        self.modify(key, |entry| {
            entry.value = value.to_string();
            entry.format = format;
            entry.description = description.to_string();
            entry.tags = tags.iter().cloned().collect();
            entry.touch();
        })
    }

    pub fn exists(&self, key: &str) -> VaultResult<bool> {
        Ok(self.db.exists(Bucket::Vault, key)?)
    }

    pub fn by_tag(&self, tag: &str) -> VaultResult<Vec<VaultEntry>> {
        Ok(self.list()?.into_iter().filter(|e| e.has_tag(tag)).collect())
    }

    pub fn by_format(&self, format: &str) -> VaultResult<Vec<VaultEntry>> {
        let format: VaultFormat = format.parse()?;
        Ok(self.list()?.into_iter().filter(|e| e.format == format).collect())
    }

    pub fn add_tag(&self, key: &str, tag: &str) -> VaultResult<VaultEntry> {
        self.modify(key, |entry| {
            entry.add_tag(tag);
        })
    }

    pub fn remove_tag(&self, key: &str, tag: &str) -> VaultResult<VaultEntry> {
        self.modify(key, |entry| {
            entry.remove_tag(tag);
        })
    }

    pub fn set_metadata(&self, key: &str, name: &str, value: Value) -> VaultResult<VaultEntry> {
        self.modify(key, |entry| entry.set_metadata(name, value))
    }

    pub fn get_metadata(&self, key: &str, name: &str) -> VaultResult<Option<Value>> {
        Ok(self.get(key)?.get_metadata(name).cloned())
    }

    /// Deletes every entry in the vault, returning how many were removed.
    pub fn clear(&self) -> VaultResult<usize> {
        let keys = self.db.list(Bucket::Vault)?;
        for key in &keys {
            self.db.delete(Bucket::Vault, key)?;
        }
        info!(count = keys.len(), "cleared vault");
        Ok(keys.len())
    }

    fn find(&self, key: &str) -> VaultResult<Option<VaultEntry>> {
        match self.db.fetch::<VaultEntry>(key) {
            Ok(entry) => Ok(Some(entry)),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn modify(&self, key: &str, f: impl FnOnce(&mut VaultEntry)) -> VaultResult<VaultEntry> {
        let mut entry = self.get(key)?;
        f(&mut entry);
        self.db.put(&entry)?;
        debug!(key, "updated credential");
        Ok(entry)
    }
}
