//! Encrypted, expiring on-disk copy of the master key.
//!
//! File contents: `EncryptedBlob(cache_key, json!({ key, expires_at }))`
//! where `cache_key = SHA-256(config_dir || salt)`. The file is a convenience:
//! deleting it at any time only costs the user a password prompt, so every
//! failure on the read path degrades to a cache miss.

use crate::error::{KeyError, KeyResult};
use ark_crypto::{cache_key, decrypt, encrypt, DerivedKey, Salt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

pub const CACHE_FILE_NAME: &str = ".master_key_cache";

/// Plaintext body of the cache file.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(with = "key_base64")]
    pub key: DerivedKey,
    pub expires_at: DateTime<Utc>,
}

/// Disk cache for one installation's master key.
pub struct MasterKeyCache {
    path: PathBuf,
    cache_key: DerivedKey,
    guard: Mutex<()>,
}

impl MasterKeyCache {
    /// Cache stored at `path`, encrypted under a key bound to `config_dir`
    /// and `salt`.
    pub fn new(path: impl Into<PathBuf>, config_dir: &Path, salt: &Salt) -> Self {
        Self {
            path: path.into(),
            cache_key: cache_key(&config_dir.to_string_lossy(), salt),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the cached key if present, readable and unexpired.
    pub fn load(&self) -> Option<DerivedKey> {
        self.load_at(Utc::now())
    }

    /// [`load`](Self::load) evaluated at an explicit instant.
    pub fn load_at(&self, now: DateTime<Utc>) -> Option<DerivedKey> {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());

        let blob = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("master key cache miss");
                return None;
            }
            Err(e) => {
                warn!("failed to read master key cache: {e}");
                return None;
            }
        };

        let entry = match decrypt(&self.cache_key, &blob)
            .ok()
            .and_then(|plain| serde_json::from_slice::<CacheEntry>(&plain).ok())
        {
            Some(entry) => entry,
            None => {
                warn!("master key cache is corrupt, discarding it");
                self.remove_file();
                return None;
            }
        };

        if now >= entry.expires_at {
            debug!("master key cache expired at {}", entry.expires_at);
            self.remove_file();
            return None;
        }

        debug!("master key cache hit");
        Some(entry.key)
    }

    /// Writes `key` with an expiry of `now + timeout`.
    pub fn store(&self, key: &DerivedKey, timeout: Duration) -> KeyResult<()> {
        self.store_at(key, timeout, Utc::now())
    }

    pub fn store_at(&self, key: &DerivedKey, timeout: Duration, now: DateTime<Utc>) -> KeyResult<()> {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());

        let expires_at = now
            + chrono::Duration::from_std(timeout)
                .map_err(|e| KeyError::Config(e.to_string()))?;
        let entry = CacheEntry {
            key: key.clone(),
            expires_at,
        };
        let plain = serde_json::to_vec(&entry)
            .map_err(|e| KeyError::Config(e.to_string()))?;
        let blob = encrypt(&self.cache_key, &plain)?;

        if let Some(parent) = self.path.parent() {
            create_private_dir(parent)?;
        }
        crate::config::write_private(&self.path, blob.as_bytes())?;
        Ok(())
    }

    /// Deletes the cache file. Absent files are not an error.
    pub fn clear(&self) -> KeyResult<()> {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_file(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("failed to remove master key cache: {e}");
            }
        }
    }
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

mod key_base64 {
    use ark_crypto::DerivedKey;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &DerivedKey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(key.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DerivedKey, D::Error> {
        let encoded = String::deserialize(d)?;
        let bytes = STANDARD.decode(encoded).map_err(serde::de::Error::custom)?;
        DerivedKey::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}
