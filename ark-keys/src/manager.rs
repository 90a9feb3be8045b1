//! Master key lifecycle: memory → disk cache → prompt + derive.

use crate::cache::{MasterKeyCache, CACHE_FILE_NAME};
use crate::config::{ArkConfig, CONFIG_FILE_NAME};
use crate::error::{KeyError, KeyResult};
use crate::prompt::{self, PasswordPrompt};
use ark_crypto::{derive_key, generate_random_key, DerivedKey, KdfParams, Salt};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Owns the in-memory master key and the on-disk cache for one installation.
pub struct MasterKeyManager {
    config: ArkConfig,
    cache: Option<MasterKeyCache>,
    prompt: Arc<dyn PasswordPrompt>,
    kdf: KdfParams,
    key: RwLock<Option<DerivedKey>>,
}

fn cache_for(config: &ArkConfig) -> Option<MasterKeyCache> {
    config.salt.as_ref().map(|salt| {
        MasterKeyCache::new(
            config.data_dir().join(CACHE_FILE_NAME),
            config.config_dir(),
            salt,
        )
    })
}

impl MasterKeyManager {
    pub fn new(config: ArkConfig, prompt: Arc<dyn PasswordPrompt>) -> Self {
        Self {
            cache: cache_for(&config),
            config,
            prompt,
            kdf: KdfParams::default(),
            key: RwLock::new(None),
        }
    }

    /// Overrides the Argon2id cost. Only tests should need this.
    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf = params;
        self
    }

    pub fn config(&self) -> &ArkConfig {
        &self.config
    }

    pub fn kdf_params(&self) -> &KdfParams {
        &self.kdf
    }

    /// First-time setup: generates the salt and backup key, derives the master
    /// key from `password`, writes `config.yaml` and keeps the key in memory.
    pub fn initialize(&mut self, password: &str) -> KeyResult<()> {
        let config_path = self.config.config_dir().join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Err(KeyError::AlreadyInitialized(
                self.config.config_dir().display().to_string(),
            ));
        }
        if password.chars().count() < 8 {
            return Err(KeyError::WeakPassword(
                "password must be at least 8 characters long".into(),
            ));
        }

        std::fs::create_dir_all(self.config.data_dir())?;
        self.rekey(password)?;
        info!("initialized Ark at {}", self.config.config_dir().display());
        Ok(())
    }

    /// Returns the master key, prompting for the password only when neither
    /// memory nor the disk cache can supply it.
    pub fn get_master_key(&self) -> KeyResult<DerivedKey> {
        if let Some(key) = self.master_key_silent() {
            return Ok(key);
        }

        let caching = !self.config.password_cache_timeout().is_zero();
        if caching {
            if let Some(key) = self.cache.as_ref().and_then(|c| c.load()) {
                self.hold(key.clone());
                return Ok(key);
            }
        }

        let salt = self.config.salt.as_ref().ok_or(KeyError::NotInitialized)?;
        let password = prompt::get_master_password(self.prompt.as_ref())?;
        let key = derive_key(&password, salt, &self.kdf)
            .map_err(|e| KeyError::DerivationFailed(e.to_string()))?;

        if caching {
            if let Some(cache) = &self.cache {
                // Cache is a convenience; never fail the command over it
                if let Err(e) = cache.store(&key, self.config.password_cache_timeout()) {
                    warn!("failed to write master key cache: {e}");
                }
            }
        }

        self.hold(key.clone());
        Ok(key)
    }

    /// The in-memory key, if any. Never prompts and never touches disk.
    pub fn master_key_silent(&self) -> Option<DerivedKey> {
        self.key.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Forgets the in-memory key. The disk cache is left alone.
    pub fn forget(&self) {
        *self.key.write().unwrap_or_else(|p| p.into_inner()) = None;
    }

    /// Replaces the master password: new salt, new backup key, cache wiped.
    ///
    /// Records encrypted under the old key become unreadable unless the
    /// caller re-encrypts them.
    pub fn change_master_password(&mut self, new_password: &str) -> KeyResult<()> {
        self.clear_cache()?;
        self.rekey(new_password)?;
        info!("master password changed");
        Ok(())
    }

    /// Deletes the disk cache.
    pub fn clear_cache(&self) -> KeyResult<()> {
        if let Some(cache) = &self.cache {
            cache.clear()?;
            debug!("master key cache cleared");
        }
        Ok(())
    }

    /// Persists a new cache timeout. `0` disables the disk cache and removes
    /// any existing cache file.
    pub fn set_cache_timeout(&mut self, seconds: u64) -> KeyResult<()> {
        self.config.set_password_cache_timeout(seconds);
        self.config.save()?;
        if seconds == 0 {
            self.clear_cache()?;
        }
        Ok(())
    }

    fn rekey(&mut self, password: &str) -> KeyResult<()> {
        let salt = Salt::random();
        let key = derive_key(password, &salt, &self.kdf)
            .map_err(|e| KeyError::DerivationFailed(e.to_string()))?;

        self.config.salt = Some(salt);
        self.config.backup_key = Some(generate_random_key());
        self.cache = cache_for(&self.config);
        self.config.save()?;
        self.hold(key);
        Ok(())
    }

    fn hold(&self, key: DerivedKey) {
        *self.key.write().unwrap_or_else(|p| p.into_inner()) = Some(key);
    }
}
