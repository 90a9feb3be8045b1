use crate::error::{ArkError, ArkResult};
use ark_crypto::{decrypt, encrypt, DerivedKey, KdfParams, KeyEncryptor};
use ark_dirlock::LockService;
use ark_keys::{ArkConfig, MasterKeyManager, PasswordPrompt, TerminalPrompt};
use ark_storage::models::BackupRecord;
use ark_storage::{Bucket, Database, StorageError, DEFAULT_OPEN_TIMEOUT};
use ark_vault::VaultManager;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Key in the `config` bucket holding a value written under the master key.
/// Failing to decrypt it on open means the password was wrong.
const MASTER_VERIFIER_KEY: &str = "master_key_verifier";
const MASTER_VERIFIER_TOKEN: &str = "ark-master-key-verifier-v1";

/// An encrypted snapshot of the whole store.
#[derive(Debug)]
pub struct Backup {
    pub record: BackupRecord,
    /// `EncryptedBlob(master_key, store_file_bytes)`.
    pub data: Vec<u8>,
}

/// Configures how an installation is initialized or opened.
pub struct ArkBuilder {
    config_dir: PathBuf,
    prompt: Arc<dyn PasswordPrompt>,
    kdf: KdfParams,
    open_timeout: Duration,
}

impl ArkBuilder {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            prompt: Arc::new(TerminalPrompt),
            kdf: KdfParams::default(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }

    pub fn prompt(mut self, prompt: Arc<dyn PasswordPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf = params;
        self
    }

    /// How long to wait for another process holding the store.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// First-time setup of a new installation under the config directory.
    pub fn init(self, password: &str) -> ArkResult<Ark> {
        let config = ArkConfig::new(&self.config_dir);
        crate::logging::init(&config.log_level);
        let mut keys = MasterKeyManager::new(config, self.prompt.clone()).with_kdf_params(self.kdf);
        keys.initialize(password)?;
        let key = keys.get_master_key()?;

        let ark = self.assemble(keys, key)?;
        ark.db.set(Bucket::Config, MASTER_VERIFIER_KEY, MASTER_VERIFIER_TOKEN)?;
        Ok(ark)
    }

    /// Opens an existing installation, prompting for the master password
    /// unless the key is cached.
    pub fn open(self) -> ArkResult<Ark> {
        let config = ArkConfig::load(&self.config_dir)?;
        crate::logging::init(&config.log_level);
        config.validate()?;
        let keys = MasterKeyManager::new(config, self.prompt.clone()).with_kdf_params(self.kdf);
        let key = keys.get_master_key()?;

        let ark = self.assemble(keys, key)?;
        ark.verify_master_key()?;
        Ok(ark)
    }

    fn assemble(&self, keys: MasterKeyManager, key: DerivedKey) -> ArkResult<Ark> {
        let config = keys.config();
        let db = Database::open_with_timeout(
            &config.database_path,
            Arc::new(KeyEncryptor::new(key.clone())),
            self.open_timeout,
        )?;
        let vault = VaultManager::new(db.clone());
        let dirlock = LockService::new(db.clone(), config.data_dir().join("locks"))
            .with_master_key(key.clone())
            .with_kdf_params(self.kdf);

        Ok(Ark {
            keys,
            db,
            vault,
            dirlock,
            master_key: key,
        })
    }
}

/// One open installation.
pub struct Ark {
    keys: MasterKeyManager,
    db: Database,
    vault: VaultManager,
    dirlock: LockService,
    master_key: DerivedKey,
}

impl Ark {
    pub fn builder(config_dir: impl Into<PathBuf>) -> ArkBuilder {
        ArkBuilder::new(config_dir)
    }

    pub fn config(&self) -> &ArkConfig {
        self.keys.config()
    }

    pub fn keys(&self) -> &MasterKeyManager {
        &self.keys
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn vault(&self) -> &VaultManager {
        &self.vault
    }

    pub fn dirlock(&self) -> &LockService {
        &self.dirlock
    }

    pub fn stats(&self) -> ArkResult<BTreeMap<Bucket, u64>> {
        Ok(self.db.stats()?)
    }

    /// Removes the disk cache so the next invocation prompts again.
    pub fn logout(&self) -> ArkResult<()> {
        self.keys.clear_cache()?;
        info!("logged out");
        Ok(())
    }

    pub fn set_cache_timeout(&mut self, seconds: u64) -> ArkResult<()> {
        self.keys.set_cache_timeout(seconds)?;
        Ok(())
    }

    // ── Backup / restore ────────────────────────────────────────────

    /// Snapshots the store and wraps it in an outer layer of encryption
    /// under the master key. The snapshot is recorded in `backup_metadata`.
    pub fn create_backup(&self) -> ArkResult<Backup> {
        let snapshot = self.db.backup()?;
        let data = encrypt(&self.master_key, &snapshot)?.into_bytes();

        let record = BackupRecord::new(Utc::now(), data.len() as u64, hex::encode(Sha256::digest(&data)));
        self.db.put(&record)?;
        info!(id = %record.id, size = record.size, "created backup");
        Ok(Backup { record, data })
    }

    /// Replaces the whole store with a backup made by
    /// [`create_backup`](Self::create_backup) under the same master key.
    pub fn restore_backup(&self, data: &[u8]) -> ArkResult<()> {
        let snapshot = decrypt(&self.master_key, data)
            .map_err(|_| ArkError::InvalidBackup("cannot decrypt backup with this master key".into()))?;
        self.db.restore(&snapshot)?;
        self.verify_master_key()?;
        info!(size = data.len(), "restored backup");
        Ok(())
    }

    /// Recorded backups, oldest first.
    pub fn list_backups(&self) -> ArkResult<Vec<BackupRecord>> {
        let mut records = Vec::new();
        for (key, result) in self.db.fetch_all::<BackupRecord>()? {
            match result {
                Ok(record) => records.push(record),
                Err(e) => warn!(%key, "skipping unreadable backup record: {e}"),
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn verify_master_key(&self) -> ArkResult<()> {
        match self.db.get::<String>(Bucket::Config, MASTER_VERIFIER_KEY) {
            Ok(_) => Ok(()),
            Err(StorageError::NotFound { .. }) => {
                self.db.set(Bucket::Config, MASTER_VERIFIER_KEY, MASTER_VERIFIER_TOKEN)?;
                Ok(())
            }
            Err(StorageError::Decrypt(_)) => {
                self.keys.forget();
                if let Err(e) = self.keys.clear_cache() {
                    warn!("failed to clear master key cache: {e}");
                }
                Err(ArkError::InvalidPassword)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for Ark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ark")
            .field("config_dir", &self.config().config_dir())
            .field("database", &self.db)
            .finish_non_exhaustive()
    }
}
