//! Ark configuration (`config.yaml`).
//!
//! Holds the non-secret settings of one installation, including the KDF salt.
//! The master key and the backup key live on this struct at runtime but are
//! never serialized.

use crate::error::{KeyError, KeyResult};
use ark_crypto::{DerivedKey, Salt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Default lifetime of the on-disk master key cache.
pub const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 300;

const CONFIG_VERSION: &str = "1.0.0";
const VALID_LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// Top-level configuration for one Ark installation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArkConfig {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Argon2id salt for the master password. `None` until `ark init`.
    #[serde(default, with = "salt_base64")]
    pub salt: Option<Salt>,

    pub database_path: PathBuf,
    pub log_level: String,
    #[serde(default)]
    pub log_rotation: LogRotationConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(skip)]
    config_dir: PathBuf,

    /// Random key generated alongside the salt. Runtime only.
    #[serde(skip)]
    pub backup_key: Option<DerivedKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRotationConfig {
    pub enabled: bool,
    pub max_days: u32,
    pub max_size_mb: u32,
    pub compress: bool,
}

impl Default for LogRotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_days: 30,
            max_size_mb: 100,
            compress: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsConfig {
    pub default_profile: String,
    #[serde(default)]
    pub profiles: BTreeMap<String, String>,
    pub region: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            default_profile: "default".to_string(),
            profiles: BTreeMap::new(),
            region: "us-east-1".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub enabled: bool,
    #[serde(default)]
    pub s3_bucket: String,
    pub s3_prefix: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            s3_bucket: String::new(),
            s3_prefix: "ark-backups/".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Seconds a derived master key stays in the disk cache. `0` disables
    /// the cache entirely.
    #[serde(default = "default_cache_timeout")]
    pub password_cache_timeout_seconds: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            password_cache_timeout_seconds: DEFAULT_CACHE_TIMEOUT_SECS,
        }
    }
}

fn default_cache_timeout() -> u64 {
    DEFAULT_CACHE_TIMEOUT_SECS
}

/// `$HOME/.ark`, falling back to `./.ark` when no home directory is known.
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ark")
}

impl ArkConfig {
    /// Creates a default (uninitialized) configuration rooted at `config_dir`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        let now = Utc::now();
        Self {
            version: CONFIG_VERSION.to_string(),
            created_at: now,
            updated_at: now,
            salt: None,
            database_path: Self::database_path_for(&config_dir),
            log_level: "info".to_string(),
            log_rotation: LogRotationConfig::default(),
            aws: AwsConfig::default(),
            backup: BackupConfig::default(),
            security: SecurityConfig::default(),
            config_dir,
            backup_key: None,
        }
    }

    fn database_path_for(config_dir: &Path) -> PathBuf {
        config_dir.join("data").join("ark.db")
    }

    /// Loads `config.yaml` from `config_dir`.
    ///
    /// A missing file means the installation was never set up and is reported
    /// as [`KeyError::NotInitialized`].
    pub fn load(config_dir: impl Into<PathBuf>) -> KeyResult<Self> {
        let config_dir = config_dir.into();
        let path = config_dir.join(CONFIG_FILE_NAME);

        let data = match std::fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KeyError::NotInitialized);
            }
            Err(e) => return Err(e.into()),
        };

        let mut config: ArkConfig = serde_yaml::from_str(&data)?;
        config.database_path = Self::database_path_for(&config_dir);
        config.config_dir = config_dir;
        Ok(config)
    }

    /// Writes the configuration to `config.yaml` (mode 0600), bumping
    /// `updated_at`.
    pub fn save(&mut self) -> KeyResult<()> {
        self.updated_at = Utc::now();
        std::fs::create_dir_all(&self.config_dir)?;
        let yaml = serde_yaml::to_string(self)?;
        write_private(&self.config_path(), yaml.as_bytes())?;
        Ok(())
    }

    pub fn validate(&self) -> KeyResult<()> {
        if self.version.is_empty() {
            return Err(KeyError::Config("version is required".into()));
        }
        if self.salt.is_none() {
            return Err(KeyError::Config("invalid salt size".into()));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(KeyError::Config("database path is required".into()));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(KeyError::Config(format!(
                "invalid log level: {}",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Pretty JSON view of the configuration with the salt stripped.
    pub fn to_json(&self) -> KeyResult<String> {
        let mut value =
            serde_json::to_value(self).map_err(|e| KeyError::Config(e.to_string()))?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("salt");
        }
        serde_json::to_string_pretty(&value).map_err(|e| KeyError::Config(e.to_string()))
    }

    pub fn set_password_cache_timeout(&mut self, seconds: u64) {
        self.security.password_cache_timeout_seconds = seconds;
    }

    pub fn password_cache_timeout(&self) -> Duration {
        Duration::from_secs(self.security.password_cache_timeout_seconds)
    }

    pub fn is_initialized(&self) -> bool {
        self.salt.is_some()
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config_dir.join("data")
    }
}

/// Writes `bytes` to `path` readable and writable by the owner only.
pub(crate) fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;

    #[cfg(unix)]
    {
        // mode() only applies on create; tighten pre-existing files too
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

mod salt_base64 {
    use ark_crypto::Salt;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(salt: &Option<Salt>, s: S) -> Result<S::Ok, S::Error> {
        match salt {
            Some(salt) => s.serialize_str(&STANDARD.encode(salt.as_bytes())),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Salt>, D::Error> {
        let encoded = Option::<String>::deserialize(d)?.unwrap_or_default();
        if encoded.is_empty() {
            return Ok(None);
        }
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)?;
        Salt::from_slice(&bytes)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_installer() {
        let config = ArkConfig::new("/tmp/ark-test");
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.security.password_cache_timeout_seconds, 300);
        assert_eq!(config.backup.s3_prefix, "ark-backups/");
        assert_eq!(config.aws.region, "us-east-1");
        assert_eq!(
            config.database_path,
            PathBuf::from("/tmp/ark-test/data/ark.db")
        );
        assert!(!config.is_initialized());
    }

    #[test]
    fn validate_requires_salt_and_known_log_level() {
        let mut config = ArkConfig::new("/tmp/ark-test");
        assert!(config.validate().is_err());

        config.salt = Some(Salt::random());
        config.validate().unwrap();

        config.log_level = "verbose".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("invalid log level"));
    }

    #[test]
    fn to_json_omits_salt() {
        let mut config = ArkConfig::new("/tmp/ark-test");
        config.salt = Some(Salt::random());
        let json = config.to_json().unwrap();
        assert!(!json.contains("salt"));
        assert!(json.contains("database_path"));
    }
}
