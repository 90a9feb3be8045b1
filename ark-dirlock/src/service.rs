use crate::archive::{extract_archive, write_archive};
use crate::attrs::{set_hidden, set_mode};
use crate::error::{DirLockError, DirLockResult};
use crate::pathlock::PathLock;
use ark_crypto::{decrypt, derive_key, encrypt, DerivedKey, KdfParams, Salt};
use ark_storage::models::LockedDirectoryRecord;
use ark_storage::{Bucket, Database, StorageError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Plaintext of the per-record password verifier.
const VERIFIER_TOKEN: &[u8] = b"ark-dirlock-verifier-v1";

const LOCKED_MODE: u32 = 0o000;
const READ_MODE: u32 = 0o600;
const UNLOCKED_DIR_MODE: u32 = 0o700;

/// Which key protects a directory.
#[derive(Clone, Copy, Debug)]
pub enum LockMode<'a> {
    MasterKey,
    /// A per-directory password, stretched with a fresh salt.
    Password(&'a str),
}

/// Turns directories into encrypted archives and back.
///
/// The `locked_dirs` record is the commit point of both transforms: it is
/// written only after the archive has replaced the directory and the
/// plaintext tree is gone, and removed only after the directory has replaced
/// the archive.
pub struct LockService {
    db: Database,
    locks_dir: PathBuf,
    master_key: Option<DerivedKey>,
    kdf: KdfParams,
    remove_tree: fn(&Path) -> io::Result<()>,
}

impl LockService {
    /// `locks_dir` holds the per-path advisory lock files.
    pub fn new(db: Database, locks_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            locks_dir: locks_dir.into(),
            master_key: None,
            kdf: KdfParams::default(),
            remove_tree,
        }
    }

    pub fn with_master_key(mut self, key: DerivedKey) -> Self {
        self.master_key = Some(key);
        self
    }

    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf = params;
        self
    }

    /// Encrypts the directory at `path` into a single archive file at the
    /// same path.
    pub fn lock(&self, path: impl AsRef<Path>, mode: LockMode<'_>, hide: bool) -> DirLockResult<LockedDirectoryRecord> {
        let abs = resolve_existing(path.as_ref())?;
        let _guard = PathLock::acquire(&self.locks_dir, &abs)?;
        if self.db.exists(Bucket::LockedDirs, &record_key(&abs))? {
            return Err(DirLockError::AlreadyLocked(abs));
        }
        let meta = fs::symlink_metadata(&abs)?;
        if !meta.is_dir() {
            return Err(DirLockError::NotADirectory(abs));
        }
        let root_perms = meta.permissions();

        let (key, salt) = self.key_for_lock(mode)?;
        let verifier = encrypt(&key, VERIFIER_TOKEN)?;
        let record = LockedDirectoryRecord::new(
            &abs,
            salt.map(|s| s.as_bytes().to_vec()),
            verifier.into_bytes(),
            hide,
        );

        let staging = sibling(&abs, "locking");
        let original = sibling(&abs, "original");
        if fs::symlink_metadata(&original).is_ok() {
            warn!("removing leftover original tree {}", original.display());
            (self.remove_tree)(&original)?;
        }

        let summary = match write_archive(&abs, &key, &staging) {
            Ok(summary) => summary,
            Err(e) => {
                remove_file_quietly(&staging);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&abs, &original) {
            remove_file_quietly(&staging);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&staging, &abs) {
            if let Err(undo) = fs::rename(&original, &abs) {
                warn!("failed to move {} back: {undo}", original.display());
            }
            remove_file_quietly(&staging);
            return Err(e.into());
        }
        sync_parent(&abs);

        // From here on the archive is the only complete copy.
        let committed = (self.remove_tree)(&original)
            .map_err(DirLockError::from)
            .and_then(|()| seal(&abs, hide))
            .and_then(|()| Ok(self.db.put(&record)?));
        if let Err(e) = committed {
            self.rollback_lock(&abs, &key, &original, &root_perms, hide);
            return Err(e);
        }

        info!(
            files = summary.files,
            dirs = summary.dirs,
            skipped = summary.skipped,
            uses_master_key = record.uses_master_key,
            "locked {}",
            abs.display()
        );
        Ok(record)
    }

    /// Restores the directory at `path` from its archive. `password` is
    /// required for password-protected locks and ignored otherwise.
    pub fn unlock(&self, path: impl AsRef<Path>, password: Option<&str>) -> DirLockResult<()> {
        let abs = resolve(path.as_ref())?;
        let _guard = PathLock::acquire(&self.locks_dir, &abs)?;
        let key_str = record_key(&abs);

        let record = match self.db.fetch::<LockedDirectoryRecord>(&key_str) {
            Ok(record) => record,
            Err(StorageError::NotFound { .. }) => return Err(DirLockError::NotLocked(abs)),
            Err(e) => return Err(e.into()),
        };

        let key = self.key_for_unlock(&record, password)?;
        match decrypt(&key, &record.verifier) {
            Ok(token) if token == VERIFIER_TOKEN => {}
            _ => return Err(DirLockError::InvalidPassword),
        }

        if fs::symlink_metadata(&abs).is_err() {
            return Err(DirLockError::NotFound(abs));
        }
        set_mode(&abs, READ_MODE)?;

        let staging = sibling(&abs, "unlocking");
        if staging.exists() {
            debug!("removing leftover extraction {}", staging.display());
            fs::remove_dir_all(&staging)?;
        }
        if let Err(e) = extract_archive(&abs, &key, &staging) {
            remove_dir_quietly(&staging);
            reseal(&abs, false);
            return Err(e);
        }

        if record.hidden {
            if let Err(e) = set_hidden(&abs, false) {
                warn!("failed to clear hidden attribute on {}: {e}", abs.display());
            }
        }

        let archived = sibling(&abs, "archive");
        if let Err(e) = fs::rename(&abs, &archived) {
            remove_dir_quietly(&staging);
            reseal(&abs, record.hidden);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&staging, &abs) {
            if let Err(undo) = fs::rename(&archived, &abs) {
                warn!("failed to move archive {} back: {undo}", archived.display());
            }
            remove_dir_quietly(&staging);
            reseal(&abs, record.hidden);
            return Err(e.into());
        }
        if let Err(e) = set_mode(&abs, UNLOCKED_DIR_MODE) {
            warn!("failed to restore permissions on {}: {e}", abs.display());
        }

        if let Err(e) = self.db.remove::<LockedDirectoryRecord>(&key_str) {
            self.rollback_unlock(&abs, &archived, &staging, record.hidden);
            return Err(e.into());
        }

        remove_file_quietly(&archived);
        info!("unlocked {}", abs.display());
        Ok(())
    }

    /// All lock records, ordered by path. Unreadable records are skipped.
    pub fn list(&self) -> DirLockResult<Vec<LockedDirectoryRecord>> {
        let mut records = Vec::new();
        for (key, result) in self.db.fetch_all::<LockedDirectoryRecord>()? {
            match result {
                Ok(record) => records.push(record),
                Err(e) => warn!(%key, "skipping unreadable lock record: {e}"),
            }
        }
        Ok(records)
    }

    pub fn is_locked(&self, path: impl AsRef<Path>) -> DirLockResult<bool> {
        let abs = resolve(path.as_ref())?;
        Ok(self.db.exists(Bucket::LockedDirs, &record_key(&abs))?)
    }

    /// Records an access to a locked directory.
    pub fn stamp(&self, path: impl AsRef<Path>) -> DirLockResult<LockedDirectoryRecord> {
        let abs = resolve(path.as_ref())?;
        let mut record = match self.db.fetch::<LockedDirectoryRecord>(&record_key(&abs)) {
            Ok(record) => record,
            Err(StorageError::NotFound { .. }) => return Err(DirLockError::NotLocked(abs)),
            Err(e) => return Err(e.into()),
        };
        record.stamp();
        self.db.put(&record)?;
        Ok(record)
    }

    fn key_for_lock(&self, mode: LockMode<'_>) -> DirLockResult<(DerivedKey, Option<Salt>)> {
        match mode {
            LockMode::MasterKey => {
                let key = self.master_key.clone().ok_or(DirLockError::MasterKeyUnavailable)?;
                Ok((key, None))
            }
            LockMode::Password(password) => {
                if password.is_empty() {
                    return Err(DirLockError::PasswordRequired);
                }
                let salt = Salt::random();
                let key = derive_key(password, &salt, &self.kdf)?;
                Ok((key, Some(salt)))
            }
        }
    }

    fn key_for_unlock(&self, record: &LockedDirectoryRecord, password: Option<&str>) -> DirLockResult<DerivedKey> {
        if record.uses_master_key {
            return self.master_key.clone().ok_or(DirLockError::MasterKeyUnavailable);
        }
        let password = password
            .filter(|p| !p.is_empty())
            .ok_or(DirLockError::PasswordRequired)?;
        let salt_bytes = record
            .password_salt
            .as_deref()
            .ok_or_else(|| DirLockError::CorruptArchive("lock record has no salt".into()))?;
        let salt = Salt::from_slice(salt_bytes)?;
        Ok(derive_key(password, &salt, &self.kdf)?)
    }

    /// Rebuilds the directory from its archive after a failed lock. The
    /// original tree may already be partly or fully deleted at this point.
    fn rollback_lock(
        &self,
        abs: &Path,
        key: &DerivedKey,
        original: &Path,
        root_perms: &fs::Permissions,
        hide: bool,
    ) {
        warn!("rolling back lock of {}", abs.display());
        if hide {
            if let Err(e) = set_hidden(abs, false) {
                warn!("failed to clear hidden attribute on {}: {e}", abs.display());
            }
        }
        if let Err(e) = set_mode(abs, READ_MODE) {
            warn!("failed to open up archive {}: {e}", abs.display());
        }

        let restoring = sibling(abs, "restoring");
        remove_dir_quietly(&restoring);
        if let Err(e) = extract_archive(abs, key, &restoring) {
            warn!("failed to rebuild {} from its archive, archive left in place: {e}", abs.display());
            remove_dir_quietly(&restoring);
            return;
        }
        if let Err(e) = fs::remove_file(abs) {
            warn!("failed to remove archive {}: {e}", abs.display());
            remove_dir_quietly(&restoring);
            return;
        }
        if let Err(e) = fs::rename(&restoring, abs) {
            warn!("failed to move {} into place: {e}", restoring.display());
            return;
        }
        if let Err(e) = fs::set_permissions(abs, root_perms.clone()) {
            warn!("failed to restore permissions on {}: {e}", abs.display());
        }
        sync_parent(abs);

        if fs::symlink_metadata(original).is_ok() {
            if let Err(e) = (self.remove_tree)(original) {
                warn!("failed to remove original tree {}: {e}", original.display());
            }
        }
    }

    fn rollback_unlock(&self, abs: &Path, archived: &Path, staging: &Path, hidden: bool) {
        warn!("rolling back unlock of {}", abs.display());
        if let Err(e) = fs::rename(abs, staging) {
            warn!("failed to move {} aside: {e}", abs.display());
            return;
        }
        if let Err(e) = fs::rename(archived, abs) {
            warn!("failed to restore archive {}: {e}", abs.display());
            return;
        }
        reseal(abs, hidden);
        remove_dir_quietly(staging);
    }
}

/// Canonical form of an existing path.
fn resolve_existing(path: &Path) -> DirLockResult<PathBuf> {
    fs::canonicalize(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => DirLockError::NotFound(path.to_path_buf()),
        _ => DirLockError::Io(e),
    })
}

/// Canonical form when the path exists, otherwise the plain absolute form.
fn resolve(path: &Path) -> DirLockResult<PathBuf> {
    match fs::canonicalize(path) {
        Ok(abs) => Ok(abs),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(std::path::absolute(path)?),
        Err(e) => Err(e.into()),
    }
}

fn record_key(abs: &Path) -> String {
    abs.to_string_lossy().into_owned()
}

/// `<parent>/.<name>.ark-<suffix>`, on the same filesystem as `path`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.ark-{suffix}"))
}

fn remove_tree(path: &Path) -> io::Result<()> {
    fs::remove_dir_all(path)
}

fn seal(abs: &Path, hide: bool) -> DirLockResult<()> {
    set_mode(abs, LOCKED_MODE)?;
    if hide {
        set_hidden(abs, true)?;
    }
    Ok(())
}

fn reseal(abs: &Path, hide: bool) {
    if let Err(e) = seal(abs, hide) {
        warn!("failed to reseal archive {}: {e}", abs.display());
    }
}

fn sync_parent(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::File::open(parent).and_then(|d| d.sync_all()) {
                debug!("failed to sync {}: {e}", parent.display());
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("failed to clean up {}: {e}", path.display());
        }
    }
}

fn remove_dir_quietly(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("failed to clean up {}: {e}", path.display());
        }
    }
}
