//! Per-path advisory locks.
//!
//! Lock and unlock take an exclusive OS file lock on
//! `<locks_dir>/<sha256(path)>.lock` for the duration of the transform. The
//! lock is released when the guard drops; the lock file itself is left behind.

use crate::error::{DirLockError, DirLockResult};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct PathLock {
    _file: File,
    lock_path: PathBuf,
}

impl PathLock {
    /// Fails with [`DirLockError::Busy`] if another guard holds `target`.
    pub fn acquire(locks_dir: &Path, target: &Path) -> DirLockResult<Self> {
        fs::create_dir_all(locks_dir)?;
        let lock_path = locks_dir.join(lock_file_name(target));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        match file.try_lock() {
            Ok(()) => Ok(Self { _file: file, lock_path }),
            Err(TryLockError::WouldBlock) => Err(DirLockError::Busy(target.to_path_buf())),
            Err(TryLockError::Error(e)) => Err(e.into()),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

fn lock_file_name(target: &Path) -> String {
    let digest = Sha256::digest(target.as_os_str().as_encoded_bytes());
    format!("{}.lock", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_guard_on_same_path_is_busy() {
        let dir = TempDir::new().unwrap();
        let target = Path::new("/some/project");

        let first = PathLock::acquire(dir.path(), target).unwrap();
        assert!(matches!(PathLock::acquire(dir.path(), target), Err(DirLockError::Busy(_))));

        drop(first);
        PathLock::acquire(dir.path(), target).unwrap();
    }

    #[test]
    fn different_paths_do_not_contend() {
        let dir = TempDir::new().unwrap();
        let a = PathLock::acquire(dir.path(), Path::new("/a")).unwrap();
        let b = PathLock::acquire(dir.path(), Path::new("/b")).unwrap();
        assert_ne!(a.lock_path(), b.lock_path());
    }
}
