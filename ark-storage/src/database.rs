//! DuckDB-backed bucket store.
//!
//! One table per [`Bucket`], each `(key VARCHAR PRIMARY KEY, value BLOB)`.
//! Values are `encrypt(json(value))` through the configured
//! [`DataEncryptor`]. Every write runs in its own transaction.
//!
//! A sidecar `<store>.lock` file is held exclusively for the lifetime of the
//! [`Database`] (and all of its clones), so a second process opening the same
//! store waits up to the open timeout and then fails with
//! [`StorageError::Locked`].

use crate::bucket::{Bucket, Record};
use crate::error::{StorageError, StorageResult};
use crate::{open_duckdb_with_wal_recovery, wal_path_for};
use ark_crypto::DataEncryptor;
use duckdb::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long [`Database::open`] waits for another process to release the store.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(1);

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Handle to an open store. Clones share the connection and the file lock.
#[derive(Clone)]
pub struct Database {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
    encryptor: Arc<dyn DataEncryptor>,
    rename: fn(&Path, &Path) -> io::Result<()>,
    _lock: Arc<File>,
}

impl Database {
    /// Opens (or creates) the store at `path`, ensuring every bucket exists.
    pub fn open(path: impl AsRef<Path>, encryptor: Arc<dyn DataEncryptor>) -> StorageResult<Self> {
        Self::open_with_timeout(path, encryptor, DEFAULT_OPEN_TIMEOUT)
    }

    pub fn open_with_timeout(
        path: impl AsRef<Path>,
        encryptor: Arc<dyn DataEncryptor>,
        timeout: Duration,
    ) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent)?;
        }

        let lock = acquire_lock(&lock_path_for(&path), timeout)?;
        let conn = open_duckdb_with_wal_recovery(&path)?;
        ensure_buckets(&conn)?;
        info!("opened store at {}", path.display());

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
            encryptor,
            rename: rename_file,
            _lock: Arc::new(lock),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Storage(format!("connection mutex poisoned: {e}")))
    }

    // ── Raw bucket operations ───────────────────────────────────────

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<T: Serialize + ?Sized>(&self, bucket: Bucket, key: &str, value: &T) -> StorageResult<()> {
        let json = serde_json::to_vec(value).map_err(|e| StorageError::Encode(e.to_string()))?;
        let blob = self
            .encryptor
            .encrypt_bytes(&json)
            .map_err(|e| StorageError::Encrypt(e.to_string()))?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!("INSERT OR REPLACE INTO {} (key, value) VALUES (?, ?)", bucket.table()),
            params![key, blob],
        )
        .map_err(|e| bucket_error(bucket, e))?;
        tx.commit()?;

        debug!(%bucket, key, "stored value");
        Ok(())
    }

    /// Loads and decodes the value under `key`.
    pub fn get<T: DeserializeOwned>(&self, bucket: Bucket, key: &str) -> StorageResult<T> {
        let blob: Vec<u8> = {
            let conn = self.lock()?;
            let result = conn.query_row(
                &format!("SELECT value FROM {} WHERE key = ?", bucket.table()),
                params![key],
                |row| row.get(0),
            );
            match result {
                Ok(b) => b,
                Err(duckdb::Error::QueryReturnedNoRows) => {
                    return Err(StorageError::NotFound {
                        bucket,
                        key: key.to_string(),
                    });
                }
                Err(e) => return Err(bucket_error(bucket, e)),
            }
        };

        let json = self
            .encryptor
            .decrypt_bytes(&blob)
            .map_err(|e| StorageError::Decrypt(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| StorageError::Decode(e.to_string()))
    }

    /// Removes `key`. Removing an absent key is not an error.
    pub fn delete(&self, bucket: Bucket, key: &str) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx
            .execute(&format!("DELETE FROM {} WHERE key = ?", bucket.table()), params![key])
            .map_err(|e| bucket_error(bucket, e))?;
        tx.commit()?;

        debug!(%bucket, key, removed, "deleted key");
        Ok(())
    }

    /// All keys in `bucket`, in ascending byte order.
    pub fn list(&self, bucket: Bucket) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT key FROM {} ORDER BY key", bucket.table()))
            .map_err(|e| bucket_error(bucket, e))?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Keys containing `pattern` as a case-sensitive substring, in key order.
    pub fn search(&self, bucket: Bucket, pattern: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .list(bucket)?
            .into_iter()
            .filter(|k| k.contains(pattern))
            .collect())
    }

    pub fn exists(&self, bucket: Bucket, key: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE key = ?", bucket.table()),
                params![key],
                |row| row.get(0),
            )
            .map_err(|e| bucket_error(bucket, e))?;
        Ok(count > 0)
    }

    /// Number of keys in each bucket.
    pub fn stats(&self) -> StorageResult<BTreeMap<Bucket, u64>> {
        let conn = self.lock()?;
        let mut counts = BTreeMap::new();
        for bucket in Bucket::ALL {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", bucket.table()), [], |row| row.get(0))
                .map_err(|e| bucket_error(bucket, e))?;
            counts.insert(bucket, count.max(0) as u64);
        }
        Ok(counts)
    }

    // ── Typed records ───────────────────────────────────────────────

    pub fn put<R: Record>(&self, record: &R) -> StorageResult<()> {
        self.set(R::BUCKET, &record.record_key(), record)
    }

    pub fn fetch<R: Record>(&self, key: &str) -> StorageResult<R> {
        self.get(R::BUCKET, key)
    }

    pub fn remove<R: Record>(&self, key: &str) -> StorageResult<()> {
        self.delete(R::BUCKET, key)
    }

    /// Every record in `R`'s bucket, each decoded independently so one bad
    /// value does not hide the rest.
    pub fn fetch_all<R: Record>(&self) -> StorageResult<Vec<(String, StorageResult<R>)>> {
        let keys = self.list(R::BUCKET)?;
        Ok(keys
            .into_iter()
            .map(|key| {
                let record = self.fetch::<R>(&key);
                (key, record)
            })
            .collect())
    }

    // ── Backup / restore ────────────────────────────────────────────

    /// A consistent byte copy of the whole store file.
    pub fn backup(&self) -> StorageResult<Vec<u8>> {
        let conn = self.lock()?;
        conn.execute_batch("CHECKPOINT;")?;
        let bytes = std::fs::read(&self.path)?;
        info!("backed up store ({} bytes)", bytes.len());
        Ok(bytes)
    }

    /// Replaces the whole store with `bytes` from [`backup`](Self::backup).
    ///
    /// The bytes are written to a sibling temp file and opened once to
    /// validate them before the rename; a bad snapshot leaves the live store
    /// untouched. If the swap itself fails, the previous store file is
    /// reopened before the error is returned.
    pub fn restore(&self, bytes: &[u8]) -> StorageResult<()> {
        let tmp_path = sibling_path(&self.path, "restore");
        write_synced(&tmp_path, bytes)?;

        if let Err(e) = validate_snapshot(&tmp_path) {
            remove_if_present(&tmp_path);
            remove_if_present(&wal_path_for(&tmp_path));
            return Err(e);
        }

        let mut conn = self.lock()?;
        let old = std::mem::replace(&mut *conn, Connection::open_in_memory()?);
        if let Err((_, e)) = old.close() {
            warn!("error closing store before restore: {e}");
        }

        match self.install_snapshot(&tmp_path) {
            Ok(restored) => *conn = restored,
            Err(e) => {
                warn!("restore failed, reopening previous store: {e}");
                remove_if_present(&tmp_path);
                match open_duckdb_with_wal_recovery(&self.path).and_then(|c| ensure_buckets(&c).map(|()| c)) {
                    Ok(previous) => *conn = previous,
                    Err(reopen) => warn!("failed to reopen store {}: {reopen}", self.path.display()),
                }
                return Err(e);
            }
        }

        info!("restored store from backup ({} bytes)", bytes.len());
        Ok(())
    }

    /// Moves a validated snapshot over the closed store file and opens it.
    fn install_snapshot(&self, tmp_path: &Path) -> StorageResult<Connection> {
        (self.rename)(tmp_path, &self.path)?;
        remove_if_present(&wal_path_for(tmp_path));
        let wal = wal_path_for(&self.path);
        if wal.exists() {
            std::fs::remove_file(&wal)?;
        }

        let conn = open_duckdb_with_wal_recovery(&self.path)?;
        ensure_buckets(&conn)?;
        Ok(conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish_non_exhaustive()
    }
}

fn ensure_buckets(conn: &Connection) -> StorageResult<()> {
    let ddl: String = Bucket::ALL
        .iter()
        .map(|b| {
            format!(
                "CREATE TABLE IF NOT EXISTS {} (key VARCHAR PRIMARY KEY, value BLOB NOT NULL);\n",
                b.table()
            )
        })
        .collect();
    conn.execute_batch(&ddl)?;
    Ok(())
}

fn validate_snapshot(path: &Path) -> StorageResult<()> {
    let conn = Connection::open(path)
        .map_err(|e| StorageError::InvalidBackup(format!("not a store file: {e}")))?;
    for bucket in Bucket::ALL {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", bucket.table()), [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| StorageError::InvalidBackup(format!("missing bucket {bucket}: {e}")))?;
    }
    if let Err((_, e)) = conn.close() {
        return Err(StorageError::InvalidBackup(e.to_string()));
    }
    Ok(())
}

fn bucket_error(bucket: Bucket, err: duckdb::Error) -> StorageError {
    let msg = err.to_string();
    if msg.contains("does not exist") {
        StorageError::BucketMissing(bucket)
    } else {
        StorageError::Database(err)
    }
}

fn acquire_lock(path: &Path, timeout: Duration) -> StorageResult<File> {
    let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)?;
    let deadline = Instant::now() + timeout;
    loop {
        match file.try_lock() {
            Ok(()) => return Ok(file),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(StorageError::Locked(path.display().to_string()));
                }
                std::thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(TryLockError::Error(e)) => return Err(e.into()),
        }
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    sibling_path(path, "lock")
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

fn rename_file(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::rename(from, to)
}

fn remove_if_present(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("failed to remove {}: {e}", path.display());
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

fn create_private_dir(dir: &Path) -> StorageResult<()> {
    if dir.exists() {
        return Ok(());
    }
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)?;
    Ok(())
}
