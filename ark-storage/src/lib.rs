//! Encrypted key-value storage for Ark.
//!
//! Records live in named buckets (one DuckDB table each). Every value is
//! JSON-encoded and then encrypted individually through a
//! [`DataEncryptor`](ark_crypto::DataEncryptor); keys stay plaintext so
//! listing and key search work without decryption.
//!
//! # Architecture
//!
//! - [`Bucket`] is a closed set of partitions, created when the store opens
//! - [`Record`] ties a value type to its bucket for typed access
//! - [`Database`] owns the connection and an exclusive lock on the store file
//! - [`models`] holds the record types shared by the domain crates

mod bucket;
mod database;
mod error;
pub mod models;

pub use bucket::{Bucket, Record};
pub use database::{Database, DEFAULT_OPEN_TIMEOUT};
pub use error::{StorageError, StorageResult};

/// Open a DuckDB connection with stale WAL recovery and resource limits.
///
/// If the initial open fails and a `.wal` file exists alongside the database,
/// it is removed and the open is retried once. The caller must already hold
/// the store's exclusive lock, otherwise the WAL could belong to a live writer.
pub(crate) fn open_duckdb_with_wal_recovery(
    path: &std::path::Path,
) -> StorageResult<duckdb::Connection> {
    let conn = match duckdb::Connection::open(path) {
        Ok(c) => c,
        Err(first_err) => {
            let wal_path = wal_path_for(path);
            if wal_path.exists() {
                tracing::warn!(
                    "DuckDB open failed, removing stale WAL and retrying: {}",
                    wal_path.display()
                );
                if std::fs::remove_file(&wal_path).is_ok() {
                    let c = duckdb::Connection::open(path)?;
                    apply_resource_limits(&c)?;
                    return Ok(c);
                }
            }
            return Err(first_err.into());
        }
    };
    apply_resource_limits(&conn)?;
    Ok(conn)
}

pub(crate) fn wal_path_for(path: &std::path::Path) -> std::path::PathBuf {
    path.with_extension(
        path.extension()
            .map(|ext| format!("{}.wal", ext.to_string_lossy()))
            .unwrap_or_else(|| "wal".to_string()),
    )
}

/// Cap memory and threads; DuckDB defaults to ~80% of RAM and every core.
fn apply_resource_limits(conn: &duckdb::Connection) -> StorageResult<()> {
    conn.execute_batch("PRAGMA memory_limit='64MB'; PRAGMA threads=1;")?;
    Ok(())
}
