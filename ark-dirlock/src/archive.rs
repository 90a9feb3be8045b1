//! Archive container for a locked directory.
//!
//! A zip file with stored (uncompressed) entries mirroring the directory's
//! relative layout. Each file entry holds `EncryptedBlob(dir_key, contents)`;
//! directory entries carry no data and keep empty subdirectories alive.
//! Unix permission bits are recorded per entry and restored on extraction.

use crate::error::{DirLockError, DirLockResult};
use ark_crypto::{decrypt, encrypt, DerivedKey};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub files: usize,
    pub dirs: usize,
    /// Symlinks and special files left out of the archive.
    pub skipped: usize,
}

/// Encrypts every regular file under `root` into a new archive at `dest`.
/// The archive is fsynced before returning.
pub fn write_archive(root: &Path, key: &DerivedKey, dest: &Path) -> DirLockResult<ArchiveSummary> {
    let file = create_private_file(dest)?;
    let mut zip = ZipWriter::new(file);
    let mut summary = ArchiveSummary::default();

    add_dir(&mut zip, root, root, key, &mut summary)?;

    let file = zip.finish()?;
    file.sync_all()?;
    debug!(
        files = summary.files,
        dirs = summary.dirs,
        skipped = summary.skipped,
        "wrote archive {}",
        dest.display()
    );
    Ok(summary)
}

fn add_dir<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    root: &Path,
    dir: &Path,
    key: &DerivedKey,
    summary: &mut ArchiveSummary,
) -> DirLockResult<()> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let meta = fs::symlink_metadata(&path)?;
        let name = entry_name(root, &path)?;

        if meta.file_type().is_symlink() {
            warn!("skipping symlink {}", path.display());
            summary.skipped += 1;
        } else if meta.is_dir() {
            zip.add_directory(name, entry_options(&meta, false))?;
            summary.dirs += 1;
            add_dir(zip, root, &path, key, summary)?;
        } else if meta.is_file() {
            let blob = encrypt(key, &fs::read(&path)?)?;
            let large = blob.len() as u64 >= u64::from(u32::MAX);
            zip.start_file(name, entry_options(&meta, large))?;
            zip.write_all(blob.as_bytes())?;
            summary.files += 1;
        } else {
            warn!("skipping special file {}", path.display());
            summary.skipped += 1;
        }
    }
    Ok(())
}

/// Decrypts every entry of the archive at `archive` into `dest`, which must
/// not exist yet. Any entry failing authentication aborts the extraction;
/// the caller discards `dest`.
pub fn extract_archive(archive: &Path, key: &DerivedKey, dest: &Path) -> DirLockResult<ArchiveSummary> {
    let mut zip = ZipArchive::new(BufReader::new(File::open(archive)?))
        .map_err(|e| DirLockError::CorruptArchive(e.to_string()))?;
    create_private_dir(dest)?;

    let mut summary = ArchiveSummary::default();
    let mut dir_modes: Vec<(PathBuf, u32)> = Vec::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let name = entry.name().to_string();
        let rel = entry
            .enclosed_name()
            .ok_or_else(|| DirLockError::CorruptArchive(format!("unsafe entry name: {name}")))?;
        let target = dest.join(&rel);
        let mode = entry.unix_mode().map(|m| m & 0o7777);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            if let Some(mode) = mode {
                dir_modes.push((target, mode));
            }
            summary.dirs += 1;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut blob = Vec::new();
        entry.read_to_end(&mut blob)?;
        let plain = decrypt(key, &blob)
            .map_err(|_| DirLockError::CorruptArchive(format!("entry failed authentication: {name}")))?;

        let mut out = create_private_file(&target)?;
        out.write_all(&plain)?;
        out.sync_all()?;
        if let Some(mode) = mode {
            set_unix_mode(&target, mode)?;
        }
        summary.files += 1;
    }

    // Children before parents, so a read-only directory is applied last.
    for (dir, mode) in dir_modes.iter().rev() {
        set_unix_mode(dir, *mode)?;
    }

    debug!(files = summary.files, dirs = summary.dirs, "extracted archive into {}", dest.display());
    Ok(summary)
}

/// Relative path of `path` under `root`, `/`-separated.
fn entry_name(root: &Path, path: &Path) -> io::Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("file name is not valid UTF-8: {}", path.display()),
                )
            })?),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unexpected path component in {}", path.display()),
                ));
            }
        }
    }
    Ok(parts.join("/"))
}

fn entry_options(meta: &fs::Metadata, large: bool) -> SimpleFileOptions {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(large);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options.unix_permissions(meta.permissions().mode() & 0o7777)
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        options
    }
}

fn create_private_file(path: &Path) -> io::Result<File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn create_private_dir(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}

fn set_unix_mode(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}
