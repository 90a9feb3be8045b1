//! Filesystem side effects applied to archives: permission bits and the
//! OS "hidden" attribute.

use std::fs;
use std::io;
use std::path::Path;

/// Sets permission bits. Off unix only the owner-write bit is honoured, via
/// the read-only flag.
pub(crate) fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }
    #[cfg(not(unix))]
    {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(mode & 0o200 == 0);
        fs::set_permissions(path, perms)
    }
}

/// Applies or clears the hidden attribute: `chflags` on macOS, `attrib` on
/// Windows. Other platforms have no such attribute and this is a no-op.
pub(crate) fn set_hidden(path: &Path, hidden: bool) -> io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        run("chflags", if hidden { "hidden" } else { "nohidden" }, path)
    }
    #[cfg(windows)]
    {
        run("attrib", if hidden { "+h" } else { "-h" }, path)
    }
    #[cfg(not(any(target_os = "macos", windows)))]
    {
        tracing::debug!(hidden, "hidden attribute not supported here: {}", path.display());
        Ok(())
    }
}

#[cfg(any(target_os = "macos", windows))]
fn run(program: &str, flag: &str, path: &Path) -> io::Result<()> {
    let status = std::process::Command::new(program).arg(flag).arg(path).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("{program} {flag} failed with {status}")))
    }
}
