//! Output directory and file permission helpers.
//!
//! Jobs often run in containers whose user differs from the one reading the
//! results, so the output directory and every written file get read/write
//! for all users (`a+rw`). This is done with `std::fs` permissions directly;
//! on non-Unix targets the helpers leave permissions alone.

use std::io;
use std::path::Path;

/// Bits added by [`widen_permissions`].
#[cfg(unix)]
const WORLD_READ_WRITE: u32 = 0o666;

/// Create `dir` (and parents) and widen its permissions.
pub fn ensure_output_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    widen_permissions(dir)
}

/// Add read and write permission for owner, group and others to `path`.
#[cfg(unix)]
pub fn widen_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    let widened = perms.mode() | WORLD_READ_WRITE;
    if widened != perms.mode() {
        perms.set_mode(widened);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn widen_permissions(path: &Path) -> io::Result<()> {
    std::fs::metadata(path).map(|_| ())
}
