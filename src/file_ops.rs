//! File Ops: atomic mutations shared by the duplication
//! engine, repair fixers and rebalancer. Every destructive operation follows
//! a temp-then-rename pattern: write to a `.TEMP.$DRIVEBENDER` sibling, then
//! rename into place.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use crate::error::{IoResultExt, PoolError, Result};
use crate::path::FolderPath;
use crate::sentinel;

const MOVE_RETRY_ATTEMPTS: u32 = 3;
const MOVE_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Removes read-only/hidden/system attributes so a subsequent delete cannot
/// fail on them. A no-op on platforms without such attributes.
fn clear_restrictive_attributes(path: &Path) -> Result<()> {
    if let Ok(metadata) = fs::metadata(path) {
        let mut perms = metadata.permissions();
        if perms.readonly() {
            perms.set_readonly(false);
            fs::set_permissions(path, perms).path_ctx(path)?;
        }
    }
    Ok(())
}

/// Copies `source` to `dest` via a temp file, then renames into place.
/// `dest`'s parent directory is created if missing. On any failure after the
/// temp file is written, the temp file is removed before the error
/// propagates, so a failed copy never leaves a dangling `.TEMP.$DRIVEBENDER`.
pub fn atomic_copy(source: &Path, dest: &Path) -> Result<()> {
    let parent = dest.parent().ok_or_else(|| PoolError::invalid("destination has no parent directory"))?;
    fs::create_dir_all(parent).path_ctx(parent)?;

    let temp_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .map(sentinel::temp_name)
        .ok_or_else(|| PoolError::invalid("destination has no file name"))?;
    let temp_path = parent.join(temp_name);

    let copy_result = fs::copy(source, &temp_path).path_ctx(source);
    if let Err(e) = copy_result {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, dest).path_ctx(dest) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(())
}

/// Deletes `path`, clearing restrictive attributes first. Absent file is a
/// no-op.
pub fn delete(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    clear_restrictive_attributes(path)?;
    fs::remove_file(path).path_ctx(path)?;
    Ok(())
}

/// Moves `source` to `dest` via atomic copy-then-delete-original. If deleting
/// `source` fails with access-denied, retries deleting `dest` (the copy just
/// written) up to `MOVE_RETRY_ATTEMPTS` times with backoff, to avoid ending up
/// with two copies of the file, then propagates the original access-denied
/// error regardless of whether that rollback succeeded.
pub fn move_file(source: &Path, dest: &Path) -> Result<()> {
    atomic_copy(source, dest)?;

    match delete(source) {
        Ok(()) => Ok(()),
        Err(e @ PoolError::AccessDenied(_)) => {
            for _ in 0..MOVE_RETRY_ATTEMPTS {
                sleep(MOVE_RETRY_BACKOFF);
                if delete(dest).is_ok() {
                    break;
                }
            }
            Err(e)
        }
        Err(e) => {
            let _ = delete(dest);
            Err(e)
        }
    }
}

/// Where `logical_path` lives under `volume_root` for the given role:
/// the plain logical path for a primary, or under the folder's base shadow
/// sentinel for a shadow.
pub fn role_path(volume_root: &Path, logical_path: &FolderPath, as_primary: bool) -> PathBuf {
    if as_primary {
        return volume_root.join(logical_path.to_relative_path());
    }
    let dir = logical_path.parent();
    let base_name = logical_path.name().unwrap_or_default();
    volume_root
        .join(dir.to_relative_path())
        .join(sentinel::SHADOW_FOLDER_NAME)
        .join(base_name)
}

/// Moves a physical file to `target_volume_root`, preserving its role iff
/// moving within the same role: `as_primary`
/// selects whether the destination sits at the plain logical path (primary)
/// or under the folder's base shadow sentinel (shadow).
pub fn move_to_drive(source: &Path, target_volume_root: &Path, logical_path: &FolderPath, as_primary: bool) -> Result<PathBuf> {
    let dest = role_path(target_volume_root, logical_path, as_primary);
    move_file(source, &dest)?;
    Ok(dest)
}
