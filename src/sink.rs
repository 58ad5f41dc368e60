//! Capability abstractions the engine consumes instead of reaching for
//! process-wide state directly: a log sink, a mount enumerator, and a
//! free-space probe, each a small injected trait so a pool engine can be
//! constructed with fakes in tests.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::logging::LogEvent;

/// Accepts structured engine events. Implementations must be cheap to call
/// from hot paths (one event per file during repair/integrity scans).
pub trait LogSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

/// Discards every event. The engine's default when no sink is supplied.
pub struct NoopSink;

impl LogSink for NoopSink {
    fn emit(&self, _event: LogEvent) {}
}

/// Lists candidate mount roots to scan for volume descriptors. On POSIX the
/// caller supplies the roots it wants scanned; `FixedRoots` is the
/// straightforward implementation.
pub trait MountEnumerator: Send + Sync {
    fn enumerate_mount_roots(&self) -> Vec<PathBuf>;
}

/// A fixed, caller-supplied list of candidate roots.
pub struct FixedRoots(pub Vec<PathBuf>);

impl MountEnumerator for FixedRoots {
    fn enumerate_mount_roots(&self) -> Vec<PathBuf> {
        self.0.clone()
    }
}

/// Enumerates `A:\`–`Z:\` on Windows; unusable (empty) elsewhere, since
/// POSIX mount discovery has no universal convention and the caller must
/// supply roots via [`FixedRoots`] instead.
pub struct DriveLetterRoots;

impl MountEnumerator for DriveLetterRoots {
    fn enumerate_mount_roots(&self) -> Vec<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            (b'A'..=b'Z')
                .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
                .filter(|p| p.is_dir())
                .collect()
        }
        #[cfg(not(target_os = "windows"))]
        {
            Vec::new()
        }
    }
}

/// Queries free/total bytes for a filesystem path.
pub trait FreeSpaceProbe: Send + Sync {
    fn get_disk_free_space(&self, path: &Path) -> Result<(u64, u64)>;
}

/// POSIX implementation backed by `statvfs`.
#[cfg(unix)]
pub struct StatvfsProbe;

#[cfg(unix)]
impl FreeSpaceProbe for StatvfsProbe {
    fn get_disk_free_space(&self, path: &Path) -> Result<(u64, u64)> {
        let stats = nix::sys::statvfs::statvfs(path)
            .map_err(|e| crate::error::PoolError::io(path, std::io::Error::from_raw_os_error(e as i32)))?;
        let free = stats.blocks_available() * stats.block_size();
        let total = stats.blocks() * stats.block_size();
        Ok((free, total))
    }
}
