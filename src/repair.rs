//! Repair Engine: the five fixers that bring a pool's
//! physical layout back in line with its logical expectations, plus the
//! SetPrimary/SetShadow state machines they (and the duplication engine)
//! build on.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::cancel::CancellationToken;
use crate::duplication;
use crate::error::{PoolError, Result};
use crate::file_ops;
use crate::overlay::{self, LogicalFile, LogicalItem, Location};
use crate::path::FolderPath;
use crate::report::RepairReport;
use crate::sentinel;
use crate::sink::FreeSpaceProbe;
use crate::volume::Volume;

const COMPARE_BUF_SIZE: usize = 64 * 1024;

/// Ensures the configured shadow sentinel exists on every volume for every
/// folder that currently has files, without materializing any shadow
/// content. A folder whose sentinel can't be created (permissions, a
/// missing parent) is recorded as a warning rather than aborting the rest
/// of the pool.
pub fn fix_missing_duplication_on_all_folders(volumes: &[Volume], cancel: &CancellationToken) -> Result<RepairReport> {
    let mut report = RepairReport::default();
    let mut folders_seen = std::collections::HashSet::new();
    for item in overlay::get_items(volumes.to_vec(), FolderPath::ROOT, true) {
        if cancel.is_cancelled() {
            break;
        }
        let file = match item {
            Ok(LogicalItem::File(file)) => file,
            Ok(LogicalItem::Folder(_)) => continue,
            Err(e) => {
                report.warnings.push(e.to_string());
                continue;
            }
        };
        let folder = file.full_name.parent();
        if !folders_seen.insert(folder.clone()) {
            continue;
        }
        let level = duplication::get_level(volumes, &folder);
        if level > 0 {
            match duplication::ensure_sentinels(volumes, &folder, level) {
                Ok(()) => report.sentinels_created += 1,
                Err(e) => report.warnings.push(format!("{folder}: {e}")),
            }
        }
    }
    Ok(report)
}

/// Collapses duplicate primary locations, keeping the first and deleting
/// every other primary whose content matches it byte-for-byte. Primaries
/// that differ are left for the integrity checker to flag as
/// `HashMismatch`.
pub fn fix_duplicate_primaries(volumes: &[Volume], cancel: &CancellationToken) -> Result<RepairReport> {
    let mut report = RepairReport::default();
    for item in overlay::get_items(volumes.to_vec(), FolderPath::ROOT, true) {
        if cancel.is_cancelled() {
            break;
        }
        let file = match item {
            Ok(LogicalItem::File(file)) => file,
            Ok(LogicalItem::Folder(_)) => continue,
            Err(e) => {
                report.warnings.push(e.to_string());
                continue;
            }
        };
        match dedupe_locations(&file.primaries) {
            Ok(removed) => report.primaries_deduped += removed,
            Err(e) => report.warnings.push(format!("{}: {e}", file.full_name)),
        }
    }
    Ok(report)
}

/// Analogous to [`fix_duplicate_primaries`] over shadow locations.
pub fn fix_duplicate_shadow_copies(volumes: &[Volume], cancel: &CancellationToken) -> Result<RepairReport> {
    let mut report = RepairReport::default();
    for item in overlay::get_items(volumes.to_vec(), FolderPath::ROOT, true) {
        if cancel.is_cancelled() {
            break;
        }
        let file = match item {
            Ok(LogicalItem::File(file)) => file,
            Ok(LogicalItem::Folder(_)) => continue,
            Err(e) => {
                report.warnings.push(e.to_string());
                continue;
            }
        };
        match dedupe_locations(&file.shadows) {
            Ok(removed) => report.shadows_deduped += removed,
            Err(e) => report.warnings.push(format!("{}: {e}", file.full_name)),
        }
    }
    Ok(report)
}

/// Deletes every location after the first that is byte-for-byte identical
/// to it, returning how many were removed.
fn dedupe_locations(locations: &[Location]) -> Result<u64> {
    let Some((kept, rest)) = locations.split_first() else { return Ok(0) };
    let mut removed = 0;
    for candidate in rest {
        if files_equal(&kept.path, &candidate.path)? {
            file_ops::delete(&candidate.path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn files_equal(a: &Path, b: &Path) -> Result<bool> {
    let meta_a = fs::metadata(a).map_err(|e| PoolError::io(a, e))?;
    let meta_b = fs::metadata(b).map_err(|e| PoolError::io(b, e))?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    let mut ra = BufReader::new(File::open(a).map_err(|e| PoolError::io(a, e))?);
    let mut rb = BufReader::new(File::open(b).map_err(|e| PoolError::io(b, e))?);
    let mut buf_a = [0u8; COMPARE_BUF_SIZE];
    let mut buf_b = [0u8; COMPARE_BUF_SIZE];

    loop {
        let read_a = ra.read(&mut buf_a).map_err(|e| PoolError::io(a, e))?;
        let read_b = rb.read(&mut buf_b).map_err(|e| PoolError::io(b, e))?;
        if read_a != read_b {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
        if buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
    }
}

/// Promotes the first shadow location to primary for every logical file with
/// zero primaries.
pub fn fix_missing_primaries(volumes: &[Volume], cancel: &CancellationToken) -> Result<RepairReport> {
    let mut report = RepairReport::default();
    for item in overlay::get_items(volumes.to_vec(), FolderPath::ROOT, true) {
        if cancel.is_cancelled() {
            break;
        }
        let file = match item {
            Ok(LogicalItem::File(file)) => file,
            Ok(LogicalItem::Folder(_)) => continue,
            Err(e) => {
                report.warnings.push(e.to_string());
                continue;
            }
        };
        if file.primaries.is_empty() {
            if let Some(shadow) = file.shadows.first() {
                match set_primary(volumes, &file, shadow.volume_index) {
                    Ok(()) => report.primaries_restored += 1,
                    Err(e) => report.warnings.push(format!("{}: {e}", file.full_name)),
                }
            }
        }
    }
    Ok(report)
}

/// Materializes a shadow copy for every logical file with none, on the
/// volume with the greatest free space that isn't already the file's
/// primary.
pub fn fix_missing_shadow_copies(
    volumes: &[Volume],
    probe: &dyn FreeSpaceProbe,
    cancel: &CancellationToken,
) -> Result<RepairReport> {
    let mut report = RepairReport::default();
    for item in overlay::get_items(volumes.to_vec(), FolderPath::ROOT, true) {
        if cancel.is_cancelled() {
            break;
        }
        let file = match item {
            Ok(LogicalItem::File(file)) => file,
            Ok(LogicalItem::Folder(_)) => continue,
            Err(e) => {
                report.warnings.push(e.to_string());
                continue;
            }
        };
        if file.shadows.is_empty() && !file.primaries.is_empty() {
            let primary_volume = file.primaries[0].volume_index;
            match pick_largest_free_excluding(volumes, probe, primary_volume) {
                Ok(Some(target)) => match set_shadow(volumes, &file, target) {
                    Ok(()) => report.shadows_restored += 1,
                    Err(e) => report.warnings.push(format!("{}: {e}", file.full_name)),
                },
                Ok(None) => report.warnings.push(format!("{}: no eligible volume for a shadow copy", file.full_name)),
                Err(e) => report.warnings.push(format!("{}: {e}", file.full_name)),
            }
        }
    }
    Ok(report)
}

pub(crate) fn pick_largest_free_excluding(volumes: &[Volume], probe: &dyn FreeSpaceProbe, exclude: usize) -> Result<Option<usize>> {
    let mut best: Option<(usize, u64)> = None;
    for (index, volume) in volumes.iter().enumerate() {
        if index == exclude {
            continue;
        }
        let (free, _total) = probe.get_disk_free_space(&volume.root())?;
        if best.map(|(_, best_free)| free > best_free).unwrap_or(true) {
            best = Some((index, free));
        }
    }
    Ok(best.map(|(index, _)| index))
}

fn primary_path(volume: &Volume, file: &LogicalFile) -> PathBuf {
    volume.root().join(file.full_name.to_relative_path())
}

/// First sentinel index at `volume`/`dir` that doesn't already hold
/// `base_name`, creating the sentinel directory if it doesn't exist yet.
fn next_free_shadow_slot(volume: &Volume, dir: &FolderPath, base_name: &str) -> Result<PathBuf> {
    for k in 0..u32::MAX {
        let sentinel_dir = volume.root().join(dir.to_relative_path()).join(sentinel::shadow_sentinel_name(k));
        let candidate = sentinel_dir.join(base_name);
        if !candidate.exists() {
            fs::create_dir_all(&sentinel_dir).map_err(|e| PoolError::io(&sentinel_dir, e))?;
            return Ok(candidate);
        }
    }
    Err(PoolError::invalid("no free shadow slot available"))
}

/// SetPrimary state machine: makes `target_volume_index` hold
/// a primary copy of `file`.
pub fn set_primary(volumes: &[Volume], file: &LogicalFile, target_volume_index: usize) -> Result<()> {
    let target = &volumes[target_volume_index];
    let target_primary = primary_path(target, file);

    if target_primary.is_file() {
        return Ok(());
    }

    if let Some(shadow) = file.shadows.iter().find(|l| l.volume_index == target_volume_index) {
        if let Some(parent) = target_primary.parent() {
            fs::create_dir_all(parent).map_err(|e| PoolError::io(parent, e))?;
        }
        fs::rename(&shadow.path, &target_primary).map_err(|e| PoolError::io(&shadow.path, e))?;

        if let Some(old_primary) = file.primaries.iter().find(|p| p.volume_index != target_volume_index) {
            let old_volume = &volumes[old_primary.volume_index];
            let dir = file.full_name.parent();
            let base_name = file.full_name.name().unwrap_or_default();
            let new_shadow_path = next_free_shadow_slot(old_volume, &dir, base_name)?;
            if let Err(e) = fs::rename(&old_primary.path, &new_shadow_path) {
                let _ = fs::rename(&target_primary, &shadow.path);
                return Err(PoolError::io(&old_primary.path, e));
            }
        }
        return Ok(());
    }

    let source = file
        .primaries
        .first()
        .or_else(|| file.shadows.first())
        .ok_or_else(|| PoolError::not_found("no source location available to promote"))?;

    file_ops::atomic_copy(&source.path, &target_primary)?;

    if let Some(old_primary) = file.primaries.first() {
        if let Err(e) = file_ops::delete(&old_primary.path) {
            let _ = file_ops::delete(&target_primary);
            return Err(e);
        }
    }
    Ok(())
}

/// SetShadow state machine: symmetric to [`set_primary`] with
/// primary/shadow roles exchanged.
pub fn set_shadow(volumes: &[Volume], file: &LogicalFile, target_volume_index: usize) -> Result<()> {
    let target = &volumes[target_volume_index];
    let dir = file.full_name.parent();
    let base_name = file.full_name.name().unwrap_or_default();

    if file.shadows.iter().any(|l| l.volume_index == target_volume_index) {
        return Ok(());
    }

    if let Some(primary) = file.primaries.iter().find(|p| p.volume_index == target_volume_index) {
        let new_shadow_path = next_free_shadow_slot(target, &dir, base_name)?;
        fs::rename(&primary.path, &new_shadow_path).map_err(|e| PoolError::io(&primary.path, e))?;

        if let Some(old_shadow) = file.shadows.iter().find(|s| s.volume_index != target_volume_index) {
            let old_volume = &volumes[old_shadow.volume_index];
            let new_primary_path = primary_path(old_volume, file);
            if let Err(e) = fs::rename(&old_shadow.path, &new_primary_path) {
                let _ = fs::rename(&new_shadow_path, &primary.path);
                return Err(PoolError::io(&old_shadow.path, e));
            }
        }
        return Ok(());
    }

    let source = file
        .primaries
        .first()
        .or_else(|| file.shadows.first())
        .ok_or_else(|| PoolError::not_found("no source location available to shadow"))?;

    let dest = next_free_shadow_slot(target, &dir, base_name)?;
    file_ops::atomic_copy(&source.path, &dest)?;

    if let Some(old_shadow) = file.shadows.first() {
        if let Err(e) = file_ops::delete(&old_shadow.path) {
            let _ = file_ops::delete(&dest);
            return Err(e);
        }
    }
    Ok(())
}
