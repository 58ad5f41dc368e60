//! Duplication Engine: enables/disables per-folder shadow
//! copies and adjusts their count.

use std::fs;

use crate::error::{PoolError, Result};
use crate::file_ops;
use crate::overlay::{self, LogicalFile, LogicalItem};
use crate::path::FolderPath;
use crate::sentinel;
use crate::sink::FreeSpaceProbe;
use crate::size::DuplicationLevel;
use crate::volume::Volume;

/// Creates the shadow sentinel directories for `folder` on every volume, up
/// to `level`. Does not materialize any shadow
/// files — that is the repair engine's job.
pub fn enable(volumes: &[Volume], folder: &FolderPath, level: u32) -> Result<()> {
    let validated = DuplicationLevel::new(level, volumes.len())?;
    if validated.is_disabled() {
        return Err(PoolError::invalid("enable() requires a level of at least 1; use disable() for 0"));
    }
    create_sentinels_up_to(volumes, folder, validated.as_u8() as u32)
}

/// Ensures sentinel directories `0..level` exist under `folder` on every
/// volume, without touching any shadow file. Exposed for the repair
/// engine's `fix_missing_duplication_on_all_folders`.
pub fn ensure_sentinels(volumes: &[Volume], folder: &FolderPath, level: u32) -> Result<()> {
    create_sentinels_up_to(volumes, folder, level)
}

fn create_sentinels_up_to(volumes: &[Volume], folder: &FolderPath, level: u32) -> Result<()> {
    for volume in volumes {
        let base = volume.root().join(folder.to_relative_path());
        for k in 0..level {
            let sentinel_dir = base.join(sentinel::shadow_sentinel_name(k));
            fs::create_dir_all(&sentinel_dir).map_err(|e| PoolError::io(&sentinel_dir, e))?;
        }
    }
    Ok(())
}

/// Deletes every shadow copy under `folder` and removes the sentinel
/// directories themselves, on every volume.
pub fn disable(volumes: &[Volume], folder: &FolderPath) -> Result<()> {
    for item in overlay::get_items(volumes.to_vec(), folder.clone(), true) {
        if let LogicalItem::File(file) = item? {
            for shadow in &file.shadows {
                file_ops::delete(&shadow.path)?;
            }
        }
    }

    for volume in volumes {
        let base = volume.root().join(folder.to_relative_path());
        for k in 0.. {
            let sentinel_dir = base.join(sentinel::shadow_sentinel_name(k));
            if !sentinel_dir.is_dir() {
                break;
            }
            fs::remove_dir_all(&sentinel_dir).map_err(|e| PoolError::io(&sentinel_dir, e))?;
        }
    }
    Ok(())
}

/// The maximum observed `i+1` where a sentinel exists under `folder` on any
/// volume; `0` if none.
pub fn get_level(volumes: &[Volume], folder: &FolderPath) -> u32 {
    let mut max_k = None;
    for volume in volumes {
        let dir = volume.root().join(folder.to_relative_path());
        let Ok(entries) = fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
            if let Some(k) = sentinel::shadow_sentinel_index(&name) {
                max_k = Some(max_k.map_or(k, |m: u32| m.max(k)));
            }
        }
    }
    max_k.map(|k| k + 1).unwrap_or(0)
}

/// Sets the duplication level for `folder`, creating or removing per-file
/// shadow copies as needed to reach it.
pub fn set_level(volumes: &[Volume], probe: &dyn FreeSpaceProbe, folder: &FolderPath, level: u32) -> Result<()> {
    if level == 0 {
        return disable(volumes, folder);
    }

    let validated = DuplicationLevel::new(level, volumes.len())?;
    let target = validated.as_u8() as u32;
    let current = get_level(volumes, folder);

    create_sentinels_up_to(volumes, folder, target)?;

    if target > current {
        increase_shadow_copies(volumes, probe, folder, target)?;
    } else if target < current {
        decrease_shadow_copies(volumes, folder, target)?;
    }
    Ok(())
}

fn increase_shadow_copies(
    volumes: &[Volume],
    probe: &dyn FreeSpaceProbe,
    folder: &FolderPath,
    target: u32,
) -> Result<()> {
    for item in overlay::get_items(volumes.to_vec(), folder.clone(), true) {
        if let LogicalItem::File(mut file) = item? {
            while (file.shadows.len() as u32) < target {
                let Some(volume_index) = pick_target_volume(volumes, probe, &file)? else { break };
                create_additional_shadow(volumes, &mut file, volume_index)?;
            }
        }
    }
    Ok(())
}

fn decrease_shadow_copies(volumes: &[Volume], folder: &FolderPath, target: u32) -> Result<()> {
    for item in overlay::get_items(volumes.to_vec(), folder.clone(), true) {
        if let LogicalItem::File(file) = item? {
            let keep = target as usize;
            for shadow in file.shadows.iter().skip(keep) {
                file_ops::delete(&shadow.path)?;
            }
        }
    }

    for volume in volumes {
        let base = volume.root().join(folder.to_relative_path());
        for k in target.. {
            let sentinel_dir = base.join(sentinel::shadow_sentinel_name(k));
            if !sentinel_dir.is_dir() {
                break;
            }
            // Only drop if now empty: other files may still use lower-numbered
            // siblings, but once `target` is below a sentinel's index, it is
            // guaranteed nothing under this folder still references it.
            let _ = fs::remove_dir_all(&sentinel_dir);
        }
    }
    Ok(())
}

/// Picks the volume with the most free space that does not already hold
/// `file` (as primary or shadow).
fn pick_target_volume(volumes: &[Volume], probe: &dyn FreeSpaceProbe, file: &LogicalFile) -> Result<Option<usize>> {
    let occupied: std::collections::HashSet<usize> = file
        .primaries
        .iter()
        .chain(file.shadows.iter())
        .map(|loc| loc.volume_index)
        .collect();

    let mut best: Option<(usize, u64)> = None;
    for (index, volume) in volumes.iter().enumerate() {
        if occupied.contains(&index) {
            continue;
        }
        let (free, _total) = probe.get_disk_free_space(&volume.root())?;
        if best.map(|(_, best_free)| free > best_free).unwrap_or(true) {
            best = Some((index, free));
        }
    }
    Ok(best.map(|(index, _)| index))
}

/// Creates one additional shadow copy of `file` on `target_volume_index`,
/// using the numbered sentinel `<sentinel>.<existing_count>` when the file
/// already has shadows.
pub fn create_additional_shadow(volumes: &[Volume], file: &mut LogicalFile, target_volume_index: usize) -> Result<()> {
    let source = file
        .primaries
        .first()
        .or_else(|| file.shadows.first())
        .ok_or_else(|| PoolError::not_found("no source location available to copy from"))?;

    let base_name = file
        .full_name
        .name()
        .ok_or_else(|| PoolError::invalid("cannot shadow the pool root"))?;
    let dir = file.full_name.parent();
    let sentinel_name = sentinel::shadow_sentinel_name(file.shadows.len() as u32);
    let target_volume = &volumes[target_volume_index];
    let dest = target_volume
        .root()
        .join(dir.to_relative_path())
        .join(sentinel_name)
        .join(base_name);

    file_ops::atomic_copy(&source.path, &dest)?;
    file.shadows.push(crate::overlay::Location { volume_index: target_volume_index, path: dest });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PoolId;

    fn make_volume(dir: &std::path::Path, id: PoolId, label: &str) -> Volume {
        Volume::create(dir, id, label.to_string(), None).unwrap()
    }

    #[test]
    fn enable_creates_sentinel_directories_only() {
        let dirs: Vec<_> = (0..3).map(|_| tempfile::tempdir().unwrap()).collect();
        let id = PoolId::new();
        let volumes: Vec<_> = dirs.iter().map(|d| make_volume(d.path(), id, "A")).collect();
        fs::create_dir_all(volumes[0].root().join("docs")).unwrap();

        enable(&volumes, &FolderPath::new("docs").unwrap(), 2).unwrap();

        assert!(volumes[0].root().join("docs").join(sentinel::SHADOW_FOLDER_NAME).is_dir());
        assert!(volumes[0]
            .root()
            .join("docs")
            .join(format!("{}.1", sentinel::SHADOW_FOLDER_NAME))
            .is_dir());
    }

    #[test]
    fn enable_rejects_level_equal_to_volume_count() {
        let dirs: Vec<_> = (0..2).map(|_| tempfile::tempdir().unwrap()).collect();
        let id = PoolId::new();
        let volumes: Vec<_> = dirs.iter().map(|d| make_volume(d.path(), id, "A")).collect();

        assert!(enable(&volumes, &FolderPath::new("docs").unwrap(), 2).is_err());
    }

    #[test]
    fn get_level_reflects_highest_sentinel_index() {
        let dirs: Vec<_> = (0..4).map(|_| tempfile::tempdir().unwrap()).collect();
        let id = PoolId::new();
        let volumes: Vec<_> = dirs.iter().map(|d| make_volume(d.path(), id, "A")).collect();
        let folder = FolderPath::new("docs").unwrap();
        fs::create_dir_all(volumes[0].root().join("docs")).unwrap();

        assert_eq!(get_level(&volumes, &folder), 0);
        enable(&volumes, &folder, 3).unwrap();
        assert_eq!(get_level(&volumes, &folder), 3);
    }

    #[test]
    fn disable_removes_shadow_files_and_sentinels() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let volumes = vec![make_volume(dir_a.path(), id, "A"), make_volume(dir_b.path(), id, "B")];
        let folder = FolderPath::new("docs").unwrap();
        fs::create_dir_all(volumes[0].root().join("docs")).unwrap();
        fs::write(volumes[0].root().join("docs/a.txt"), b"x").unwrap();
        enable(&volumes, &folder, 1).unwrap();
        let shadow_dir = volumes[0].root().join("docs").join(sentinel::SHADOW_FOLDER_NAME);
        fs::write(shadow_dir.join("a.txt"), b"x").unwrap();

        disable(&volumes, &folder).unwrap();
        assert!(!shadow_dir.exists());
    }
}
