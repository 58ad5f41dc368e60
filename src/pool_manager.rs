//! Pool Manager: pool and drive lifecycle operations.
//! Operates on a pool's current volume list; the caller (the top-level
//! engine) is responsible for resolving a pool name to that list and for
//! re-detecting volumes after a structural change.

use crate::cancel::CancellationToken;
use crate::config::PhysicalConfig;
use crate::error::{PoolError, Result};
use crate::file_ops;
use crate::identity::PoolId;
use crate::path::DrivePath;
use crate::physical::{self, PhysicalItem};
use crate::report::DriveRemovalReport;
use crate::size::ByteSize;
use crate::sink::FreeSpaceProbe;
use crate::volume::Volume;

/// Creates a fresh pool across `mounts`, each getting a `{<id>}` directory
/// and a descriptor file.
pub fn create_pool(
    mounts: &[DrivePath],
    volume_label: String,
    description: Option<String>,
) -> Result<(PoolId, Vec<Volume>)> {
    if mounts.is_empty() {
        return Err(PoolError::invalid("a pool needs at least one drive"));
    }
    let id = PoolId::new();
    let mut volumes = Vec::with_capacity(mounts.len());
    for mount in mounts {
        volumes.push(Volume::create(mount.as_path(), id, volume_label.clone(), description.clone())?);
    }
    Ok((id, volumes))
}

/// Tears down every volume of a pool.
pub fn delete_pool(volumes: &[Volume], remove_data: bool) -> Result<()> {
    for volume in volumes {
        volume.teardown(remove_data)?;
    }
    Ok(())
}

/// Adds a new drive to an existing pool, reusing its id.
pub fn add_drive(volumes: &[Volume], mount: &DrivePath, description: Option<String>) -> Result<Volume> {
    let existing = volumes.first().ok_or_else(|| PoolError::invalid("pool has no existing volumes"))?;
    Volume::create(mount.as_path(), existing.descriptor.id, existing.label().to_string(), description)
}

/// Result of checking whether a drive can be safely removed.
#[derive(Debug, Clone)]
pub struct DriveRemovalCheck {
    pub required: u64,
    pub available: u64,
    pub feasible: bool,
    pub shortfall: u64,
    /// `None` when feasible; otherwise a message naming the shortfall and
    /// suggesting how to close it.
    pub recommendation: Option<String>,
}

/// Sums the bytes occupied on `removing_index` and the free space across
/// every other volume, to decide whether removal is safe.
pub fn check_space_for_drive_removal(
    volumes: &[Volume],
    probe: &dyn FreeSpaceProbe,
    physical_config: &PhysicalConfig,
    removing_index: usize,
) -> Result<DriveRemovalCheck> {
    let removing = volumes.get(removing_index).ok_or_else(|| PoolError::invalid("no such volume index"))?;

    let mut required = 0u64;
    for item in physical::enumerate(&removing.root(), physical_config) {
        if let PhysicalItem::File { size, .. } = item? {
            required += size;
        }
    }

    let mut available = 0u64;
    for (index, volume) in volumes.iter().enumerate() {
        if index == removing_index {
            continue;
        }
        let (free, _total) = probe.get_disk_free_space(&volume.root())?;
        available += free;
    }

    let feasible = available >= required;
    let shortfall = if feasible { 0 } else { required - available };
    let recommendation = if feasible {
        None
    } else {
        Some(format!(
            "short by {} of free space on the remaining volumes; add another drive to the pool before removing this one",
            ByteSize::bytes(shortfall)
        ))
    };
    Ok(DriveRemovalCheck { required, available, feasible, shortfall, recommendation })
}

/// Options controlling `remove_drive`/`replace_drive`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriveRemovalOptions {
    pub auto_balance: bool,
}

/// Removes a drive from a pool: checks remaining capacity, optionally
/// migrates every physical file off it, then tears down the volume. A file
/// that fails to migrate is recorded as a warning and left on the volume
/// being removed rather than aborting the whole removal — the capacity
/// check already established there is room for it somewhere.
pub fn remove_drive(
    volumes: &mut Vec<Volume>,
    probe: &dyn FreeSpaceProbe,
    physical_config: &PhysicalConfig,
    removing_index: usize,
    options: DriveRemovalOptions,
    cancel: &CancellationToken,
) -> Result<DriveRemovalReport> {
    let check = check_space_for_drive_removal(volumes, probe, physical_config, removing_index)?;
    if !check.feasible {
        return Err(PoolError::CapacityExceeded {
            pool: volumes[removing_index].descriptor.id,
            required: check.required,
            available: check.available,
        });
    }

    let report = if options.auto_balance {
        migrate_off_volume(volumes, probe, physical_config, removing_index, cancel)?
    } else {
        DriveRemovalReport::default()
    };

    volumes[removing_index].teardown(true)?;
    volumes.remove(removing_index);
    Ok(report)
}

/// Moves every physical file off `source_index` onto the remaining volumes,
/// largest-free-first.
fn migrate_off_volume(
    volumes: &[Volume],
    probe: &dyn FreeSpaceProbe,
    physical_config: &PhysicalConfig,
    source_index: usize,
    cancel: &CancellationToken,
) -> Result<DriveRemovalReport> {
    let mut report = DriveRemovalReport::default();
    let mut items = Vec::new();
    for item in physical::enumerate(&volumes[source_index].root(), physical_config) {
        match item {
            Ok(PhysicalItem::File { path, disk_path, is_shadow, size }) => items.push((path, disk_path, is_shadow, size)),
            Ok(PhysicalItem::Folder { .. }) => {}
            Err(e) => report.warnings.push(e.to_string()),
        }
    }
    items.sort_by_key(|(_, _, _, size)| std::cmp::Reverse(*size));

    for (logical_path, disk_path, is_shadow, size) in items {
        if cancel.is_cancelled() {
            report.warnings.push(format!("migration cancelled with {logical_path} and later files left in place"));
            break;
        }

        let mut best: Option<(usize, u64)> = None;
        for (index, volume) in volumes.iter().enumerate() {
            if index == source_index {
                continue;
            }
            let (free, _total) = match probe.get_disk_free_space(&volume.root()) {
                Ok(v) => v,
                Err(e) => {
                    report.warnings.push(e.to_string());
                    continue;
                }
            };
            if free < size {
                continue;
            }
            if best.map(|(_, best_free)| free > best_free).unwrap_or(true) {
                best = Some((index, free));
            }
        }
        let Some((target_index, _)) = best else {
            report.warnings.push(format!("{logical_path}: no volume had room during migration, left in place"));
            continue;
        };
        match file_ops::move_to_drive(&disk_path, &volumes[target_index].root(), &logical_path, !is_shadow) {
            Ok(()) => {
                report.files_migrated += 1;
                report.bytes_migrated += size;
            }
            Err(e) => report.warnings.push(format!("{logical_path}: {e}")),
        }
    }
    Ok(report)
}

/// Replaces `old` with `new` in one pool: removes `old` with auto-balance,
/// adds `new`, and optionally rebalances.
pub fn replace_drive(
    volumes: &mut Vec<Volume>,
    probe: &dyn FreeSpaceProbe,
    physical_config: &PhysicalConfig,
    old_index: usize,
    new_mount: &DrivePath,
    cancel: &CancellationToken,
) -> Result<(Volume, DriveRemovalReport)> {
    let report = remove_drive(
        volumes,
        probe,
        physical_config,
        old_index,
        DriveRemovalOptions { auto_balance: true },
        cancel,
    )?;
    let added = add_drive(volumes, new_mount, None)?;
    volumes.push(added.clone());
    Ok((added, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn drive(dir: &std::path::Path) -> DrivePath {
        DrivePath::new(dir).unwrap()
    }

    #[test]
    fn create_pool_writes_descriptor_on_every_drive() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let (id, volumes) = create_pool(&[drive(a.path()), drive(b.path())], "Media".to_string(), None).unwrap();
        assert_eq!(volumes.len(), 2);
        assert!(volumes.iter().all(|v| v.descriptor.id == id));
    }

    #[test]
    fn add_drive_reuses_existing_pool_id() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let (id, volumes) = create_pool(&[drive(a.path())], "Media".to_string(), None).unwrap();
        let added = add_drive(&volumes, &drive(b.path()), None).unwrap();
        assert_eq!(added.descriptor.id, id);
    }

    struct MapProbe(std::collections::HashMap<std::path::PathBuf, u64>);
    impl FreeSpaceProbe for MapProbe {
        fn get_disk_free_space(&self, path: &std::path::Path) -> Result<(u64, u64)> {
            Ok((*self.0.get(path).unwrap_or(&0), 10_000_000))
        }
    }

    #[test]
    fn check_space_reports_shortfall_when_insufficient() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let (_, volumes) = create_pool(&[drive(a.path()), drive(b.path())], "Media".to_string(), None).unwrap();
        fs::write(volumes[0].root().join("big.bin"), vec![0u8; 1000]).unwrap();

        let probe = MapProbe(std::collections::HashMap::from([(volumes[1].root(), 500)]));
        let check = check_space_for_drive_removal(&volumes, &probe, &PhysicalConfig::default(), 0).unwrap();
        assert!(!check.feasible);
        assert_eq!(check.shortfall, 500);
    }

    #[test]
    fn remove_drive_without_auto_balance_tears_down_volume() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let (_, mut volumes) = create_pool(&[drive(a.path()), drive(b.path())], "Media".to_string(), None).unwrap();
        let probe = MapProbe(std::collections::HashMap::from([(volumes[1].root(), 10_000_000)]));

        remove_drive(
            &mut volumes,
            &probe,
            &PhysicalConfig::default(),
            0,
            DriveRemovalOptions::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(volumes.len(), 1);
    }
}
