//! Rebalancer: moves physical files from overfull volumes to
//! underfull ones until free space is within `MIN_DIFF` of the pool average.

use crate::cancel::CancellationToken;
use crate::config::RebalanceConfig;
use crate::error::Result;
use crate::file_ops;
use crate::path::FolderPath;
use crate::physical::{self, PhysicalItem};
use crate::report::RebalanceReport;
use crate::sink::FreeSpaceProbe;
use crate::volume::Volume;

struct MovableFile {
    logical_path: FolderPath,
    disk_path: std::path::PathBuf,
    is_shadow: bool,
    size: u64,
}

/// One completed move, reported for progress logging.
#[derive(Debug, Clone)]
pub struct RebalanceMove {
    pub from_volume: usize,
    pub to_volume: usize,
    pub bytes: u64,
}

/// Runs the rebalance algorithm once to completion. A file that can't be
/// moved (its target fills up between the plan and the move, say) is
/// recorded as a warning and skipped rather than aborting the whole pass.
pub fn rebalance(
    volumes: &[Volume],
    probe: &dyn FreeSpaceProbe,
    config: &RebalanceConfig,
    physical_config: &crate::config::PhysicalConfig,
    cancel: &CancellationToken,
) -> Result<RebalanceReport> {
    let mut report = RebalanceReport::default();

    let mut free: Vec<u64> = Vec::with_capacity(volumes.len());
    for volume in volumes {
        let (f, _total) = probe.get_disk_free_space(&volume.root())?;
        free.push(f);
    }
    if volumes.is_empty() {
        return Ok(report);
    }

    let avg = free.iter().sum::<u64>() / volumes.len() as u64;
    let min_diff = config.min_diff.as_u64();
    if avg < min_diff {
        return Ok(report);
    }

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let sources: Vec<usize> = (0..volumes.len()).filter(|&i| free[i] + min_diff < avg).collect();
        let sinks: Vec<usize> = (0..volumes.len()).filter(|&i| free[i] > avg + min_diff).collect();
        if sources.is_empty() || sinks.is_empty() {
            break;
        }

        let mut moved_this_pass = false;

        for &s in &sources {
            if cancel.is_cancelled() {
                break;
            }

            let mut candidates = match enumerate_movable_files(&volumes[s], physical_config, config.min_file.as_u64()) {
                Ok(files) => files,
                Err(e) => {
                    report.warnings.push(format!("volume {s}: {e}"));
                    continue;
                }
            };
            candidates.sort_by_key(|f| std::cmp::Reverse(f.size));

            while free[s] < avg {
                if cancel.is_cancelled() {
                    break;
                }

                let budget = avg - free[s];
                let Some(pos) = candidates.iter().position(|f| f.size <= budget) else { break };
                let file = candidates.remove(pos);

                let Some(&t) = sinks.iter().find(|&&t| {
                    t != s
                        && free[t] > file.size
                        && !file_ops::role_path(&volumes[t].root(), &file.logical_path, !file.is_shadow).exists()
                }) else {
                    break;
                };

                match file_ops::move_to_drive(&file.disk_path, &volumes[t].root(), &file.logical_path, !file.is_shadow) {
                    Ok(()) => {
                        free[s] += file.size;
                        free[t] -= file.size;
                        report.bytes_moved += file.size;
                        report.moves.push(RebalanceMove { from_volume: s, to_volume: t, bytes: file.size });
                        moved_this_pass = true;
                    }
                    Err(e) => {
                        report.warnings.push(format!("{}: {e}", file.logical_path));
                    }
                }
            }
        }

        if !moved_this_pass {
            break;
        }
    }

    Ok(report)
}

fn enumerate_movable_files(volume: &Volume, config: &crate::config::PhysicalConfig, min_file: u64) -> Result<Vec<MovableFile>> {
    let mut files = Vec::new();
    for item in physical::enumerate(&volume.root(), config) {
        if let PhysicalItem::File { path, disk_path, is_shadow, size } = item? {
            if size >= min_file {
                files.push(MovableFile { logical_path: path, disk_path, is_shadow, size });
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PoolId;
    use std::fs;
    use std::path::Path;

    struct MapProbe(std::collections::HashMap<PathBuf, u64>);
    use std::path::PathBuf;
    impl FreeSpaceProbe for MapProbe {
        fn get_disk_free_space(&self, path: &Path) -> Result<(u64, u64)> {
            Ok((*self.0.get(path).unwrap_or(&0), 10_000_000))
        }
    }

    fn make_volume(dir: &Path, id: PoolId, label: &str) -> Volume {
        Volume::create(dir, id, label.to_string(), None).unwrap()
    }

    #[test]
    fn rebalance_is_noop_when_average_free_below_min_diff() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let va = make_volume(a.path(), id, "A");
        let vb = make_volume(b.path(), id, "B");
        let probe = MapProbe(std::collections::HashMap::from([(va.root(), 100), (vb.root(), 100)]));

        let report = rebalance(
            &[va, vb],
            &probe,
            &crate::config::RebalanceConfig::default(),
            &crate::config::PhysicalConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(report.moves.is_empty());
    }

    #[test]
    fn rebalance_moves_a_file_from_full_to_empty_volume() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let va = make_volume(a.path(), id, "A");
        let vb = make_volume(b.path(), id, "B");
        fs::write(va.root().join("big.bin"), vec![0u8; 8192]).unwrap();

        let probe = MapProbe(std::collections::HashMap::from([
            (va.root(), 1_000_000u64),
            (vb.root(), 9_000_000u64),
        ]));

        let report = rebalance(
            &[va.clone(), vb.clone()],
            &probe,
            &crate::config::RebalanceConfig::default(),
            &crate::config::PhysicalConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(report.moves.len(), 1);
        assert_eq!(report.bytes_moved, 8192);
        assert!(!va.root().join("big.bin").exists());
        assert!(vb.root().join("big.bin").exists());
    }

    #[test]
    fn rebalance_stops_immediately_when_already_cancelled() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let va = make_volume(a.path(), id, "A");
        let vb = make_volume(b.path(), id, "B");
        fs::write(va.root().join("big.bin"), vec![0u8; 8192]).unwrap();

        let probe = MapProbe(std::collections::HashMap::from([
            (va.root(), 1_000_000u64),
            (vb.root(), 9_000_000u64),
        ]));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = rebalance(
            &[va.clone(), vb.clone()],
            &probe,
            &crate::config::RebalanceConfig::default(),
            &crate::config::PhysicalConfig::default(),
            &cancel,
        )
        .unwrap();

        assert!(report.moves.is_empty());
        assert!(va.root().join("big.bin").exists());
    }
}
