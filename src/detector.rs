//! Volume Detector: scans mount roots, parses volume
//! descriptors, groups volumes by pool id.

use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::identity::PoolId;
use crate::sentinel;
use crate::sink::MountEnumerator;
use crate::volume::Volume;

/// Volumes discovered under one shared pool id, in the stable order they
/// were encountered. This order is what every later tie-break cites.
#[derive(Debug, Clone)]
pub struct DetectedPool {
    pub id: PoolId,
    pub volumes: Vec<Volume>,
}

/// Scans every candidate mount root for `*.MP.$DRIVEBENDER` descriptors and
/// groups the resulting valid volumes by pool id. Never fails for "no pools
/// found" (returns an empty list); IO errors on an individual mount are
/// swallowed for that mount only.
pub fn detect(enumerator: &dyn MountEnumerator) -> Result<Vec<DetectedPool>> {
    let mut by_id: Vec<(PoolId, Vec<Volume>)> = Vec::new();
    let mut index_of: HashMap<PoolId, usize> = HashMap::new();

    for mount in enumerator.enumerate_mount_roots() {
        for volume in scan_mount(&mount) {
            let id = volume.descriptor.id;
            match index_of.get(&id) {
                Some(&i) => by_id[i].1.push(volume),
                None => {
                    index_of.insert(id, by_id.len());
                    by_id.push((id, vec![volume]));
                }
            }
        }
    }

    Ok(by_id
        .into_iter()
        .map(|(id, volumes)| DetectedPool { id, volumes })
        .collect())
}

/// Scans a single mount root for descriptors. IO errors reading the mount
/// itself (missing, access denied) degrade to "no volumes here" rather than
/// propagating.
fn scan_mount(mount: &Path) -> Vec<Volume> {
    let entries = match std::fs::read_dir(mount) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut volumes = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !sentinel::is_descriptor_file(name) {
            continue;
        }
        if let Ok(Some(volume)) = Volume::try_from_descriptor(&path) {
            volumes.push(volume);
        }
    }
    volumes
}
