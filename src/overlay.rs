//! Logical Overlay: merges every volume's physical tree into
//! one logical namespace, in breadth-first order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::PathBuf;

use crate::config::PhysicalConfig;
use crate::error::{PoolError, Result};
use crate::path::FolderPath;
use crate::physical::{self, PhysicalItem};
use crate::sentinel;
use crate::volume::Volume;

/// A location of a physical file on one volume, with the role (primary or
/// shadow) implied by which list (`primaries`/`shadows`) it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub volume_index: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalFolder {
    pub full_name: FolderPath,
}

impl LogicalFolder {
    /// Sum of every descendant primary file's size, computed on demand —
    /// never cached, since the overlay does no in-memory bookkeeping of
    /// file contents.
    pub fn size(&self, volumes: &[Volume], config: &PhysicalConfig) -> Result<u64> {
        let mut total = 0u64;
        for volume in volumes {
            let sub_root = volume.root().join(self.full_name.to_relative_path());
            if !sub_root.is_dir() {
                continue;
            }
            for item in physical::enumerate(&sub_root, config) {
                if let PhysicalItem::File { is_shadow: false, size, .. } = item? {
                    total += size;
                }
            }
        }
        Ok(total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalFile {
    pub full_name: FolderPath,
    pub size: u64,
    pub primaries: Vec<Location>,
    pub shadows: Vec<Location>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalItem {
    Folder(LogicalFolder),
    File(LogicalFile),
}

impl LogicalItem {
    pub fn full_name(&self) -> &FolderPath {
        match self {
            LogicalItem::Folder(f) => &f.full_name,
            LogicalItem::File(f) => &f.full_name,
        }
    }
}

/// Lazy breadth-first walk of the logical namespace starting at `root_path`.
pub struct LogicalWalker {
    volumes: Vec<Volume>,
    queue: VecDeque<FolderPath>,
    current: VecDeque<LogicalItem>,
    recursive: bool,
}

impl LogicalWalker {
    pub fn new(volumes: Vec<Volume>, root_path: FolderPath, recursive: bool) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(root_path);
        LogicalWalker {
            volumes,
            queue,
            current: VecDeque::new(),
            recursive,
        }
    }
}

impl Iterator for LogicalWalker {
    type Item = Result<LogicalItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.pop_front() {
                if self.recursive {
                    if let LogicalItem::Folder(folder) = &item {
                        self.queue.push_back(folder.full_name.clone());
                    }
                }
                return Some(Ok(item));
            }

            let folder = self.queue.pop_front()?;
            match list_folder(&self.volumes, &folder) {
                Ok(items) => {
                    if items.is_empty() {
                        continue;
                    }
                    self.current.extend(items);
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Entry point for `get_items(root_path, recursive)`.
pub fn get_items(volumes: Vec<Volume>, root_path: FolderPath, recursive: bool) -> LogicalWalker {
    LogicalWalker::new(volumes, root_path, recursive)
}

/// Produces one folder's direct logical children: a primary-name pass
/// followed by a shadow-only pass, each in first-occurrence-across-volumes
/// order.
fn list_folder(volumes: &[Volume], folder: &FolderPath) -> Result<Vec<LogicalItem>> {
    let mut order: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut is_dir: HashMap<String, bool> = HashMap::new();

    // Pass 1: primary children, first occurrence across volumes wins.
    for volume in volumes {
        let dir = volume.root().join(folder.to_relative_path());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(PoolError::AccessDenied(dir));
            }
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
            if sentinel::shadow_sentinel_index(&name).is_some() || sentinel::is_temp_file(&name) {
                continue;
            }
            let dir_flag = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
            is_dir.entry(name.clone()).or_insert(dir_flag);
            if seen.insert(name.clone()) {
                order.push(name);
            }
        }
    }

    // Pass 2: names with only a shadow location (missing primary).
    for volume in volumes {
        for k in 0.. {
            let sentinel_dir = volume
                .root()
                .join(folder.to_relative_path())
                .join(sentinel::shadow_sentinel_name(k));
            let Ok(entries) = fs::read_dir(&sentinel_dir) else { break };
            for entry in entries.flatten() {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
                if sentinel::is_temp_file(&name) {
                    continue;
                }
                is_dir.entry(name.clone()).or_insert(false);
                if seen.insert(name.clone()) {
                    order.push(name);
                }
            }
        }
    }

    let mut items = Vec::with_capacity(order.len());
    for name in order {
        let full_name = folder.combine(&name)?;
        if *is_dir.get(&name).unwrap_or(&false) {
            items.push(LogicalItem::Folder(LogicalFolder { full_name }));
        } else {
            let (primaries, shadows) = locate(volumes, &full_name);
            let size = primaries
                .first()
                .or_else(|| shadows.first())
                .and_then(|loc| fs::metadata(&loc.path).ok())
                .map(|m| m.len())
                .unwrap_or(0);
            items.push(LogicalItem::File(LogicalFile { full_name, size, primaries, shadows }));
        }
    }
    Ok(items)
}

/// Probes every volume for a primary and shadow location of `full_name`.
fn locate(volumes: &[Volume], full_name: &FolderPath) -> (Vec<Location>, Vec<Location>) {
    let mut primaries = Vec::new();
    let mut shadows = Vec::new();
    let dir = full_name.parent();
    let Some(base_name) = full_name.name() else {
        return (primaries, shadows);
    };

    for (index, volume) in volumes.iter().enumerate() {
        let primary_path = volume.root().join(full_name.to_relative_path());
        if primary_path.is_file() {
            primaries.push(Location { volume_index: index, path: primary_path });
        }

        for k in 0.. {
            let sentinel_dir = volume
                .root()
                .join(dir.to_relative_path())
                .join(sentinel::shadow_sentinel_name(k));
            if !sentinel_dir.is_dir() {
                break;
            }
            let shadow_path = sentinel_dir.join(base_name);
            if shadow_path.is_file() {
                shadows.push(Location { volume_index: index, path: shadow_path });
            }
        }
    }

    (primaries, shadows)
}
