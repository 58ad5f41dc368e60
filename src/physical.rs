//! Physical Layer: per-volume recursive enumeration of real
//! files/folders, tagging shadow-copy locations.
//!
//! Exposed as a lazy, restartable iterator rather than a function returning
//! a collected `Vec`: a caller that only wants the first few items, or wants
//! to stop early on cancellation, never pays for the rest of the tree.

use std::collections::VecDeque;
use std::fs::{self, DirEntry};
use std::path::PathBuf;

use crate::config::PhysicalConfig;
use crate::error::{PoolError, Result};
use crate::path::FolderPath;
use crate::sentinel;

/// Walks a single volume root per the given configuration.
pub fn enumerate(volume_root: &std::path::Path, config: &PhysicalConfig) -> PhysicalWalker {
    PhysicalWalker::new(volume_root.to_path_buf(), config.suppress_enumeration_errors)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhysicalItem {
    /// `path` is the logical path (flattened onto the parent for shadow
    /// files); `disk_path` is the real on-disk location, sentinel segment
    /// included, which movers must use instead of reconstructing one from
    /// `path`.
    File { path: FolderPath, disk_path: PathBuf, is_shadow: bool, size: u64 },
    Folder { path: FolderPath },
}

impl PhysicalItem {
    pub fn path(&self) -> &FolderPath {
        match self {
            PhysicalItem::File { path, .. } => path,
            PhysicalItem::Folder { path } => path,
        }
    }
}

/// One pending directory to visit: its physical location on disk and the
/// logical path it corresponds to (which, for a shadow folder's contents,
/// is the *parent* folder, not the shadow folder itself).
struct PendingDir {
    disk_path: PathBuf,
    logical_path: FolderPath,
    is_shadow_children: bool,
}

/// Lazily walks a volume root in pre-order, skipping temp files and
/// flattening shadow-folder children onto their parent.
pub struct PhysicalWalker {
    stack: Vec<PendingDir>,
    pending: VecDeque<PhysicalItem>,
    suppress_errors: bool,
}

impl PhysicalWalker {
    pub fn new(volume_root: PathBuf, suppress_errors: bool) -> Self {
        PhysicalWalker {
            stack: vec![PendingDir {
                disk_path: volume_root,
                logical_path: FolderPath::ROOT,
                is_shadow_children: false,
            }],
            pending: VecDeque::new(),
            suppress_errors,
        }
    }

    fn read_dir_entries(&self, dir: &PathBuf) -> Option<Result<Vec<DirEntry>>> {
        match fs::read_dir(dir) {
            Ok(rd) => {
                let mut entries = Vec::new();
                for entry in rd {
                    match entry {
                        Ok(e) => entries.push(e),
                        Err(e) => {
                            if self.suppress_errors {
                                return None;
                            }
                            return Some(Err(PoolError::io(dir.clone(), e)));
                        }
                    }
                }
                Some(Ok(entries))
            }
            Err(e) => {
                if self.suppress_errors {
                    None
                } else {
                    Some(Err(PoolError::io(dir.clone(), e)))
                }
            }
        }
    }
}

impl Iterator for PhysicalWalker {
    type Item = Result<PhysicalItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.pending.pop_front() {
            return Some(Ok(item));
        }

        loop {
            let current = self.stack.pop()?;

            let entries = match self.read_dir_entries(&current.disk_path) {
                None => continue, // suppressed error: subtree yields nothing
                Some(Err(e)) => return Some(Err(e)),
                Some(Ok(entries)) => entries,
            };

            // Emit the folder itself for every non-root directory we descend into.
            let emit_folder = !current.logical_path.is_root() && !current.is_shadow_children;

            let mut produced = Vec::new();
            for entry in entries {
                let name = entry.file_name();
                let Some(name_str) = name.to_str() else { continue };
                let file_type = match entry.file_type() {
                    Ok(ft) => ft,
                    Err(e) => {
                        if self.suppress_errors {
                            continue;
                        }
                        return Some(Err(PoolError::io(entry.path(), e)));
                    }
                };

                if current.is_shadow_children {
                    // Shadow folders never nest: only immediate file children count.
                    if file_type.is_file() {
                        if sentinel::is_temp_file(name_str) {
                            continue;
                        }
                        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                        produced.push(PhysicalItem::File {
                            path: current.logical_path.clone(),
                            disk_path: entry.path(),
                            is_shadow: true,
                            size,
                        });
                    }
                    continue;
                }

                if file_type.is_dir() {
                    if sentinel::shadow_sentinel_index(name_str).is_some() {
                        // Don't yield as a folder; queue its children as shadow files
                        // of the *current* logical folder.
                        self.stack.push(PendingDir {
                            disk_path: entry.path(),
                            logical_path: current.logical_path.clone(),
                            is_shadow_children: true,
                        });
                    } else {
                        let child_path = match current.logical_path.combine(name_str) {
                            Ok(p) => p,
                            Err(_) => continue,
                        };
                        self.stack.push(PendingDir {
                            disk_path: entry.path(),
                            logical_path: child_path,
                            is_shadow_children: false,
                        });
                    }
                } else if file_type.is_file() {
                    if sentinel::is_temp_file(name_str) {
                        continue;
                    }
                    let child_path = match current.logical_path.combine(name_str) {
                        Ok(p) => p,
                        Err(_) => continue,
                    };
                    let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    produced.push(PhysicalItem::File {
                        path: child_path,
                        disk_path: entry.path(),
                        is_shadow: false,
                        size,
                    });
                }
            }

            if emit_folder {
                produced.push(PhysicalItem::Folder {
                    path: current.logical_path.clone(),
                });
            }

            if !produced.is_empty() {
                self.pending.extend(produced);
                return Some(Ok(self.pending.pop_front().unwrap()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn collect(root: PathBuf) -> Vec<PhysicalItem> {
        PhysicalWalker::new(root, true).map(|r| r.unwrap()).collect()
    }

    #[test]
    fn enumerates_plain_files_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("movies")).unwrap();
        fs::write(dir.path().join("movies/a.mkv"), b"hi").unwrap();

        let items = collect(dir.path().to_path_buf());
        let paths: HashSet<String> = items.iter().map(|i| i.path().as_logical_string()).collect();
        assert!(paths.contains("movies"));
        assert!(paths.contains("movies/a.mkv"));
    }

    #[test]
    fn shadow_folder_children_flatten_onto_parent_as_shadow_files() {
        let dir = tempfile::tempdir().unwrap();
        let shadow_dir = dir.path().join("docs").join(sentinel::SHADOW_FOLDER_NAME);
        fs::create_dir_all(&shadow_dir).unwrap();
        fs::write(shadow_dir.join("a.txt"), b"hi").unwrap();

        let items = collect(dir.path().to_path_buf());
        let shadow_file = items
            .iter()
            .find(|i| matches!(i, PhysicalItem::File { is_shadow: true, .. }))
            .expect("expected a shadow file");
        assert_eq!(shadow_file.path().as_logical_string(), "docs/a.txt");

        // The sentinel directory itself must never be yielded as a folder.
        assert!(!items
            .iter()
            .any(|i| matches!(i, PhysicalItem::Folder { path } if path.as_logical_string().contains("DRIVEBENDER"))));
    }

    #[test]
    fn temp_files_are_invisible() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(format!("a.txt{}", sentinel::TEMP_SUFFIX)), b"x").unwrap();
        assert!(collect(dir.path().to_path_buf()).is_empty());
    }

    #[test]
    fn shadow_folders_never_nest() {
        let dir = tempfile::tempdir().unwrap();
        let shadow_dir = dir.path().join("docs").join(sentinel::SHADOW_FOLDER_NAME);
        let nested = shadow_dir.join("nested_dir");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("deep.txt"), b"x").unwrap();

        let items = collect(dir.path().to_path_buf());
        assert!(!items.iter().any(|i| i.path().as_logical_string().contains("deep.txt")));
    }
}
