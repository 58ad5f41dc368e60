//! Integrity Checker: surfaces mismatches between a pool's
//! logical expectations and its physical state, and can repair the
//! auto-fixable ones.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::cancel::CancellationToken;
use crate::duplication;
use crate::error::{PoolError, Result};
use crate::file_ops;
use crate::overlay::{self, LogicalFile, LogicalItem, Location};
use crate::path::FolderPath;
use crate::repair;
use crate::report::IntegrityReport;
use crate::sink::FreeSpaceProbe;
use crate::volume::Volume;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssueKind {
    MissingPrimary,
    MissingShadowCopy,
    DuplicatePrimary,
    DuplicateShadowCopy,
    OrphanedShadowCopy,
    HashMismatch,
    CorruptedFile,
    AccessDenied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityIssue {
    pub kind: IntegrityIssueKind,
    pub file: FolderPath,
    pub locations: Vec<Location>,
}

/// Checks every logical file in `volumes`, optionally performing a
/// SHA-256 deep scan. A file that can't be scanned (a transient read
/// failure during the deep scan, say) is recorded as a warning rather
/// than aborting the rest of the pass.
pub fn check(volumes: &[Volume], deep_scan: bool, cancel: &CancellationToken) -> Result<IntegrityReport> {
    let mut report = IntegrityReport::default();

    for item in overlay::get_items(volumes.to_vec(), FolderPath::ROOT, true) {
        if cancel.is_cancelled() {
            break;
        }
        let file = match item {
            Ok(LogicalItem::File(f)) => f,
            Ok(LogicalItem::Folder(_)) => continue,
            Err(PoolError::AccessDenied(path)) => {
                report.issues.push(IntegrityIssue {
                    kind: IntegrityIssueKind::AccessDenied,
                    file: FolderPath::ROOT,
                    locations: vec![Location { volume_index: usize::MAX, path }],
                });
                continue;
            }
            Err(e) => {
                report.warnings.push(e.to_string());
                continue;
            }
        };

        report.files_scanned += 1;
        let level = duplication::get_level(volumes, &file.full_name.parent());
        match check_file_at_level(&file, level, deep_scan) {
            Ok(found) => report.issues.extend(found),
            Err(e) => report.warnings.push(format!("{}: {e}", file.full_name)),
        }
    }

    Ok(report)
}

/// Runs the same per-file checks `check()` runs in its pool-wide walk,
/// against a single already-resolved logical file.
pub fn check_file(volumes: &[Volume], file: &LogicalFile, deep_scan: bool) -> Result<Vec<IntegrityIssue>> {
    let level = duplication::get_level(volumes, &file.full_name.parent());
    check_file_at_level(file, level, deep_scan)
}

fn check_file_at_level(file: &LogicalFile, level: u32, deep_scan: bool) -> Result<Vec<IntegrityIssue>> {
    let mut issues = Vec::new();

    if file.primaries.is_empty() && !file.shadows.is_empty() {
        issues.push(issue(IntegrityIssueKind::MissingPrimary, file, file.shadows.clone()));
    }
    if file.primaries.len() > 1 {
        issues.push(issue(IntegrityIssueKind::DuplicatePrimary, file, file.primaries.clone()));
    }
    if level > 0 && (file.shadows.len() as u32) < level {
        issues.push(issue(IntegrityIssueKind::MissingShadowCopy, file, file.shadows.clone()));
    }
    if level == 0 && !file.shadows.is_empty() {
        issues.push(issue(IntegrityIssueKind::OrphanedShadowCopy, file, file.shadows.clone()));
    } else if level > 0 && (file.shadows.len() as u32) > level {
        issues.push(issue(IntegrityIssueKind::DuplicateShadowCopy, file, file.shadows.clone()));
    }

    if deep_scan {
        issues.extend(deep_scan_file(file)?);
    }

    Ok(issues)
}

fn issue(kind: IntegrityIssueKind, file: &LogicalFile, locations: Vec<Location>) -> IntegrityIssue {
    IntegrityIssue { kind, file: file.full_name.clone(), locations }
}

fn deep_scan_file(file: &LogicalFile) -> Result<Vec<IntegrityIssue>> {
    let mut by_digest: HashMap<[u8; 32], Vec<Location>> = HashMap::new();
    let mut corrupted = Vec::new();

    for location in file.primaries.iter().chain(file.shadows.iter()) {
        match hash_file(&location.path) {
            Ok(digest) => by_digest.entry(digest).or_default().push(location.clone()),
            Err(_) => corrupted.push(location.clone()),
        }
    }

    let mut issues = Vec::new();
    if !corrupted.is_empty() {
        issues.push(IntegrityIssue {
            kind: IntegrityIssueKind::CorruptedFile,
            file: file.full_name.clone(),
            locations: corrupted,
        });
    }
    if by_digest.len() > 1 {
        let all_locations: Vec<Location> = file.primaries.iter().chain(file.shadows.iter()).cloned().collect();
        issues.push(IntegrityIssue {
            kind: IntegrityIssueKind::HashMismatch,
            file: file.full_name.clone(),
            locations: all_locations,
        });
    }
    Ok(issues)
}

fn hash_file(path: &std::path::Path) -> Result<[u8; 32]> {
    let mut file = File::open(path).map_err(|e| PoolError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).map_err(|e| PoolError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.finalize().into())
}

/// Repairs `issue` in place. Returns `true` if the issue
/// was (or, under `dry_run`, would be) resolved. A `MissingShadowCopy` repair
/// needs `probe` to pick a target volume; pass a real probe to get the
/// benefit, or one that always errors if the caller never intends to repair
/// that kind (`dry_run` reports it unrepairable in that case too).
pub fn repair_issue(
    volumes: &[Volume],
    issue: &IntegrityIssue,
    probe: &dyn FreeSpaceProbe,
    dry_run: bool,
    create_backup: bool,
) -> Result<bool> {
    if dry_run {
        let would_repair = match issue.kind {
            IntegrityIssueKind::MissingShadowCopy => {
                let file = reload_logical_file(volumes, &issue.file)?;
                file.primaries.first().is_some()
                    && repair::pick_largest_free_excluding(volumes, probe, file.primaries[0].volume_index)?.is_some()
            }
            IntegrityIssueKind::MissingPrimary
            | IntegrityIssueKind::DuplicatePrimary
            | IntegrityIssueKind::DuplicateShadowCopy
            | IntegrityIssueKind::OrphanedShadowCopy
            | IntegrityIssueKind::CorruptedFile => true,
            IntegrityIssueKind::HashMismatch | IntegrityIssueKind::AccessDenied => false,
        };
        return Ok(would_repair);
    }

    if create_backup && !issue.locations.is_empty() {
        backup_locations(&issue.locations)?;
    }

    match issue.kind {
        IntegrityIssueKind::MissingPrimary => {
            let file = reload_logical_file(volumes, &issue.file)?;
            if let Some(shadow) = file.shadows.first() {
                repair::set_primary(volumes, &file, shadow.volume_index)?;
            }
            Ok(true)
        }
        IntegrityIssueKind::MissingShadowCopy => {
            let file = reload_logical_file(volumes, &issue.file)?;
            let Some(primary) = file.primaries.first() else { return Ok(false) };
            match repair::pick_largest_free_excluding(volumes, probe, primary.volume_index)? {
                Some(target) => {
                    repair::set_shadow(volumes, &file, target)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        IntegrityIssueKind::OrphanedShadowCopy => {
            for location in &issue.locations {
                file_ops::delete(&location.path)?;
            }
            Ok(true)
        }
        IntegrityIssueKind::DuplicatePrimary | IntegrityIssueKind::DuplicateShadowCopy => {
            keep_most_recently_modified_delete_rest(&issue.locations)?;
            Ok(true)
        }
        IntegrityIssueKind::CorruptedFile => {
            let file = reload_logical_file(volumes, &issue.file)?;
            for bad in &issue.locations {
                file_ops::delete(&bad.path)?;
            }
            if let Some(good) = file.primaries.iter().chain(file.shadows.iter()).find(|l| !issue.locations.contains(l))
            {
                for bad in &issue.locations {
                    file_ops::atomic_copy(&good.path, &bad.path)?;
                }
            }
            Ok(true)
        }
        IntegrityIssueKind::HashMismatch | IntegrityIssueKind::AccessDenied => Ok(false),
    }
}

fn reload_logical_file(volumes: &[Volume], full_name: &FolderPath) -> Result<LogicalFile> {
    let parent = full_name.parent();
    for item in overlay::get_items(volumes.to_vec(), parent, false) {
        if let LogicalItem::File(file) = item? {
            if file.full_name == *full_name {
                return Ok(file);
            }
        }
    }
    Err(PoolError::not_found(format!("logical file {full_name} no longer exists")))
}

fn keep_most_recently_modified_delete_rest(locations: &[Location]) -> Result<()> {
    let mut with_mtime: Vec<(&Location, std::time::SystemTime)> = Vec::new();
    for location in locations {
        let modified = fs::metadata(&location.path)
            .and_then(|m| m.modified())
            .map_err(|e| PoolError::io(&location.path, e))?;
        with_mtime.push((location, modified));
    }
    with_mtime.sort_by_key(|(_, mtime)| std::cmp::Reverse(*mtime));
    for (location, _) in with_mtime.into_iter().skip(1) {
        file_ops::delete(&location.path)?;
    }
    Ok(())
}

fn backup_locations(locations: &[Location]) -> Result<()> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
    for location in locations {
        if location.volume_index == usize::MAX {
            continue;
        }
        let Some(name) = location.path.file_name() else { continue };
        let backup_dir: PathBuf = location
            .path
            .parent()
            .unwrap_or(&location.path)
            .join(format!(".integrity-backup.{stamp}"));
        fs::create_dir_all(&backup_dir).map_err(|e| PoolError::io(&backup_dir, e))?;
        fs::copy(&location.path, backup_dir.join(name)).map_err(|e| PoolError::io(&location.path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PoolId;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn make_volume(dir: &std::path::Path, id: PoolId, label: &str) -> Volume {
        Volume::create(dir, id, label.to_string(), None).unwrap()
    }

    struct MapProbe(HashMap<PathBuf, (u64, u64)>);
    impl FreeSpaceProbe for MapProbe {
        fn get_disk_free_space(&self, path: &Path) -> Result<(u64, u64)> {
            Ok(*self.0.get(path).unwrap_or(&(0, 0)))
        }
    }

    #[test]
    fn check_file_matches_the_issue_check_finds_for_the_pool() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let va = make_volume(a.path(), id, "A");
        let vb = make_volume(b.path(), id, "B");
        fs::write(va.root().join("x.txt"), b"one").unwrap();
        fs::write(vb.root().join("x.txt"), b"two").unwrap();

        let volumes = [va, vb];
        let file = match overlay::get_items(volumes.to_vec(), FolderPath::ROOT, false)
            .next()
            .unwrap()
            .unwrap()
        {
            LogicalItem::File(f) => f,
            LogicalItem::Folder(_) => panic!("expected a file"),
        };

        let issues = check_file(&volumes, &file, false).unwrap();
        assert!(issues.iter().any(|i| i.kind == IntegrityIssueKind::DuplicatePrimary));
    }

    #[test]
    fn check_flags_missing_primary() {
        let a = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let va = make_volume(a.path(), id, "A");
        let shadow_dir = va.root().join(crate::sentinel::SHADOW_FOLDER_NAME);
        fs::create_dir_all(&shadow_dir).unwrap();
        fs::write(shadow_dir.join("x.txt"), b"data").unwrap();

        let report = check(&[va], false, &CancellationToken::new()).unwrap();
        assert!(report.issues.iter().any(|i| i.kind == IntegrityIssueKind::MissingPrimary));
    }

    #[test]
    fn check_flags_duplicate_primary() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let va = make_volume(a.path(), id, "A");
        let vb = make_volume(b.path(), id, "B");
        fs::write(va.root().join("x.txt"), b"one").unwrap();
        fs::write(vb.root().join("x.txt"), b"two").unwrap();

        let report = check(&[va, vb], false, &CancellationToken::new()).unwrap();
        assert!(report.issues.iter().any(|i| i.kind == IntegrityIssueKind::DuplicatePrimary));
    }

    #[test]
    fn deep_scan_detects_hash_mismatch() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let va = make_volume(a.path(), id, "A");
        let vb = make_volume(b.path(), id, "B");
        fs::write(va.root().join("x.txt"), b"one").unwrap();
        fs::write(vb.root().join("x.txt"), b"two").unwrap();

        let report = check(&[va, vb], true, &CancellationToken::new()).unwrap();
        assert!(report.issues.iter().any(|i| i.kind == IntegrityIssueKind::HashMismatch));
    }

    #[test]
    fn dry_run_repair_never_touches_disk() {
        let a = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let va = make_volume(a.path(), id, "A");
        let shadow_dir = va.root().join(crate::sentinel::SHADOW_FOLDER_NAME);
        fs::create_dir_all(&shadow_dir).unwrap();
        fs::write(shadow_dir.join("x.txt"), b"data").unwrap();

        let report = check(&[va.clone()], false, &CancellationToken::new()).unwrap();
        let issue = report.issues.iter().find(|i| i.kind == IntegrityIssueKind::MissingPrimary).unwrap();
        let probe = MapProbe(HashMap::new());
        let result = repair_issue(&[va.clone()], issue, &probe, true, false).unwrap();
        assert!(result);
        assert!(shadow_dir.join("x.txt").is_file());
        assert!(!va.root().join("x.txt").exists());
    }

    #[test]
    fn missing_shadow_copy_dry_run_matches_real_repair() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let va = make_volume(a.path(), id, "A");
        let vb = make_volume(b.path(), id, "B");
        fs::write(va.root().join("x.txt"), b"data").unwrap();
        crate::duplication::enable(&[va.clone(), vb.clone()], &FolderPath::ROOT, 1).unwrap();

        let volumes = [va.clone(), vb.clone()];
        let report = check(&volumes, false, &CancellationToken::new()).unwrap();
        let issue = report.issues.iter().find(|i| i.kind == IntegrityIssueKind::MissingShadowCopy).unwrap();

        let probe = MapProbe(HashMap::from([(vb.root(), (1_000_000u64, 1_000_000u64))]));
        let predicted = repair_issue(&volumes, issue, &probe, true, false).unwrap();
        assert!(predicted);

        let repaired = repair_issue(&volumes, issue, &probe, false, false).unwrap();
        assert_eq!(repaired, predicted);
        assert!(vb
            .root()
            .join(crate::sentinel::SHADOW_FOLDER_NAME)
            .join("x.txt")
            .is_file());
    }

    #[test]
    fn missing_shadow_copy_dry_run_false_with_no_eligible_volume() {
        let a = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let va = make_volume(a.path(), id, "A");
        fs::write(va.root().join("x.txt"), b"data").unwrap();
        crate::duplication::ensure_sentinels(&[va.clone()], &FolderPath::ROOT, 1).unwrap();

        let volumes = [va.clone()];
        let report = check(&volumes, false, &CancellationToken::new()).unwrap();
        let issue = report.issues.iter().find(|i| i.kind == IntegrityIssueKind::MissingShadowCopy).unwrap();

        let probe = MapProbe(HashMap::new());
        let predicted = repair_issue(&volumes, issue, &probe, true, false).unwrap();
        assert!(!predicted);
        let repaired = repair_issue(&volumes, issue, &probe, false, false).unwrap();
        assert_eq!(repaired, predicted);
    }
}
