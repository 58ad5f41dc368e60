//! End-to-end scenarios against real temp-directory volumes, exercised
//! through the public engine API only.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pool_engine::{
    CancellationToken, DrivePath, FolderPath, FreeSpaceProbe, IntegrityIssueKind, LogicalItem, PoolEngine, Result,
};

struct MapProbe(HashMap<PathBuf, (u64, u64)>);

impl FreeSpaceProbe for MapProbe {
    fn get_disk_free_space(&self, path: &Path) -> Result<(u64, u64)> {
        Ok(*self.0.get(path).unwrap_or(&(0, 0)))
    }
}

fn engine() -> PoolEngine {
    PoolEngine::new(Arc::new(pool_engine::FixedRoots(Vec::new())))
}

fn drive(dir: &Path) -> DrivePath {
    DrivePath::new(dir).unwrap()
}

fn items(pool: &pool_engine::Pool) -> Vec<LogicalItem> {
    pool.get_items(FolderPath::ROOT, true).collect::<Result<Vec<_>>>().unwrap()
}

/// S1 — Missing primary promotion.
#[test]
fn s1_missing_primary_is_promoted_from_shadow() {
    let v1 = tempfile::tempdir().unwrap();
    let v2 = tempfile::tempdir().unwrap();
    let pool = engine()
        .create_pool(&[drive(v1.path()), drive(v2.path())], "Media".to_string(), None)
        .unwrap();

    let shadow_dir = pool.volumes()[0].root().join("docs").join("FOLDER.DUPLICATE.$DRIVEBENDER");
    fs::create_dir_all(&shadow_dir).unwrap();
    fs::write(shadow_dir.join("a.txt"), b"hi").unwrap();

    let report = pool.fix_missing_primaries(&CancellationToken::new()).unwrap();
    assert_eq!(report.primaries_restored, 1);

    let primary = pool.volumes()[0].root().join("docs").join("a.txt");
    assert_eq!(fs::read(&primary).unwrap(), b"hi");
    assert!(!shadow_dir.join("a.txt").exists());

    let found = items(&pool)
        .into_iter()
        .find_map(|item| match item {
            LogicalItem::File(f) if f.full_name.to_string() == "docs/a.txt" => Some(f),
            _ => None,
        })
        .unwrap();
    assert_eq!(found.primaries.len(), 1);
    assert_eq!(found.shadows.len(), 0);
}

/// S2 — Duplicate primary collapse.
#[test]
fn s2_duplicate_primaries_collapse_to_one() {
    let v1 = tempfile::tempdir().unwrap();
    let v2 = tempfile::tempdir().unwrap();
    let pool = engine()
        .create_pool(&[drive(v1.path()), drive(v2.path())], "Media".to_string(), None)
        .unwrap();

    let payload = vec![0xABu8; 1024 * 1024];
    fs::write(pool.volumes()[0].root().join("x.bin"), &payload).unwrap();
    fs::write(pool.volumes()[1].root().join("x.bin"), &payload).unwrap();

    let report = pool.fix_duplicate_primaries(&CancellationToken::new()).unwrap();
    assert_eq!(report.primaries_deduped, 1);

    let remaining = [
        pool.volumes()[0].root().join("x.bin").exists(),
        pool.volumes()[1].root().join("x.bin").exists(),
    ];
    assert_eq!(remaining.iter().filter(|x| **x).count(), 1);
}

/// S3 — Rebalance.
#[test]
fn s3_rebalance_moves_large_file_to_emptier_volume() {
    let v1 = tempfile::tempdir().unwrap();
    let v2 = tempfile::tempdir().unwrap();
    let pool = engine()
        .create_pool(&[drive(v1.path()), drive(v2.path())], "Media".to_string(), None)
        .unwrap();

    let big = vec![0u8; 8192];
    fs::write(pool.volumes()[0].root().join("big.mkv"), &big).unwrap();

    let probe = MapProbe(HashMap::from([
        (pool.volumes()[0].root(), (10_000_000u64, 20_000_000u64)),
        (pool.volumes()[1].root(), (90_000_000u64, 100_000_000u64)),
    ]));

    let report = pool.rebalance(&probe, &CancellationToken::new()).unwrap();
    assert_eq!(report.moves.len(), 1);
    assert!(!pool.volumes()[0].root().join("big.mkv").exists());
    assert!(pool.volumes()[1].root().join("big.mkv").exists());
}

/// S4 — Deep-scan hash mismatch.
#[test]
fn s4_deep_scan_flags_hash_mismatch_and_repair_declines() {
    let v1 = tempfile::tempdir().unwrap();
    let v2 = tempfile::tempdir().unwrap();
    let pool = engine()
        .create_pool(&[drive(v1.path()), drive(v2.path())], "Media".to_string(), None)
        .unwrap();

    fs::write(pool.volumes()[0].root().join("f.bin"), b"version one").unwrap();
    let shadow_dir = pool.volumes()[1].root().join("FOLDER.DUPLICATE.$DRIVEBENDER");
    fs::create_dir_all(&shadow_dir).unwrap();
    fs::write(shadow_dir.join("f.bin"), b"version two, different").unwrap();

    let report = pool.check(true, &CancellationToken::new()).unwrap();
    let issue = report.issues.iter().find(|i| i.kind == IntegrityIssueKind::HashMismatch).unwrap();
    assert_eq!(issue.locations.len(), 2);

    let probe = MapProbe(HashMap::new());
    let repaired = pool.repair_issue(issue, &probe, false, false).unwrap();
    assert!(!repaired);
    assert_eq!(fs::read(pool.volumes()[0].root().join("f.bin")).unwrap(), b"version one");
    assert_eq!(fs::read(shadow_dir.join("f.bin")).unwrap(), b"version two, different");
}

/// S5 — Drive removal space check.
#[test]
fn s5_drive_removal_check_reports_shortfall() {
    let v1 = tempfile::tempdir().unwrap();
    let v2 = tempfile::tempdir().unwrap();
    let pool = engine()
        .create_pool(&[drive(v1.path()), drive(v2.path())], "Media".to_string(), None)
        .unwrap();

    fs::write(pool.volumes()[0].root().join("big.bin"), vec![0u8; 60_000]).unwrap();
    let probe = MapProbe(HashMap::from([(pool.volumes()[1].root(), (50_000, 0))]));

    let check = pool.check_space_for_drive_removal(&probe, 0).unwrap();
    assert!(!check.feasible);
    assert!(check.shortfall > 0);
    assert!(check.recommendation.unwrap().contains("add"));
}

/// S6 — Atomic interruption. A write interrupted between temp-file creation
/// and rename must never surface as a logical file, and cleanup behavior is
/// covered at the unit level in `file_ops`; here a stray leftover temp file
/// is confirmed invisible to the public surface.
#[test]
fn s6_stray_temp_file_is_never_observed() {
    let v1 = tempfile::tempdir().unwrap();
    let pool = engine().create_pool(&[drive(v1.path())], "Media".to_string(), None).unwrap();

    fs::write(pool.volumes()[0].root().join("a.txt.TEMP.$DRIVEBENDER"), b"partial").unwrap();

    assert!(items(&pool).is_empty());
    let report = pool.check(false, &CancellationToken::new()).unwrap();
    assert_eq!(report.files_scanned, 0);
}

#[test]
fn repair_all_runs_fixers_in_order_and_merges_reports() {
    let v1 = tempfile::tempdir().unwrap();
    let pool = engine().create_pool(&[drive(v1.path())], "Media".to_string(), None).unwrap();

    let shadow_dir = pool.volumes()[0].root().join("FOLDER.DUPLICATE.$DRIVEBENDER");
    fs::create_dir_all(&shadow_dir).unwrap();
    fs::write(shadow_dir.join("x.txt"), b"data").unwrap();

    let probe = MapProbe(HashMap::new());
    let report = pool.repair_all(&probe, &CancellationToken::new()).unwrap();

    assert_eq!(report.primaries_restored, 1);
    assert!(pool.volumes()[0].root().join("x.txt").is_file());
}
