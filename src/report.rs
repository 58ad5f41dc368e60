//! Result types for the long-running operations (repair, integrity check,
//! rebalance, drive removal): each carries per-item counters and any
//! per-file warnings collected along the way, instead of the caller only
//! learning about the first failure and nothing that happened before it.

use crate::integrity::IntegrityIssue;
use crate::rebalancer::RebalanceMove;

/// Outcome of running one or more repair fixers.
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    pub sentinels_created: u64,
    pub primaries_deduped: u64,
    pub shadows_deduped: u64,
    pub primaries_restored: u64,
    pub shadows_restored: u64,
    pub warnings: Vec<String>,
}

impl RepairReport {
    pub fn merge(&mut self, other: RepairReport) {
        self.sentinels_created += other.sentinels_created;
        self.primaries_deduped += other.primaries_deduped;
        self.shadows_deduped += other.shadows_deduped;
        self.primaries_restored += other.primaries_restored;
        self.shadows_restored += other.shadows_restored;
        self.warnings.extend(other.warnings);
    }
}

/// Outcome of an integrity check pass.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub issues: Vec<IntegrityIssue>,
    pub files_scanned: u64,
    pub warnings: Vec<String>,
}

/// Outcome of one rebalance pass.
#[derive(Debug, Clone, Default)]
pub struct RebalanceReport {
    pub moves: Vec<RebalanceMove>,
    pub bytes_moved: u64,
    pub warnings: Vec<String>,
}

/// Outcome of removing (or replacing) a drive from a pool.
#[derive(Debug, Clone, Default)]
pub struct DriveRemovalReport {
    pub files_migrated: u64,
    pub bytes_migrated: u64,
    pub warnings: Vec<String>,
}
