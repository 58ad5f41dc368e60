//! Top-level engine: wires a pool's volumes together with the injected
//! capabilities (log sink, mount enumerator, free-space probe) and exposes
//! the whole operation surface as methods on `Pool`/`PoolEngine` instead of
//! free functions over loose volume slices.
//!
//! `Pool` owns its volumes by value; nothing here hands back a pointer into
//! the engine that produced it, so pools detected in one scan, or created
//! fresh, are interchangeable and independently movable.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::detector;
use crate::duplication;
use crate::error::Result;
use crate::identity::PoolId;
use crate::integrity::{self, IntegrityIssue};
use crate::overlay::LogicalFile;
use crate::logging::{LogEvent, LogLevel};
use crate::overlay::{self, LogicalWalker};
use crate::path::{DrivePath, FolderPath};
use crate::pool_manager::{self, DriveRemovalCheck, DriveRemovalOptions};
use crate::rebalancer;
use crate::repair;
use crate::report::{DriveRemovalReport, IntegrityReport, RebalanceReport, RepairReport};
use crate::sink::{FreeSpaceProbe, LogSink, MountEnumerator, NoopSink};
use crate::size::ByteSize;
use crate::volume::Volume;

/// One pool: a shared id, its current volumes, and the config every
/// operation on it reads. Free-space probing stays an explicit per-call
/// argument rather than a stored capability, since it's cheap to construct
/// and the callers that need it (rebalance, drive removal) already have one
/// at hand.
pub struct Pool {
    id: PoolId,
    volumes: Vec<Volume>,
    config: EngineConfig,
    sink: Arc<dyn LogSink>,
}

impl Pool {
    pub fn new(id: PoolId, volumes: Vec<Volume>, config: EngineConfig, sink: Arc<dyn LogSink>) -> Self {
        Pool { id, volumes, config, sink }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn log(&self, component: &str, level: LogLevel, message: impl Into<String>) {
        self.sink.emit(LogEvent::new(component, level, message));
    }

    /// Walks the logical namespace from `root`, merging every volume's
    /// physical tree into one view.
    pub fn get_items(&self, root: FolderPath, recursive: bool) -> LogicalWalker {
        overlay::get_items(self.volumes.clone(), root, recursive)
    }

    pub fn duplication_level(&self, folder: &FolderPath) -> u32 {
        duplication::get_level(&self.volumes, folder)
    }

    pub fn enable_duplication(&self, folder: &FolderPath, level: u32) -> Result<()> {
        duplication::enable(&self.volumes, folder, level)
    }

    pub fn disable_duplication(&self, folder: &FolderPath) -> Result<()> {
        duplication::disable(&self.volumes, folder)
    }

    pub fn set_duplication_level(&self, folder: &FolderPath, level: u32, probe: &dyn FreeSpaceProbe) -> Result<()> {
        duplication::set_level(&self.volumes, probe, folder, level)
    }

    pub fn fix_missing_duplication_on_all_folders(&self, cancel: &CancellationToken) -> Result<RepairReport> {
        repair::fix_missing_duplication_on_all_folders(&self.volumes, cancel)
    }

    pub fn fix_duplicate_primaries(&self, cancel: &CancellationToken) -> Result<RepairReport> {
        repair::fix_duplicate_primaries(&self.volumes, cancel)
    }

    pub fn fix_duplicate_shadow_copies(&self, cancel: &CancellationToken) -> Result<RepairReport> {
        repair::fix_duplicate_shadow_copies(&self.volumes, cancel)
    }

    pub fn fix_missing_primaries(&self, cancel: &CancellationToken) -> Result<RepairReport> {
        repair::fix_missing_primaries(&self.volumes, cancel)
    }

    pub fn fix_missing_shadow_copies(&self, probe: &dyn FreeSpaceProbe, cancel: &CancellationToken) -> Result<RepairReport> {
        repair::fix_missing_shadow_copies(&self.volumes, probe, cancel)
    }

    /// Runs all five fixers in order, stopping early if `cancel` fires
    /// between fixers; each fixer also checks `cancel` once per file it
    /// processes, so a cancellation mid-fixer stops that fixer promptly too.
    /// Their reports are merged into one so a caller sees everything that
    /// happened before any cancellation or per-file warning.
    pub fn repair_all(&self, probe: &dyn FreeSpaceProbe, cancel: &CancellationToken) -> Result<RepairReport> {
        self.log("repair", LogLevel::Info, "running all fixers");
        let mut report = self.fix_missing_duplication_on_all_folders(cancel)?;
        if cancel.is_cancelled() {
            return Ok(report);
        }
        report.merge(self.fix_duplicate_primaries(cancel)?);
        if cancel.is_cancelled() {
            return Ok(report);
        }
        report.merge(self.fix_duplicate_shadow_copies(cancel)?);
        if cancel.is_cancelled() {
            return Ok(report);
        }
        report.merge(self.fix_missing_primaries(cancel)?);
        if cancel.is_cancelled() {
            return Ok(report);
        }
        report.merge(self.fix_missing_shadow_copies(probe, cancel)?);
        Ok(report)
    }

    pub fn check(&self, deep_scan: bool, cancel: &CancellationToken) -> Result<IntegrityReport> {
        integrity::check(&self.volumes, deep_scan, cancel)
    }

    /// Runs the same checks `check()` runs, against a single already-resolved
    /// logical file rather than walking the whole pool.
    pub fn check_file(&self, file: &LogicalFile, deep_scan: bool) -> Result<Vec<IntegrityIssue>> {
        integrity::check_file(&self.volumes, file, deep_scan)
    }

    pub fn repair_issue(
        &self,
        issue: &IntegrityIssue,
        probe: &dyn FreeSpaceProbe,
        dry_run: bool,
        create_backup: bool,
    ) -> Result<bool> {
        integrity::repair_issue(&self.volumes, issue, probe, dry_run, create_backup)
    }

    pub fn rebalance(&self, probe: &dyn FreeSpaceProbe, cancel: &CancellationToken) -> Result<RebalanceReport> {
        self.log("rebalancer", LogLevel::Info, "rebalancing pool");
        rebalancer::rebalance(&self.volumes, probe, &self.config.rebalance, &self.config.physical, cancel)
    }

    pub fn add_drive(&mut self, mount: &DrivePath, description: Option<String>) -> Result<()> {
        let volume = pool_manager::add_drive(&self.volumes, mount, description)?;
        self.volumes.push(volume);
        Ok(())
    }

    pub fn check_space_for_drive_removal(&self, probe: &dyn FreeSpaceProbe, removing_index: usize) -> Result<DriveRemovalCheck> {
        pool_manager::check_space_for_drive_removal(&self.volumes, probe, &self.config.physical, removing_index)
    }

    pub fn remove_drive(
        &mut self,
        probe: &dyn FreeSpaceProbe,
        removing_index: usize,
        options: DriveRemovalOptions,
        cancel: &CancellationToken,
    ) -> Result<DriveRemovalReport> {
        self.log("pool_manager", LogLevel::Info, format!("removing drive {removing_index}"));
        pool_manager::remove_drive(&mut self.volumes, probe, &self.config.physical, removing_index, options, cancel)
    }

    pub fn replace_drive(
        &mut self,
        probe: &dyn FreeSpaceProbe,
        old_index: usize,
        new_mount: &DrivePath,
        cancel: &CancellationToken,
    ) -> Result<DriveRemovalReport> {
        let (_added, report) =
            pool_manager::replace_drive(&mut self.volumes, probe, &self.config.physical, old_index, new_mount, cancel)?;
        Ok(report)
    }

    /// Tears down every volume in this pool, consuming it.
    pub fn delete(self, remove_data: bool) -> Result<()> {
        pool_manager::delete_pool(&self.volumes, remove_data)
    }

    /// Point-in-time aggregate view of this pool's capacity: the sum of
    /// every volume's free/total bytes, plus a per-volume breakdown.
    pub fn stats(&self, probe: &dyn FreeSpaceProbe) -> Result<PoolSnapshot> {
        let mut volumes = Vec::with_capacity(self.volumes.len());
        let mut total = 0u64;
        let mut free = 0u64;
        for volume in &self.volumes {
            let (v_free, v_total) = probe.get_disk_free_space(&volume.root())?;
            total += v_total;
            free += v_free;
            volumes.push(VolumeSnapshot {
                label: volume.label().to_string(),
                mount: volume.mount.clone(),
                total: ByteSize::bytes(v_total),
                free: ByteSize::bytes(v_free),
            });
        }
        Ok(PoolSnapshot {
            id: self.id,
            bytes_total: ByteSize::bytes(total),
            bytes_used: ByteSize::bytes(total.saturating_sub(free)),
            bytes_free: ByteSize::bytes(free),
            volumes,
        })
    }
}

/// Aggregate capacity view of one pool, derived on demand rather than kept
/// as live engine state.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub id: PoolId,
    pub bytes_total: ByteSize,
    pub bytes_used: ByteSize,
    pub bytes_free: ByteSize,
    pub volumes: Vec<VolumeSnapshot>,
}

#[derive(Debug, Clone)]
pub struct VolumeSnapshot {
    pub label: String,
    pub mount: PathBuf,
    pub total: ByteSize,
    pub free: ByteSize,
}

/// Owns the capabilities used to find and construct pools: a mount
/// enumerator and a log sink, plus the default config handed to every
/// `Pool` it produces.
pub struct PoolEngine {
    enumerator: Arc<dyn MountEnumerator>,
    sink: Arc<dyn LogSink>,
    config: EngineConfig,
}

impl PoolEngine {
    pub fn new(enumerator: Arc<dyn MountEnumerator>) -> Self {
        PoolEngine {
            enumerator,
            sink: Arc::new(NoopSink),
            config: EngineConfig::default(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Scans every candidate mount root and groups the resulting volumes
    /// into pools by shared id.
    pub fn detect_pools(&self) -> Result<Vec<Pool>> {
        let detected = detector::detect(self.enumerator.as_ref())?;
        Ok(detected
            .into_iter()
            .map(|d| Pool::new(d.id, d.volumes, self.config.clone(), self.sink.clone()))
            .collect())
    }

    /// Creates a brand-new pool spanning `mounts`.
    pub fn create_pool(&self, mounts: &[DrivePath], volume_label: String, description: Option<String>) -> Result<Pool> {
        let (id, volumes) = pool_manager::create_pool(mounts, volume_label, description)?;
        Ok(Pool::new(id, volumes, self.config.clone(), self.sink.clone()))
    }
}
