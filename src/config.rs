//! Ambient engine configuration, grouping tunables the fixers, rebalancer
//! and integrity checker read into one place rather than scattering
//! constants across modules.

use serde::{Deserialize, Serialize};

use crate::size::ByteSize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub physical: PhysicalConfig,
    pub rebalance: RebalanceConfig,
    pub integrity: IntegrityConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            physical: PhysicalConfig::default(),
            rebalance: RebalanceConfig::default(),
            integrity: IntegrityConfig::default(),
        }
    }
}

/// Controls the Physical Layer's enumeration behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalConfig {
    /// When true, I/O errors walking a subtree are swallowed and that
    /// subtree yields an empty sequence rather than aborting the scan.
    pub suppress_enumeration_errors: bool,
}

impl Default for PhysicalConfig {
    fn default() -> Self {
        PhysicalConfig {
            suppress_enumeration_errors: true,
        }
    }
}

/// Thresholds for the rebalancer. `min_diff`/`min_file` are defaults here,
/// not hardcoded literals, so pools with unusual file-size distributions
/// can be tuned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceConfig {
    pub min_diff: ByteSize,
    pub min_file: ByteSize,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        RebalanceConfig {
            min_diff: ByteSize::bytes(2 * 1024 * 1024),
            min_file: ByteSize::bytes(4096),
        }
    }
}

/// Defaults for the integrity checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityConfig {
    pub deep_scan_default: bool,
    pub create_backup_default: bool,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        IntegrityConfig {
            deep_scan_default: false,
            create_backup_default: true,
        }
    }
}
