//! Size primitives.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};

const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// An unsigned byte count with a human-readable binary-unit formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const ZERO: ByteSize = ByteSize(0);

    pub fn bytes(n: u64) -> Self {
        ByteSize(n)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Formats using binary units (B/KiB/MiB/…/EiB): picks the largest unit
    /// whose byte scale is ≥ `size / 1.5` (so a value doesn't bump to the
    /// next unit until it's past the halfway-ish point), with at most one
    /// fractional digit. Zero renders as `0B`.
    pub fn format(&self) -> String {
        if self.0 == 0 {
            return "0B".to_string();
        }

        let size = self.0 as f64;
        let mut unit_index = 0usize;
        for (i, _) in UNITS.iter().enumerate().rev() {
            let unit_scale = 1024f64.powi(i as i32);
            if size >= unit_scale / 1.5 {
                unit_index = i;
                break;
            }
        }

        let value = size / 1024f64.powi(unit_index as i32);
        if (value - value.round()).abs() < 0.05 {
            format!("{:.0}{}", value.round(), UNITS[unit_index])
        } else {
            format!("{:.1}{}", value, UNITS[unit_index])
        }
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

impl Add for ByteSize {
    type Output = ByteSize;
    /// Wraps on overflow rather than panicking.
    fn add(self, rhs: Self) -> Self::Output {
        ByteSize(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for ByteSize {
    type Output = ByteSize;
    fn sub(self, rhs: Self) -> Self::Output {
        ByteSize(self.0.wrapping_sub(rhs.0))
    }
}

impl From<u64> for ByteSize {
    fn from(n: u64) -> Self {
        ByteSize(n)
    }
}

/// Duplication level for a folder: the number of additional copies beyond
/// the primary expected for each file under it. `0` means disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DuplicationLevel(u8);

impl DuplicationLevel {
    pub const DISABLED: DuplicationLevel = DuplicationLevel(0);
    pub const SINGLE: DuplicationLevel = DuplicationLevel(1);
    pub const DOUBLE: DuplicationLevel = DuplicationLevel(2);
    pub const TRIPLE: DuplicationLevel = DuplicationLevel(3);

    const MAX: u8 = 10;

    /// Validates `level` against the pool's volume count: level must be in
    /// `[0, min(10, volume_count - 1)]`, since each shadow needs a volume of
    /// its own, distinct from the primary's.
    pub fn new(level: u32, volume_count: usize) -> Result<Self> {
        let cap = Self::MAX.min(volume_count.saturating_sub(1).min(u8::MAX as usize) as u8);
        if level > cap as u32 {
            return Err(PoolError::invalid(format!(
                "duplication level {level} exceeds maximum {cap} for a pool with {volume_count} volume(s)"
            )));
        }
        Ok(DuplicationLevel(level as u8))
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn is_disabled(&self) -> bool {
        self.0 == 0
    }

    /// Total distinct locations a file under a folder at this level is
    /// expected on: one primary plus `level` shadows.
    pub fn expected_locations(&self) -> usize {
        self.0 as usize + 1
    }

    /// Whether this level is achievable given the pool's volume count
    /// (`|volumes| >= level + 1`).
    pub fn is_achievable(&self, volume_count: usize) -> bool {
        volume_count >= self.expected_locations()
    }
}
