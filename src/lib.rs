mod cancel;
mod config;
mod detector;
mod duplication;
mod engine;
mod error;
mod file_ops;
mod identity;
mod integrity;
mod logging;
mod overlay;
mod path;
mod physical;
mod pool_manager;
mod rebalancer;
mod repair;
mod report;
mod sentinel;
mod sink;
mod size;
mod volume;

pub use cancel::CancellationToken;
pub use config::{EngineConfig, IntegrityConfig, PhysicalConfig, RebalanceConfig};
pub use engine::{Pool, PoolEngine, PoolSnapshot, VolumeSnapshot};
pub use error::{PoolError, Result};
pub use identity::PoolId;
pub use integrity::{IntegrityIssue, IntegrityIssueKind};
pub use logging::{EventLogSink, LogCrateSink, LogEvent, LogLevel};
pub use overlay::{Location, LogicalFile, LogicalFolder, LogicalItem, LogicalWalker};
pub use path::{DrivePath, FolderPath, PoolName};
pub use physical::{PhysicalItem, PhysicalWalker};
pub use pool_manager::{DriveRemovalCheck, DriveRemovalOptions};
pub use rebalancer::RebalanceMove;
pub use report::{DriveRemovalReport, IntegrityReport, RebalanceReport, RepairReport};
pub use sink::{DriveLetterRoots, FixedRoots, FreeSpaceProbe, LogSink, MountEnumerator, NoopSink};
#[cfg(unix)]
pub use sink::StatvfsProbe;
pub use size::{ByteSize, DuplicationLevel};
pub use volume::{Volume, VolumeDescriptor};
