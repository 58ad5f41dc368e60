use std::path::PathBuf;

use crate::identity::PoolId;

/// Error taxonomy for the pool engine's public boundary.
///
/// Operations never leak a bare I/O error or panic across the API; every
/// fallible public call returns one of these kinds so callers can branch on
/// *what kind* of failure happened rather than parse a message.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("access denied: {0}")]
    AccessDenied(PathBuf),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("capacity exceeded for pool {pool}: need {required} bytes, have {available} bytes free")]
    CapacityExceeded {
        pool: PoolId,
        required: u64,
        available: u64,
    },
}

impl PoolError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            PoolError::AccessDenied(path)
        } else {
            PoolError::Io { path, source }
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        PoolError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        PoolError::NotFound(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;

/// Extension trait to attach a path to a raw `std::io::Error`.
pub trait IoResultExt<T> {
    fn path_ctx(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn path_ctx(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| PoolError::io(path, e))
    }
}
