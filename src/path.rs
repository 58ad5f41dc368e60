//! Path primitives.
//!
//! Internal representation always uses `/` as the separator; platform paths
//! are normalized to forward slashes before any logic runs on them.

use std::path::{Path, PathBuf};

use crate::error::{PoolError, Result};

const ILLEGAL_CHARS: &[char] = &['<', '>', '"', '|', '?', '*', '\0'];

/// A validated pool name: non-empty, ≤ 255 code units, no filename-illegal
/// characters, trimmed, compared case-insensitively.
#[derive(Debug, Clone)]
pub struct PoolName(String);

impl PoolName {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(PoolError::invalid("pool name must not be empty"));
        }
        if trimmed.encode_utf16().count() > 255 {
            return Err(PoolError::invalid("pool name exceeds 255 code units"));
        }
        if let Some(c) = trimmed.chars().find(|c| ILLEGAL_CHARS.contains(c)) {
            return Err(PoolError::invalid(format!("pool name contains illegal character {c:?}")));
        }
        Ok(PoolName(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for PoolName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}
impl Eq for PoolName {}

/// A directory on the host that is known to exist at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrivePath(PathBuf);

impl DrivePath {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(PoolError::invalid(format!(
                "drive path does not exist or is not a directory: {}",
                path.display()
            )));
        }
        Ok(DrivePath(path))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

/// A normalized relative path within a pool's logical namespace, using `/`
/// as the only separator. Leading/trailing separators are stripped,
/// internal empty segments collapsed, and filename-illegal characters
/// (`<>"|?*` plus NUL) are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FolderPath {
    segments: Vec<String>,
}

impl FolderPath {
    pub const ROOT: FolderPath = FolderPath { segments: Vec::new() };

    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        if let Some(c) = raw.chars().find(|c| ILLEGAL_CHARS.contains(c)) {
            return Err(PoolError::invalid(format!("folder path contains illegal character {c:?}")));
        }
        let segments = raw
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Ok(FolderPath { segments })
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        FolderPath { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    /// Parent folder path, or the root itself if this is already root.
    pub fn parent(&self) -> FolderPath {
        if self.segments.is_empty() {
            FolderPath::ROOT
        } else {
            FolderPath {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            }
        }
    }

    pub fn combine(&self, child: &str) -> Result<FolderPath> {
        let mut segments = self.segments.clone();
        let appended = FolderPath::new(child)?;
        segments.extend(appended.segments);
        Ok(FolderPath { segments })
    }

    /// Renders this logical path relative to a volume root, using the
    /// host's native path separator.
    pub fn to_relative_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    pub fn as_logical_string(&self) -> String {
        self.segments.join("/")
    }
}

impl std::fmt::Display for FolderPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_logical_string())
    }
}
