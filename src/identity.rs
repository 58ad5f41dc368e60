use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PoolError, Result};

/// A pool's 128-bit identifier, shared by all volumes that belong to it.
///
/// On disk this is rendered as a brace-delimited canonical GUID string, e.g.
/// `{5e36a1c2-...}`, matching the `<mount>/{<pool-id>}` layout every volume
/// root follows. The braces are part of the on-disk contract, not of
/// `Display` for the bare identifier — use [`PoolId::braced`] for the
/// directory-name form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(Uuid);

impl PoolId {
    pub fn new() -> Self {
        PoolId(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        PoolId(uuid)
    }

    /// The canonical on-disk directory name for this pool's root: `{<id>}`.
    pub fn braced(&self) -> String {
        format!("{{{}}}", self.0)
    }

    /// Parses a pool id from its bare canonical text (no braces), as found
    /// in a descriptor file's `id:` value.
    pub fn parse(text: &str) -> Result<Self> {
        Uuid::from_str(text.trim())
            .map(PoolId)
            .map_err(|_| PoolError::invalid(format!("not a valid 128-bit identifier: {text:?}")))
    }

    /// Parses a pool id from a directory name that may or may not carry the
    /// literal braces (`{<id>}` or bare `<id>`).
    pub fn parse_braced(text: &str) -> Result<Self> {
        let inner = text.strip_prefix('{').and_then(|s| s.strip_suffix('}')).unwrap_or(text);
        Self::parse(inner)
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
