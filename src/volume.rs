//! Volume identity and descriptor parsing.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{IoResultExt, PoolError, Result};
use crate::identity::PoolId;
use crate::sentinel;
use crate::size::ByteSize;

/// A volume's descriptor, as parsed from `*.MP.$DRIVEBENDER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    pub id: PoolId,
    pub volume_label: String,
    pub description: Option<String>,
    pub created: Option<String>,
}

impl VolumeDescriptor {
    /// Parses a descriptor body: line-oriented `key:value`, split on the
    /// first `:`; keys case-insensitive, last-wins on duplicates, blank and
    /// malformed lines ignored.
    pub fn parse(body: &str) -> Result<Self> {
        let mut fields: std::collections::HashMap<String, String> = std::collections::HashMap::new();
        for line in body.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let Some(idx) = line.find(':') else { continue };
            let key = line[..idx].trim().to_ascii_lowercase();
            if key.is_empty() {
                continue;
            }
            let value = line[idx + 1..].trim().to_string();
            fields.insert(key, value);
        }

        let id_text = fields
            .get("id")
            .ok_or_else(|| PoolError::invalid("descriptor missing required key 'id'"))?;
        let id = PoolId::parse(id_text)?;

        let volume_label = fields
            .get("volumelabel")
            .ok_or_else(|| PoolError::invalid("descriptor missing required key 'volumelabel'"))?
            .clone();

        Ok(VolumeDescriptor {
            id,
            volume_label,
            description: fields.get("description").cloned(),
            created: fields.get("created").cloned(),
        })
    }

    pub fn to_body(&self) -> String {
        let mut body = format!("id:{}\nvolumelabel:{}\n", self.id, self.volume_label);
        if let Some(desc) = &self.description {
            body.push_str(&format!("description:{desc}\n"));
        }
        if let Some(created) = &self.created {
            body.push_str(&format!("created:{created}\n"));
        }
        body
    }
}

/// A single volume: a directory tree rooted at `<mount>/{<pool-id>}`, with a
/// sibling descriptor file declaring its pool membership.
#[derive(Debug, Clone)]
pub struct Volume {
    pub descriptor: VolumeDescriptor,
    pub mount: PathBuf,
    pub descriptor_path: PathBuf,
}

impl Volume {
    /// The volume's root directory: `<mount>/{<pool-id>}`.
    pub fn root(&self) -> PathBuf {
        self.mount.join(self.descriptor.id.braced())
    }

    pub fn label(&self) -> &str {
        &self.descriptor.volume_label
    }

    /// Current free/total bytes for this volume, via the injected probe.
    pub fn space(&self, probe: &dyn crate::sink::FreeSpaceProbe) -> Result<(ByteSize, ByteSize)> {
        let (free, total) = probe.get_disk_free_space(&self.root())?;
        Ok((ByteSize::bytes(free), ByteSize::bytes(total)))
    }

    /// Writes (or rewrites) this volume's descriptor file atomically.
    pub fn save_descriptor(&self) -> Result<()> {
        let body = self.descriptor.to_body();
        let temp_path = self.descriptor_path.with_extension("tmp");
        fs::write(&temp_path, &body).path_ctx(&temp_path)?;
        fs::rename(&temp_path, &self.descriptor_path).path_ctx(&self.descriptor_path)?;
        Ok(())
    }

    /// Attempts to load a volume from a descriptor file path. Returns `Ok(None)`
    /// (not an error) if the descriptor doesn't parse or the sibling pool-root
    /// directory is missing; the caller (the detector) treats this as "skip",
    /// not "abort".
    pub fn try_from_descriptor(descriptor_path: &Path) -> Result<Option<Volume>> {
        let mount = descriptor_path
            .parent()
            .ok_or_else(|| PoolError::invalid("descriptor path has no parent mount"))?
            .to_path_buf();

        let body = match fs::read_to_string(descriptor_path) {
            Ok(body) => body,
            Err(_) => return Ok(None),
        };

        let descriptor = match VolumeDescriptor::parse(&body) {
            Ok(d) => d,
            Err(_) => return Ok(None),
        };

        let root = mount.join(descriptor.id.braced());
        if !root.is_dir() {
            return Ok(None);
        }

        Ok(Some(Volume {
            descriptor,
            mount,
            descriptor_path: descriptor_path.to_path_buf(),
        }))
    }

    /// Creates a fresh volume on `mount`: the `{<pool-id>}` directory and a
    /// descriptor file.
    pub fn create(mount: &Path, id: PoolId, volume_label: String, description: Option<String>) -> Result<Volume> {
        let root = mount.join(id.braced());
        fs::create_dir_all(&root).path_ctx(&root)?;

        let descriptor = VolumeDescriptor {
            id,
            volume_label,
            description,
            created: Some(Utc::now().to_rfc3339()),
        };

        let descriptor_path = mount.join(format!("volume{}", sentinel::DESCRIPTOR_SUFFIX));
        let volume = Volume {
            descriptor,
            mount: mount.to_path_buf(),
            descriptor_path,
        };
        volume.save_descriptor()?;
        Ok(volume)
    }

    /// Deletes this volume's descriptor; optionally the pool-root tree too.
    pub fn teardown(&self, remove_data: bool) -> Result<()> {
        if self.descriptor_path.exists() {
            fs::remove_file(&self.descriptor_path).path_ctx(&self.descriptor_path)?;
        }
        if remove_data {
            let root = self.root();
            if root.exists() {
                fs::remove_dir_all(&root).path_ctx(&root)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_first_colon_and_lowercases_keys() {
        let body = "ID: 5e36a1c2-1f2e-4f3a-9a3b-000000000001\nVolumeLabel:Archive\nDescription: notes: extra\n";
        let d = VolumeDescriptor::parse(body).unwrap();
        assert_eq!(d.volume_label, "Archive");
        assert_eq!(d.description.as_deref(), Some("notes: extra"));
    }

    #[test]
    fn parse_last_key_wins_and_ignores_blank_malformed_lines() {
        let id = PoolId::new();
        let body = format!(
            "volumelabel:First\n\nmalformed line without colon\nvolumelabel:Second\nid:{id}\n"
        );
        let d = VolumeDescriptor::parse(&body).unwrap();
        assert_eq!(d.volume_label, "Second");
        assert_eq!(d.id, id);
    }

    #[test]
    fn parse_requires_id_and_volumelabel() {
        assert!(VolumeDescriptor::parse("description:only\n").is_err());
        let id = PoolId::new();
        assert!(VolumeDescriptor::parse(&format!("id:{id}\n")).is_err());
    }

    #[test]
    fn create_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let created = Volume::create(dir.path(), id, "Label".to_string(), None).unwrap();
        let reloaded = Volume::try_from_descriptor(&created.descriptor_path).unwrap().unwrap();
        assert_eq!(reloaded.descriptor.id, id);
        assert_eq!(reloaded.label(), "Label");
    }

    #[test]
    fn missing_pool_root_directory_is_skipped_not_erred() {
        let dir = tempfile::tempdir().unwrap();
        let id = PoolId::new();
        let descriptor = VolumeDescriptor {
            id,
            volume_label: "X".to_string(),
            description: None,
            created: None,
        };
        let descriptor_path = dir.path().join(format!("v{}", sentinel::DESCRIPTOR_SUFFIX));
        fs::write(&descriptor_path, descriptor.to_body()).unwrap();
        // No `{<id>}` directory created.
        assert!(Volume::try_from_descriptor(&descriptor_path).unwrap().is_none());
    }
}
