use crate::path_safety::normalize_key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PakMode {
    Always,
    Never,
    /// Follow the project's own `pak.enabled` switch.
    #[default]
    Optional,
}

/// What the target platform dictates about casing, hashing and packing.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct PlatformPolicy {
    pub name: String,
    /// Destination paths whose staleness is judged by content hash, not mtime.
    pub crc_files: BTreeSet<String>,
    /// Lower-case destinations of loose files.
    pub lowercase_loose: bool,
    /// Lower-case paths inside the pak.
    pub lowercase_pak_internal: bool,
    pub pak: PakMode,
}

impl PlatformPolicy {
    pub fn is_crc_significant(&self, dest: &str) -> bool {
        if self.crc_files.contains(dest) {
            return true;
        }
        let key = normalize_key(dest);
        self.crc_files.iter().any(|f| normalize_key(f) == key)
    }

    pub fn use_pak(&self, project_wants_pak: bool) -> bool {
        match self.pak {
            PakMode::Always => true,
            PakMode::Never => false,
            PakMode::Optional => project_wants_pak,
        }
    }

    /// Platform path remap. Deterministic and idempotent.
    pub fn remap(&self, dest: &str, lower: bool) -> String {
        if lower {
            dest.to_lowercase()
        } else {
            dest.to_string()
        }
    }
}
