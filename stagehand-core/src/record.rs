//! `<dest>\t<stamp>` manifests as read back from a device or the stage.

use crate::error::{IoContext, Result, StageError};
use crate::path_safety::normalize_key;
use crate::persist;
use crate::policy::PlatformPolicy;
use crate::stamp::{parse_timestamp, StampKind};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stamped {
    /// Destination path as first spelled in the input.
    pub path: String,
    pub stamp: String,
}

/// Destination -> stamp, keyed case- and separator-insensitively.
///
/// Duplicate paths are merged: a content-hash path keeps the stamp that
/// differs, a timestamp path keeps the newer one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeployedRecord {
    files: BTreeMap<String, Stamped>,
}

impl DeployedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn get(&self, path: &str) -> Option<&Stamped> {
        self.files.get(&normalize_key(path))
    }
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(&normalize_key(path))
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Stamped> {
        self.files.values()
    }

    /// Merge one record. `None` means a timestamp stamp did not parse; the
    /// record is left unchanged in that case.
    pub fn merge(&mut self, path: &str, stamp: &str, policy: &PlatformPolicy) -> Option<()> {
        let kind = StampKind::for_crc(policy.is_crc_significant(path));
        if kind == StampKind::Timestamp {
            parse_timestamp(stamp)?;
        }
        let key = normalize_key(path);
        match self.files.get_mut(&key) {
            Some(cur) => {
                if kind.supersedes(stamp, &cur.stamp)? {
                    cur.stamp = stamp.to_string();
                }
            }
            None => {
                self.files
                    .insert(key, Stamped { path: path.to_string(), stamp: stamp.to_string() });
            }
        }
        Some(())
    }

    /// Parse `text` (read from `origin`) into this record. Returns how many
    /// lines carried a record, duplicates included.
    pub fn parse_into(&mut self, origin: &Path, text: &str, policy: &PlatformPolicy) -> Result<usize> {
        let mut parsed = 0usize;
        for (i, raw) in text.split('\n').enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let Some((path, stamp)) = line.split_once('\t') else {
                return Err(StageError::Manifest {
                    path: origin.to_path_buf(),
                    line: i + 1,
                    reason: "expected <path>\\t<stamp>".to_string(),
                });
            };
            // Later columns are ignored.
            let stamp = stamp.split('\t').next().unwrap_or_default().trim();
            if path.is_empty() || stamp.is_empty() {
                return Err(StageError::Manifest {
                    path: origin.to_path_buf(),
                    line: i + 1,
                    reason: "empty path or stamp".to_string(),
                });
            }
            if self.merge(path, stamp, policy).is_none() {
                return Err(StageError::BadStamp {
                    path: origin.to_path_buf(),
                    line: i + 1,
                    value: stamp.to_string(),
                });
            }
            parsed += 1;
        }
        Ok(parsed)
    }

    /// Read a whole file. Returns the record and its line count.
    pub fn read(path: &Path, policy: &PlatformPolicy) -> Result<(Self, usize)> {
        let text = std::fs::read_to_string(path).at(path)?;
        let mut rec = Self::new();
        let n = rec.parse_into(path, &text, policy)?;
        Ok((rec, n))
    }

    /// `<path>\t<stamp>` lines in key order.
    pub fn render(&self) -> String {
        let mut s = String::new();
        for e in self.files.values() {
            s.push_str(&e.path);
            s.push('\t');
            s.push_str(&e.stamp);
            s.push('\n');
        }
        s
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        persist::write_atomic(path, self.render().as_bytes())
    }
}
