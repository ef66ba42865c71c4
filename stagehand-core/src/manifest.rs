use crate::error::{Result, StageError};
use crate::path_safety::normalize_key;
use crate::persist;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const UFS_DEPLOYED_MANIFEST: &str = "Manifest_UFSFiles.txt";
pub const NON_UFS_DEPLOYED_MANIFEST: &str = "Manifest_NonUFSFiles.txt";
pub const UFS_DELTA_MANIFEST: &str = "Manifest_DeltaUFSFiles.txt";
pub const NON_UFS_DELTA_MANIFEST: &str = "Manifest_DeltaNonUFSFiles.txt";
pub const UFS_OBSOLETE_MANIFEST: &str = "Manifest_RemoveUFSFiles.txt";
pub const NON_UFS_OBSOLETE_MANIFEST: &str = "Manifest_RemoveNonUFSFiles.txt";

/// UFS files may end up inside a pak; NonUFS files are always deployed loose.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FileClass {
    Ufs,
    NonUfs,
}

impl FileClass {
    pub fn label(self) -> &'static str {
        match self {
            FileClass::Ufs => "UFSFiles",
            FileClass::NonUfs => "NonUFSFiles",
        }
    }
    pub fn deployed_manifest(self) -> &'static str {
        match self {
            FileClass::Ufs => UFS_DEPLOYED_MANIFEST,
            FileClass::NonUfs => NON_UFS_DEPLOYED_MANIFEST,
        }
    }
    pub fn delta_manifest(self) -> &'static str {
        match self {
            FileClass::Ufs => UFS_DELTA_MANIFEST,
            FileClass::NonUfs => NON_UFS_DELTA_MANIFEST,
        }
    }
    pub fn obsolete_manifest(self) -> &'static str {
        match self {
            FileClass::Ufs => UFS_OBSOLETE_MANIFEST,
            FileClass::NonUfs => NON_UFS_OBSOLETE_MANIFEST,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Absolute path of the originating file.
    pub source: String,
    /// Path relative to the staging root, `/`-separated.
    pub dest: String,
}

/// Ordered source -> destination mapping for one file class.
///
/// Sources are keyed through [`normalize_key`], so two sources that differ
/// only in case can never both be present.
#[derive(Clone, Debug)]
pub struct Manifest {
    class: FileClass,
    entries: Vec<ManifestEntry>,
    index: HashMap<String, usize>,
}

impl Manifest {
    pub fn new(class: FileClass) -> Self {
        Self { class, entries: Vec::new(), index: HashMap::new() }
    }

    pub fn class(&self) -> FileClass {
        self.class
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }
    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }

    pub fn dest_of(&self, source: &str) -> Option<&str> {
        self.index.get(&normalize_key(source)).map(|&i| self.entries[i].dest.as_str())
    }

    /// Add one entry. Re-adding the exact same pair is a no-op (`Ok(false)`);
    /// any other hit on the normalized source is a collision.
    pub fn insert(&mut self, source: impl Into<String>, dest: impl Into<String>) -> Result<bool> {
        let source = source.into();
        let dest = dest.into();
        let key = normalize_key(&source);
        if let Some(&i) = self.index.get(&key) {
            let prev = &self.entries[i];
            if prev.source == source && prev.dest == dest {
                return Ok(false);
            }
            return Err(StageError::Collision { first: prev.source.clone(), second: source });
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(ManifestEntry { source, dest });
        Ok(true)
    }

    /// Same entries with every destination passed through `remap`.
    pub fn map_dests(self, remap: impl Fn(&str) -> String) -> Self {
        let entries = self
            .entries
            .into_iter()
            .map(|e| ManifestEntry { dest: remap(&e.dest), source: e.source })
            .collect();
        Self { class: self.class, entries, index: self.index }
    }

    /// Diagnostic form: `"<source>" "<dest>"` per line. Never parsed back.
    pub fn render_dump(&self) -> String {
        let mut s = String::new();
        for e in &self.entries {
            s.push_str(&format!("\"{}\" \"{}\"\n", e.source, e.dest));
        }
        s
    }

    /// Write the diagnostic dump; empty manifests produce no file.
    pub fn dump(&self, path: &Path) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        persist::write_atomic(path, self.render_dump().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_variant_sources_collide() {
        let mut m = Manifest::new(FileClass::Ufs);
        m.insert("/a/Foo.txt", "Foo.txt").unwrap();
        let err = m.insert("/a/foo.txt", "foo.txt").unwrap_err();
        match err {
            StageError::Collision { first, second } => {
                assert_eq!(first, "/a/Foo.txt");
                assert_eq!(second, "/a/foo.txt");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exact_repeat_is_noop() {
        let mut m = Manifest::new(FileClass::NonUfs);
        assert!(m.insert("/a/b.bin", "b.bin").unwrap());
        assert!(!m.insert("/a/b.bin", "b.bin").unwrap());
        assert!(m.insert("/a/b.bin", "other/b.bin").is_err());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn dump_format() {
        let mut m = Manifest::new(FileClass::Ufs);
        m.insert("/src/x.txt", "Game/x.txt").unwrap();
        assert_eq!(m.render_dump(), "\"/src/x.txt\" \"Game/x.txt\"\n");
        assert_eq!(m.dest_of("/SRC/X.TXT"), Some("Game/x.txt"));
    }
}
