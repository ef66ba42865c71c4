use crate::error::{Result, StageError};
use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

/// Where files to stage come from.
pub trait SourceProvider {
    /// `/`-separated paths, relative to `root`, of files whose name matches
    /// `pattern`. Sorted.
    fn enumerate(&self, root: &Path, pattern: &str, recursive: bool) -> Result<Vec<String>>;
    fn exists(&self, path: &Path) -> bool;
    /// Names of the immediate subdirectories of `root`. Sorted.
    fn subdirectories(&self, root: &Path) -> Result<Vec<String>>;
}

/// The local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsSource;

impl SourceProvider for FsSource {
    fn enumerate(&self, root: &Path, pattern: &str, recursive: bool) -> Result<Vec<String>> {
        let matcher = name_matcher(pattern)?;
        let mut walker = WalkDir::new(root).min_depth(1).follow_links(false);
        if !recursive {
            walker = walker.max_depth(1);
        }
        let mut out = vec![];
        for ent in walker {
            let ent = ent.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                StageError::io(path, e.into())
            })?;
            if !ent.file_type().is_file() {
                continue;
            }
            if !matcher.is_match(ent.file_name()) {
                continue;
            }
            let rel = ent.path().strip_prefix(root).unwrap_or(ent.path());
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
        out.sort();
        Ok(out)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn subdirectories(&self, root: &Path) -> Result<Vec<String>> {
        let mut out = vec![];
        for ent in WalkDir::new(root).min_depth(1).max_depth(1) {
            let ent = ent.map_err(|e| StageError::io(root, e.into()))?;
            if ent.file_type().is_dir() {
                out.push(ent.file_name().to_string_lossy().to_string());
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Case-insensitive matcher for a single file-name wildcard like `*.locres`.
pub fn name_matcher(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| StageError::config(format!("bad pattern {pattern:?}: {e}")))
}

/// Case-insensitive set of relative-path exclusions. `*` crosses directories,
/// so `*.uasset` excludes at any depth.
pub fn exclude_set(patterns: &[String]) -> Result<GlobSet> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        let g = GlobBuilder::new(p)
            .case_insensitive(true)
            .build()
            .map_err(|e| StageError::config(format!("bad exclude pattern {p:?}: {e}")))?;
        b.add(g);
    }
    b.build().map_err(|e| StageError::config(format!("bad exclude set: {e}")))
}
