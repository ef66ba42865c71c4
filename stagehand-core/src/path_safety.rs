use crate::error::{Result, StageError};
use std::path::{Component, Path, PathBuf};

/// Forward slashes only, no duplicate or trailing separators.
pub fn to_slash(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for part in path.split(['/', '\\']) {
        if part.is_empty() || part == "." {
            continue;
        }
        if !out.is_empty() || path.starts_with(['/', '\\']) {
            out.push('/');
        }
        out.push_str(part);
    }
    out
}

/// Key used for every case-insensitive path lookup: slash-normalized, then lower-cased.
pub fn normalize_key(path: &str) -> String {
    to_slash(path).to_lowercase()
}

/// Join relative segments with `/`, skipping empty ones.
pub fn join_rel<S: AsRef<str>>(parts: &[S]) -> String {
    let mut out = String::new();
    for p in parts {
        let p = to_slash(p.as_ref());
        let p = p.trim_start_matches('/');
        if p.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(p);
    }
    out
}

/// Destination paths must stay under the staging root: no absolute paths, no `..`.
pub fn validate_dest(rel: &str) -> Result<()> {
    let p = Path::new(rel);
    if p.is_absolute() || rel.starts_with(['/', '\\']) {
        return Err(StageError::config(format!("absolute destination not allowed: {rel}")));
    }
    for comp in p.components() {
        if matches!(comp, Component::ParentDir | Component::Prefix(_)) {
            return Err(StageError::config(format!("parent traversal not allowed: {rel}")));
        }
    }
    Ok(())
}

/// Resolve `rel` inside `stage_dir`. Any symlinked component along the way is
/// refused so a copy can never land outside the stage.
pub fn resolve_in_stage(stage_dir: &Path, rel: &str) -> Result<PathBuf> {
    validate_dest(rel)?;
    let candidate = stage_dir.join(rel);
    let mut cur = stage_dir.to_path_buf();
    for comp in Path::new(rel).components() {
        cur.push(comp);
        if let Ok(m) = std::fs::symlink_metadata(&cur) {
            if m.file_type().is_symlink() {
                return Err(StageError::config(format!(
                    "symlink in staged path (not following): {}",
                    cur.display()
                )));
            }
        }
    }
    Ok(candidate)
}
