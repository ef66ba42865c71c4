use crate::error::{Result, StageError};
use crate::manifest::{FileClass, Manifest};
use crate::path_safety::to_slash;
use crate::persist;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Internal-path prefixes that must never end up in a pak.
#[derive(Clone, Debug, Default)]
pub struct Blacklist {
    prefixes: Vec<String>,
}

impl Blacklist {
    pub fn new<S: Into<String>>(prefixes: impl IntoIterator<Item = S>) -> Self {
        let prefixes = prefixes
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.trim().is_empty())
            .collect();
        Self { prefixes }
    }

    /// Legacy `PakBlacklist-<Config>.txt`: one prefix per non-blank line.
    pub fn load(path: &Path) -> Result<Self> {
        info!("applying pak blacklist file {}", path.display());
        Ok(Self::new(persist::read_lines(path)?))
    }

    pub fn extend(&mut self, other: Blacklist) {
        self.prefixes.extend(other.prefixes);
    }

    pub fn blocks(&self, internal: &str) -> bool {
        self.prefixes.iter().any(|p| internal.starts_with(p.as_str()))
    }
}

/// `internal_root` + `dest`, forward slashes throughout.
pub fn internal_path(internal_root: &str, dest: &str) -> String {
    let root = internal_root.replace('\\', "/");
    let dest = to_slash(dest);
    let dest = dest.trim_start_matches('/');
    if root.is_empty() {
        dest.to_string()
    } else if root.ends_with('/') {
        format!("{root}{dest}")
    } else {
        format!("{root}/{dest}")
    }
}

/// Map a UFS manifest to the paths it will have inside the pak.
///
/// The result is itself a [`Manifest`] (source -> internal path), so the
/// case-insensitive source collision check runs again here.
pub fn build_response(
    manifest: &Manifest,
    internal_root: &str,
    blacklist: &Blacklist,
) -> Result<Manifest> {
    let mut out = Manifest::new(FileClass::Ufs);
    for e in manifest.iter() {
        let internal = internal_path(internal_root, &e.dest);
        if blacklist.blocks(&internal) {
            warn!("excluding {} (blacklisted)", e.source);
            continue;
        }
        out.insert(e.source.clone(), internal)?;
    }
    Ok(out)
}

/// Pak tool response file: `"<source>" "<internal>"` per line, optionally `-compress`.
pub fn write_response_file(path: &Path, response: &Manifest, compress: bool) -> Result<()> {
    let lines = response.iter().map(|e| {
        let mut l = format!("\"{}\" \"{}\"", e.source, e.dest);
        if compress {
            l.push_str(" -compress");
        }
        l
    });
    persist::write_lines(path, lines)
}

/// Membership list for one streaming-install chunk.
#[derive(Clone, Debug)]
pub struct ChunkSet {
    pub name: String,
    members: HashSet<String>,
}

impl ChunkSet {
    pub fn new<S: AsRef<str>>(name: impl Into<String>, members: impl IntoIterator<Item = S>) -> Self {
        let members = members.into_iter().map(|m| m.as_ref().to_lowercase()).collect();
        Self { name: name.into(), members }
    }

    /// Chunk manifest file: one path per line; the chunk takes the file stem as its name.
    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| StageError::config(format!("bad chunk manifest name {}", path.display())))?;
        Ok(Self::new(name, persist::read_lines(path)?))
    }

    /// Any of the lookup forms of `path` is a member.
    pub fn contains(&self, path: &str) -> bool {
        lookup_forms(path).iter().any(|f| self.members.contains(&f.to_lowercase()))
    }
}

/// The path and its extension-less variant, each in native, `\` and `/` spelling.
fn lookup_forms(path: &str) -> Vec<String> {
    let sep = path.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    let no_ext = match path[sep..].rfind('.') {
        Some(dot) if dot > 0 => &path[..sep + dot],
        _ => path,
    };
    let mut v = Vec::with_capacity(6);
    for base in [path, no_ext] {
        v.push(base.to_string());
        v.push(base.replace('/', "\\"));
        v.push(base.replace('\\', "/"));
    }
    v
}

/// One pak's worth of the response.
#[derive(Clone, Debug)]
pub struct PakResponse {
    pub name: String,
    pub files: Manifest,
}

/// Split `response` across `chunks`. First matching chunk wins; anything
/// unmatched goes to chunk 0. Every file lands in exactly one chunk.
pub fn partition(response: &Manifest, chunks: &[ChunkSet]) -> Result<Vec<PakResponse>> {
    if chunks.is_empty() {
        return Err(StageError::config("chunk list is empty"));
    }
    let mut out: Vec<PakResponse> = chunks
        .iter()
        .map(|c| PakResponse { name: c.name.clone(), files: Manifest::new(FileClass::Ufs) })
        .collect();
    for e in response.iter() {
        let idx = chunks.iter().position(|c| c.contains(&e.source)).unwrap_or(0);
        out[idx].files.insert(e.source.clone(), e.dest.clone())?;
    }
    Ok(out)
}
