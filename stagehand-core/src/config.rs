//! `stage.toml`.
//!
//! Relative paths are resolved against the directory holding the file.
//! Legacy `(Path="...")` directory strings are accepted next to typed
//! `{ path = "..." }` tables and parsed once here.

use crate::archiver::ProcessArchiver;
use crate::builder::StageRequest;
use crate::culture::parent_cultures;
use crate::error::{IoContext, Result, StageError};
use crate::manifest::FileClass;
use crate::path_safety::validate_dest;
use crate::policy::PlatformPolicy;
use crate::source::{exclude_set, name_matcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn yes() -> bool {
    true
}
fn any_file() -> String {
    "*".to_string()
}
fn default_internal_root() -> String {
    "../../../".to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub stage_dir: PathBuf,
    /// Diagnostics dumps, response files and manifest copies.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Mirrored destinations are made relative to this.
    #[serde(default)]
    pub local_root: Option<PathBuf>,
    pub project: ProjectConfig,
    #[serde(default)]
    pub platform: PlatformPolicy,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub extra_ufs_dirs: Vec<DirectorySpec>,
    #[serde(default)]
    pub extra_non_ufs_dirs: Vec<DirectorySpec>,
    #[serde(default)]
    pub localization: LocalizationConfig,
    #[serde(default)]
    pub pak: PakConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub name: String,
    /// Project directory on disk; extra directories live under `<root>/Content`.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Project directory inside the stage; defaults to `name`.
    #[serde(default)]
    pub stage_root: Option<String>,
}

impl ProjectConfig {
    pub fn stage_root(&self) -> &str {
        self.stage_root.as_deref().unwrap_or(&self.name)
    }
}

/// One typed staging rule.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub class: FileClass,
    pub source: PathBuf,
    #[serde(default = "any_file")]
    pub pattern: String,
    #[serde(default = "yes")]
    pub recursive: bool,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub dest: Option<String>,
    #[serde(default = "yes")]
    pub remap: bool,
    #[serde(default = "yes")]
    pub allow_none: bool,
}

impl RuleConfig {
    pub fn to_request(&self) -> StageRequest {
        let mut req = StageRequest::new(self.class, &self.source)
            .pattern(self.pattern.clone())
            .recursive(self.recursive)
            .exclude(self.exclude.iter().cloned())
            .allow_none(self.allow_none)
            .remap(self.remap);
        if let Some(d) = &self.dest {
            req = req.dest(d.clone());
        }
        req
    }
}

/// A directory entry, either `{ path = "Movies" }` or the legacy
/// `(Path="Movies")` string.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum DirectorySpec {
    Table { path: String },
    Legacy(String),
}

impl DirectorySpec {
    pub fn path(&self) -> Result<String> {
        match self {
            DirectorySpec::Table { path } => Ok(path.clone()),
            DirectorySpec::Legacy(s) => parse_legacy_path(s),
        }
    }
}

/// `(Path="X")` -> `X`; a bare string is taken as is.
pub fn parse_legacy_path(s: &str) -> Result<String> {
    let parts: Vec<&str> = s.split('"').collect();
    match parts.as_slice() {
        [whole] => Ok(whole.trim().to_string()),
        [_, inner, _] => Ok(inner.to_string()),
        _ => Err(StageError::config(format!("cannot parse directory entry {s:?}"))),
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct LocalizationConfig {
    #[serde(default)]
    pub cultures: Vec<String>,
    #[serde(default)]
    pub roots: Vec<LocalizationRoot>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct LocalizationRoot {
    /// Directory whose subdirectories are named after cultures.
    pub source: PathBuf,
    #[serde(default)]
    pub dest: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PakConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Defaults to the project name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_internal_root")]
    pub internal_root: String,
    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub blacklist_file: Option<PathBuf>,
    /// File listing chunk manifests, one per line.
    #[serde(default)]
    pub chunk_list: Option<PathBuf>,
    #[serde(default)]
    pub archiver: Option<ProcessArchiver>,
}

impl Default for PakConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: None,
            internal_root: default_internal_root(),
            compress: false,
            blacklist: vec![],
            blacklist_file: None,
            chunk_list: None,
            archiver: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    #[serde(default = "yes")]
    pub clean: bool,
    #[serde(default)]
    pub iterative: bool,
    /// Compute delta/obsolete lists after staging.
    #[serde(default)]
    pub reconcile: bool,
    #[serde(default)]
    pub deployed_ufs: Vec<PathBuf>,
    #[serde(default)]
    pub deployed_non_ufs: Vec<PathBuf>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            clean: true,
            iterative: false,
            reconcile: false,
            deployed_ufs: vec![],
            deployed_non_ufs: vec![],
        }
    }
}

impl StageConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).at(path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::from_toml_str(&text, base)
            .map_err(|e| StageError::config(format!("{}: {}", path.display(), config_reason(e))))
    }

    /// Parse, resolve relative paths against `base` and validate.
    pub fn from_toml_str(text: &str, base: &Path) -> Result<Self> {
        let mut cfg: StageConfig =
            toml::from_str(text).map_err(|e| StageError::config(e.to_string()))?;
        cfg.rebase(base);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn pak_name(&self) -> &str {
        self.pak.name.as_deref().unwrap_or(&self.project.name)
    }

    fn rebase(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.stage_dir);
        self.log_dir.iter_mut().for_each(fix);
        self.local_root.iter_mut().for_each(fix);
        self.project.root.iter_mut().for_each(fix);
        self.rules.iter_mut().for_each(|r| fix(&mut r.source));
        self.localization.roots.iter_mut().for_each(|r| fix(&mut r.source));
        self.pak.blacklist_file.iter_mut().for_each(fix);
        self.pak.chunk_list.iter_mut().for_each(fix);
        self.pak.archiver.iter_mut().for_each(|a| fix(&mut a.program));
        self.deploy.deployed_ufs.iter_mut().for_each(fix);
        self.deploy.deployed_non_ufs.iter_mut().for_each(fix);
    }

    fn validate(&self) -> Result<()> {
        if self.project.name.trim().is_empty() {
            return Err(StageError::config("project.name is empty"));
        }
        for r in &self.rules {
            name_matcher(&r.pattern)?;
            exclude_set(&r.exclude)?;
            if let Some(d) = &r.dest {
                validate_dest(d)?;
            }
        }
        for d in self.extra_ufs_dirs.iter().chain(&self.extra_non_ufs_dirs) {
            validate_dest(&d.path()?)?;
        }
        for c in &self.localization.cultures {
            parent_cultures(c)?;
        }
        for r in &self.localization.roots {
            if let Some(d) = &r.dest {
                validate_dest(d)?;
            }
        }
        validate_dest(self.project.stage_root())?;
        Ok(())
    }
}

fn config_reason(e: StageError) -> String {
    match e {
        StageError::Config(msg) => msg,
        other => other.to_string(),
    }
}
