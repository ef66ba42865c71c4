//! Builds the NonUFS / UFS staging manifests.
//!
//! A [`StagingContext`] is a value: each staging step takes it by value and
//! hands back the updated context, so no step can observe another's
//! half-finished state.

use crate::error::{Result, StageError};
use crate::manifest::{FileClass, Manifest};
use crate::path_safety::{join_rel, to_slash};
use crate::policy::PlatformPolicy;
use crate::source::{exclude_set, SourceProvider};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// One `StageFiles` call.
#[derive(Clone, Debug)]
pub struct StageRequest {
    pub class: FileClass,
    pub source_root: PathBuf,
    /// File-name wildcard.
    pub pattern: String,
    pub recursive: bool,
    /// Relative-path wildcards removed before inclusion.
    pub exclude: Vec<String>,
    /// Destination directory; `None` mirrors the source layout.
    pub dest_subdir: Option<String>,
    /// When false, an existing root that yields no files is a configuration error.
    pub allow_none: bool,
    /// Pass destinations through the platform remap.
    pub remap: bool,
}

impl StageRequest {
    pub fn new(class: FileClass, source_root: impl Into<PathBuf>) -> Self {
        Self {
            class,
            source_root: source_root.into(),
            pattern: "*".to_string(),
            recursive: true,
            exclude: vec![],
            dest_subdir: None,
            allow_none: true,
            remap: true,
        }
    }
    pub fn pattern(mut self, p: impl Into<String>) -> Self {
        self.pattern = p.into();
        self
    }
    pub fn recursive(mut self, r: bool) -> Self {
        self.recursive = r;
        self
    }
    pub fn exclude<S: Into<String>>(mut self, ex: impl IntoIterator<Item = S>) -> Self {
        self.exclude = ex.into_iter().map(Into::into).collect();
        self
    }
    pub fn dest(mut self, d: impl Into<String>) -> Self {
        self.dest_subdir = Some(d.into());
        self
    }
    pub fn allow_none(mut self, a: bool) -> Self {
        self.allow_none = a;
        self
    }
    pub fn remap(mut self, r: bool) -> Self {
        self.remap = r;
        self
    }
}

#[derive(Clone, Debug)]
pub struct StagingContext {
    pub stage_dir: PathBuf,
    /// Root that mirrored destinations are made relative to.
    pub local_root: Option<PathBuf>,
    pub policy: PlatformPolicy,
    pub non_ufs: Manifest,
    pub ufs: Manifest,
    /// Paks produced in the stage directory during this run.
    pub archives: Manifest,
}

impl StagingContext {
    pub fn new(stage_dir: impl Into<PathBuf>, policy: PlatformPolicy) -> Self {
        Self {
            stage_dir: stage_dir.into(),
            local_root: None,
            policy,
            non_ufs: Manifest::new(FileClass::NonUfs),
            ufs: Manifest::new(FileClass::Ufs),
            archives: Manifest::new(FileClass::Ufs),
        }
    }

    pub fn with_local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = Some(root.into());
        self
    }

    pub fn manifest(&self, class: FileClass) -> &Manifest {
        match class {
            FileClass::Ufs => &self.ufs,
            FileClass::NonUfs => &self.non_ufs,
        }
    }

    fn manifest_mut(&mut self, class: FileClass) -> &mut Manifest {
        match class {
            FileClass::Ufs => &mut self.ufs,
            FileClass::NonUfs => &mut self.non_ufs,
        }
    }

    /// Stage every matching file under `req.source_root`. Returns the updated
    /// context and the number of entries added. A missing root adds nothing.
    pub fn stage_files(
        mut self,
        src: &dyn SourceProvider,
        req: &StageRequest,
    ) -> Result<(Self, usize)> {
        if !src.exists(&req.source_root) {
            debug!("skipping missing {}", req.source_root.display());
            return Ok((self, 0));
        }
        let excludes = exclude_set(&req.exclude)?;
        let dest_base = match &req.dest_subdir {
            Some(d) => to_slash(d),
            None => self.mirrored_base(&req.source_root),
        };
        let mut added = 0usize;
        for rel in src.enumerate(&req.source_root, &req.pattern, req.recursive)? {
            if excludes.is_match(&rel) {
                continue;
            }
            let mut dest = join_rel(&[dest_base.as_str(), rel.as_str()]);
            if req.remap {
                dest = self.policy.remap(&dest, self.policy.lowercase_loose);
            }
            let source = req.source_root.join(&rel).to_string_lossy().to_string();
            if self.manifest_mut(req.class).insert(source, dest)? {
                added += 1;
            }
        }
        if added == 0 && !req.allow_none {
            return Err(StageError::config(format!(
                "no files found to stage in {} with wildcard {} and exclusions {:?}",
                req.source_root.display(),
                req.pattern,
                req.exclude
            )));
        }
        debug!("staged {} {} file(s) from {}", added, req.class.label(), req.source_root.display());
        Ok((self, added))
    }

    /// Record a file produced in the stage directory (a pak) as a staged artifact.
    pub fn add_archive(mut self, source: &Path, dest: impl Into<String>) -> Result<Self> {
        self.archives.insert(source.to_string_lossy().to_string(), dest)?;
        Ok(self)
    }

    /// Apply the platform's casing rules to every destination.
    pub fn with_platform_casing(mut self, use_pak: bool) -> Self {
        let p = &self.policy;
        let lower_ufs =
            (use_pak && p.lowercase_pak_internal) || (!use_pak && p.lowercase_loose);
        if p.lowercase_loose {
            self.non_ufs = self.non_ufs.map_dests(str::to_lowercase);
        }
        if lower_ufs {
            self.ufs = self.ufs.map_dests(str::to_lowercase);
        }
        self
    }

    /// Source root relative to `local_root`, or empty when it lies elsewhere.
    fn mirrored_base(&self, source_root: &Path) -> String {
        let Some(local) = &self.local_root else {
            return String::new();
        };
        match pathdiff::diff_paths(source_root, local) {
            Some(rel) if !rel.components().any(|c| matches!(c, Component::ParentDir)) => {
                to_slash(&rel.to_string_lossy())
            }
            _ => String::new(),
        }
    }
}
