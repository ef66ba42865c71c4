use crate::builder::StagingContext;
use crate::cancel::CancelToken;
use crate::error::{IoContext, Result, StageError};
use crate::manifest::Manifest;
use crate::path_safety::{normalize_key, resolve_in_stage};
use crate::persist;
use crate::stamp::{content_stamp, mtime_stamp};
use filetime::FileTime;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Clone, Debug, Default)]
pub struct ApplyOptions {
    /// Extra copy of every written manifest goes here.
    pub log_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub copied: usize,
    pub up_to_date: usize,
    /// `Manifest_<name>.txt`, when anything was staged.
    pub manifest: Option<PathBuf>,
}

/// Full clean removes the stage directory; otherwise only stale paks go.
pub fn prepare_stage_dir(stage_dir: &Path, full_clean: bool) -> Result<()> {
    if full_clean {
        info!("cleaning stage directory {}", stage_dir.display());
        if stage_dir.exists() {
            std::fs::remove_dir_all(stage_dir).at(stage_dir)?;
        }
    } else if stage_dir.exists() {
        for ent in WalkDir::new(stage_dir) {
            let ent = ent.map_err(|e| StageError::io(stage_dir, e.into()))?;
            let is_pak = ent
                .path()
                .extension()
                .map(|e| e.eq_ignore_ascii_case("pak"))
                .unwrap_or(false);
            if ent.file_type().is_file() && is_pak {
                debug!("removing old pak {}", ent.path().display());
                std::fs::remove_file(ent.path()).at(ent.path())?;
            }
        }
    }
    std::fs::create_dir_all(stage_dir).at(stage_dir)
}

/// Copy unless the destination already has the same size and mtime. The
/// source mtime is carried over so later timestamp stamps agree.
pub fn copy_incremental(src: &Path, dst: &Path) -> Result<bool> {
    let src_meta = std::fs::metadata(src).at(src)?;
    let src_time = FileTime::from_last_modification_time(&src_meta);
    if let Ok(dst_meta) = std::fs::metadata(dst) {
        if dst_meta.len() == src_meta.len()
            && FileTime::from_last_modification_time(&dst_meta) == src_time
        {
            return Ok(false);
        }
    }
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).at(parent)?;
    }
    std::fs::copy(src, dst).at(dst)?;
    filetime::set_file_mtime(dst, src_time).at(dst)?;
    Ok(true)
}

/// Copy `manifest` into the stage directory and write `Manifest_<name>.txt`
/// (`<dest>\t<stamp>` lines). CRC-significant files are stamped with the MD5
/// of the staged copy, everything else with the source mtime.
pub fn apply_manifest(
    ctx: &StagingContext,
    manifest: &Manifest,
    name: &str,
    opts: &ApplyOptions,
    cancel: &CancelToken,
) -> Result<ApplyStats> {
    cancel.check()?;
    info!("copying {} to staging directory: {}", name, ctx.stage_dir.display());
    let manifest_file = format!("Manifest_{name}.txt");
    let manifest_path = ctx.stage_dir.join(&manifest_file);
    // Last run's manifest never survives, even when nothing is staged now.
    match std::fs::remove_file(&manifest_path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            return Err(StageError::io(&manifest_path, e))
        }
        _ => {}
    }

    let mut seen: HashMap<String, &str> = HashMap::new();
    let mut targets: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(manifest.len());
    for e in manifest.iter() {
        // One writer per destination, or the parallel copy below races.
        if let Some(first) = seen.insert(normalize_key(&e.dest), e.source.as_str()) {
            return Err(StageError::config(format!(
                "{} and {} are both staged to {}",
                first, e.source, e.dest
            )));
        }
        let dst = resolve_in_stage(&ctx.stage_dir, &e.dest)?;
        targets.push((PathBuf::from(&e.source), dst));
    }

    let copied: Vec<bool> = targets
        .par_iter()
        .map(|(src, dst)| {
            // Files produced inside the stage (paks) are already in place.
            if src == dst {
                return Ok(false);
            }
            copy_incremental(src, dst)
        })
        .collect::<Result<_>>()?;
    let n_copied = copied.iter().filter(|c| **c).count();

    let mut stats =
        ApplyStats { copied: n_copied, up_to_date: copied.len() - n_copied, manifest: None };
    if manifest.is_empty() {
        return Ok(stats);
    }

    let lines: Vec<String> = manifest
        .entries()
        .par_iter()
        .zip(targets.par_iter())
        .map(|(e, (src, dst))| {
            let stamp = if ctx.policy.is_crc_significant(&e.dest) {
                content_stamp(dst)?
            } else {
                mtime_stamp(src)?
            };
            Ok(format!("{}\t{}", e.dest, stamp))
        })
        .collect::<Result<_>>()?;
    persist::write_lines(&manifest_path, &lines)?;

    if let Some(log_dir) = &opts.log_dir {
        std::fs::create_dir_all(log_dir).at(log_dir)?;
        let copy = log_dir.join(&manifest_file);
        std::fs::copy(&manifest_path, &copy).at(&copy)?;
    }
    debug!("{}: {} copied, {} up to date", name, stats.copied, stats.up_to_date);
    stats.manifest = Some(manifest_path);
    Ok(stats)
}
