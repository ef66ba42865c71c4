//! One staging run: plan -> paks -> copy -> reconcile.

use crate::apply::{apply_manifest, prepare_stage_dir, ApplyOptions};
use crate::archiver::{create_pak, pak_dest, ArchiveBuilder, PakJob};
use crate::builder::{StageRequest, StagingContext};
use crate::cancel::CancelToken;
use crate::config::StageConfig;
use crate::culture::stage_culture;
use crate::error::{Result, StageError};
use crate::lock::StageLock;
use crate::manifest::{FileClass, Manifest};
use crate::pak::{build_response, partition, Blacklist, ChunkSet, PakResponse};
use crate::path_safety::join_rel;
use crate::persist;
use crate::reconcile::reconcile_class;
use crate::source::SourceProvider;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ClassReconcile {
    pub class: FileClass,
    pub delta: usize,
    pub obsolete: usize,
    pub full_sync: bool,
}

/// What a run did, for humans and `--json`.
#[derive(Serialize, Clone, Debug, Default)]
pub struct StageReport {
    pub stage_dir: PathBuf,
    pub non_ufs_files: usize,
    pub ufs_files: usize,
    pub used_pak: bool,
    /// Stage-relative pak paths.
    pub paks: Vec<String>,
    pub copied: usize,
    pub up_to_date: usize,
    pub reconciled: Vec<ClassReconcile>,
}

/// Build both manifests from the configuration, casing applied. Nothing is
/// written.
pub fn plan(cfg: &StageConfig, src: &dyn SourceProvider, cancel: &CancelToken) -> Result<StagingContext> {
    let use_pak = cfg.platform.use_pak(cfg.pak.enabled);
    let mut ctx = StagingContext::new(&cfg.stage_dir, cfg.platform.clone());
    if let Some(root) = &cfg.local_root {
        ctx = ctx.with_local_root(root);
    }

    for rule in &cfg.rules {
        cancel.check()?;
        let mut req = rule.to_request();
        // Pak-internal casing is decided later for the whole UFS manifest.
        if rule.class == FileClass::Ufs && use_pak {
            req = req.remap(false);
        }
        ctx = ctx.stage_files(src, &req)?.0;
    }

    let extra = [
        (FileClass::Ufs, &cfg.extra_ufs_dirs),
        (FileClass::NonUfs, &cfg.extra_non_ufs_dirs),
    ];
    for (class, dirs) in extra {
        if dirs.is_empty() {
            continue;
        }
        let Some(project_root) = &cfg.project.root else {
            return Err(StageError::config("extra directories need project.root"));
        };
        for d in dirs {
            cancel.check()?;
            let rel = d.path()?;
            let req = StageRequest::new(class, project_root.join("Content").join(&rel))
                .dest(join_rel(&[cfg.project.stage_root(), "Content", rel.as_str()]))
                .remap(class == FileClass::NonUfs || !use_pak);
            ctx = ctx.stage_files(src, &req)?.0;
        }
    }

    for root in &cfg.localization.roots {
        for culture in &cfg.localization.cultures {
            cancel.check()?;
            ctx = stage_culture(ctx, src, culture, &root.source, root.dest.as_deref(), !use_pak)?.0;
        }
    }

    let ctx = ctx.with_platform_casing(use_pak);
    info!(
        "planned {} NonUFS and {} UFS file(s) for {}",
        ctx.non_ufs.len(),
        ctx.ufs.len(),
        cfg.stage_dir.display()
    );
    Ok(ctx)
}

fn dump_both(log_dir: Option<&Path>, prefix: &str, non_ufs: &Manifest, ufs: &Manifest) -> Result<()> {
    let Some(dir) = log_dir else {
        return Ok(());
    };
    non_ufs.dump(&dir.join(format!("{prefix}_{}.txt", FileClass::NonUfs.label())))?;
    ufs.dump(&dir.join(format!("{prefix}_{}.txt", FileClass::Ufs.label())))
}

/// Chunk manifests named in `list`, one per line, relative to the list file.
pub fn load_chunks(list: &Path) -> Result<Vec<ChunkSet>> {
    let base = list.parent().unwrap_or(Path::new("."));
    persist::read_lines(list)?
        .iter()
        .map(|line| ChunkSet::load(&base.join(line)))
        .collect()
}

fn pak_jobs(cfg: &StageConfig, ctx: &StagingContext) -> Result<Vec<PakResponse>> {
    let mut blacklist = Blacklist::new(cfg.pak.blacklist.iter().cloned());
    if let Some(f) = &cfg.pak.blacklist_file {
        if f.is_file() {
            blacklist.extend(Blacklist::load(f)?);
        } else {
            debug!("no pak blacklist at {}", f.display());
        }
    }
    let response = build_response(&ctx.ufs, &cfg.pak.internal_root, &blacklist)?;
    match &cfg.pak.chunk_list {
        Some(list) if list.is_file() => {
            info!("creating paks from chunk list {}", list.display());
            partition(&response, &load_chunks(list)?)
        }
        _ => Ok(vec![PakResponse { name: cfg.pak_name().to_string(), files: response }]),
    }
}

/// The whole run. `archiver` overrides `[pak].archiver` when given.
pub fn run(
    cfg: &StageConfig,
    src: &dyn SourceProvider,
    archiver: Option<&dyn ArchiveBuilder>,
    cancel: &CancelToken,
) -> Result<StageReport> {
    let _lock = StageLock::acquire(&cfg.stage_dir)?;
    let use_pak = cfg.platform.use_pak(cfg.pak.enabled);
    let mut ctx = plan(cfg, src, cancel)?;
    let log_dir = cfg.log_dir.as_deref();
    dump_both(log_dir, "PrePak", &ctx.non_ufs, &ctx.ufs)?;

    prepare_stage_dir(&cfg.stage_dir, cfg.deploy.clean && !cfg.deploy.iterative)?;

    let mut report = StageReport {
        stage_dir: cfg.stage_dir.clone(),
        non_ufs_files: ctx.non_ufs.len(),
        ufs_files: ctx.ufs.len(),
        used_pak: use_pak,
        ..Default::default()
    };

    if use_pak {
        let configured = cfg.pak.archiver.as_ref().map(|a| a as &dyn ArchiveBuilder);
        let archiver = archiver
            .or(configured)
            .ok_or_else(|| StageError::config("packing requested but no [pak].archiver configured"))?;
        for job in pak_jobs(cfg, &ctx)? {
            cancel.check()?;
            let before = ctx.archives.len();
            let pak = PakJob {
                name: &job.name,
                files: &job.files,
                stage_root: cfg.project.stage_root(),
                compress: cfg.pak.compress,
                log_dir,
            };
            ctx = create_pak(ctx, &pak, archiver, cancel)?;
            if ctx.archives.len() > before {
                report.paks.push(pak_dest(&ctx, cfg.project.stage_root(), &job.name));
            }
        }
    }

    let opts = ApplyOptions { log_dir: cfg.log_dir.clone() };
    let ufs_final = if use_pak { &ctx.archives } else { &ctx.ufs };
    for (class, manifest) in [(FileClass::NonUfs, &ctx.non_ufs), (FileClass::Ufs, ufs_final)] {
        cancel.check()?;
        let stats = apply_manifest(&ctx, manifest, class.label(), &opts, cancel)?;
        report.copied += stats.copied;
        report.up_to_date += stats.up_to_date;
    }
    dump_both(log_dir, "FinalCopy", &ctx.non_ufs, ufs_final)?;

    if cfg.deploy.reconcile {
        let deployed = [
            (FileClass::Ufs, &cfg.deploy.deployed_ufs),
            (FileClass::NonUfs, &cfg.deploy.deployed_non_ufs),
        ];
        for (class, sources) in deployed {
            cancel.check()?;
            let r = reconcile_class(&cfg.stage_dir, class, sources, &ctx.policy, cfg.deploy.iterative)?;
            report.reconciled.push(ClassReconcile {
                class,
                delta: r.delta.len(),
                obsolete: r.obsolete.len(),
                full_sync: r.full_sync,
            });
        }
    }

    info!("staging complete: {} copied, {} up to date", report.copied, report.up_to_date);
    Ok(report)
}
