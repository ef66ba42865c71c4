use crate::builder::StagingContext;
use crate::cancel::CancelToken;
use crate::error::{IoContext, Result, StageError};
use crate::manifest::Manifest;
use crate::pak::write_response_file;
use crate::path_safety::join_rel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// External pak builder.
pub trait ArchiveBuilder {
    fn name(&self) -> &str;
    /// Build `output` from the response file; returns the tool's exit code.
    fn build(&self, response_file: &Path, output: &Path) -> Result<i32>;
}

/// Runs a pak tool as `<program> <output> -create=<response> [args...]`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProcessArchiver {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ArchiveBuilder for ProcessArchiver {
    fn name(&self) -> &str {
        self.program.file_name().and_then(|s| s.to_str()).unwrap_or("archiver")
    }

    fn build(&self, response_file: &Path, output: &Path) -> Result<i32> {
        if !self.program.is_file() {
            return Err(StageError::config(format!(
                "archiver not found: {}",
                self.program.display()
            )));
        }
        let status = Command::new(&self.program)
            .arg(output)
            .arg(format!("-create={}", response_file.display()))
            .args(&self.args)
            .status()
            .at(&self.program)?;
        // Killed by a signal: no code, still a failure.
        Ok(status.code().unwrap_or(-1))
    }
}

/// Where and how one pak gets built.
#[derive(Clone, Debug)]
pub struct PakJob<'a> {
    pub name: &'a str,
    pub files: &'a Manifest,
    /// Project directory inside the stage, e.g. `Game`.
    pub stage_root: &'a str,
    pub compress: bool,
    /// Directory for `PakList_<name>.txt`; the stage directory when `None`.
    pub log_dir: Option<&'a Path>,
}

/// Stage-relative location of a pak: `<stage_root>/Content/Paks/<name>-<platform>.pak`.
pub fn pak_dest(ctx: &StagingContext, stage_root: &str, name: &str) -> String {
    let file = format!("{}-{}.pak", name, ctx.policy.name);
    let rel = join_rel(&[stage_root, "Content/Paks", file.as_str()]);
    ctx.policy.remap(&rel, ctx.policy.lowercase_loose)
}

/// Build one pak and record it as a staged archive. An empty response skips
/// the pak entirely.
pub fn create_pak(
    ctx: StagingContext,
    job: &PakJob<'_>,
    archiver: &dyn ArchiveBuilder,
    cancel: &CancelToken,
) -> Result<StagingContext> {
    if job.files.is_empty() {
        info!("no files for pak {}, skipping", job.name);
        return Ok(ctx);
    }
    cancel.check()?;
    let list_dir = job.log_dir.unwrap_or(&ctx.stage_dir);
    let response = list_dir.join(format!("PakList_{}.txt", job.name));
    write_response_file(&response, job.files, job.compress)?;

    let dest = pak_dest(&ctx, job.stage_root, job.name);
    let output = ctx.stage_dir.join(&dest);
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).at(parent)?;
    }
    info!("running {} for {} ({} files)", archiver.name(), dest, job.files.len());
    let code = archiver.build(&response, &output)?;
    if code != 0 {
        return Err(StageError::ExternalTool { tool: archiver.name().to_string(), code });
    }
    info!("{} done", archiver.name());
    ctx.add_archive(&output, dest)
}
