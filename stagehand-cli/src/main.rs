use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use stagehand_core::cancel::CancelToken;
use stagehand_core::config::StageConfig;
use stagehand_core::culture::parent_cultures;
use stagehand_core::manifest::FileClass;
use stagehand_core::pipeline::{self, StageReport};
use stagehand_core::policy::PlatformPolicy;
use stagehand_core::reconcile::reconcile_class;
use stagehand_core::source::FsSource;
use stagehand_core::stamp::{content_stamp, mtime_stamp};
use stagehand_core::StageError;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ClassArg { Ufs, NonUfs }

impl From<ClassArg> for FileClass {
    fn from(c: ClassArg) -> Self {
        match c { ClassArg::Ufs => FileClass::Ufs, ClassArg::NonUfs => FileClass::NonUfs }
    }
}

#[derive(Parser)]
#[command(name="stagehand", version, about="Stage build output and compute deployment deltas")]
struct Cli {
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global=true, action=ArgAction::Count)]
    verbose: u8,
    /// Warnings and errors only
    #[arg(short, long, global=true)]
    quiet: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the full staging pipeline
    Stage {
        #[arg(long)] config: PathBuf,
        /// Print the run report as JSON
        #[arg(long, default_value_t=false)] json: bool,
    },
    /// Build the manifests and print them without copying anything
    Plan { #[arg(long)] config: PathBuf },
    /// Compare deployed manifests with the staged one
    Reconcile {
        #[arg(long)] stage_dir: PathBuf,
        #[arg(long, value_enum)] class: ClassArg,
        #[arg(long)] deployed: Vec<PathBuf>,
        /// Destination paths compared by content hash
        #[arg(long)] crc: Vec<String>,
        #[arg(long, default_value_t=false)] write_delta: bool,
    },
    /// Print the cultures searched for a tag, most specific first
    Cultures { tag: String },
    /// Print the staleness stamp of a file
    Stamp { file: PathBuf, #[arg(long, default_value_t=false)] crc: bool },
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = if verbose > 0 || quiet {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let res = match cli.cmd {
        Cmd::Stage { config, json } => stage(&config, json),
        Cmd::Plan { config } => plan(&config),
        Cmd::Reconcile { stage_dir, class, deployed, crc, write_delta } => {
            reconcile(&stage_dir, class.into(), &deployed, crc, write_delta)
        }
        Cmd::Cultures { tag } => cultures(&tag),
        Cmd::Stamp { file, crc } => stamp(&file, crc),
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code(&e)
        }
    }
}

/// 2 when re-running may help, 1 otherwise.
fn exit_code(e: &anyhow::Error) -> ExitCode {
    let retryable = e
        .chain()
        .find_map(|c| c.downcast_ref::<StageError>())
        .map(StageError::is_retryable)
        .unwrap_or(false);
    if retryable { ExitCode::from(2) } else { ExitCode::from(1) }
}

fn load(config: &Path) -> Result<StageConfig> {
    let cfg = StageConfig::load(config).with_context(|| format!("loading {}", config.display()))?;
    tracing::debug!("{} rule(s), platform {:?}", cfg.rules.len(), cfg.platform.name);
    Ok(cfg)
}

fn stage(config: &Path, json: bool) -> Result<()> {
    let cfg = load(config)?;
    let report = pipeline::run(&cfg, &FsSource, None, &CancelToken::new())
        .with_context(|| format!("staging into {}", cfg.stage_dir.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(r: &StageReport) {
    println!("stage: {}", r.stage_dir.display());
    println!("files: {} NonUFS, {} UFS", r.non_ufs_files, r.ufs_files);
    for p in &r.paks { println!("pak: {p}"); }
    println!("copied: {} (up to date: {})", r.copied, r.up_to_date);
    for c in &r.reconciled {
        println!("{}: delta {}, obsolete {}{}", c.class.label(), c.delta, c.obsolete,
            if c.full_sync { " (full sync)" } else { "" });
    }
}

fn plan(config: &Path) -> Result<()> {
    let cfg = load(config)?;
    let ctx = pipeline::plan(&cfg, &FsSource, &CancelToken::new())?;
    print!("{}", ctx.non_ufs.render_dump());
    print!("{}", ctx.ufs.render_dump());
    Ok(())
}

fn reconcile(stage_dir: &Path, class: FileClass, deployed: &[PathBuf], crc: Vec<String>, write_delta: bool) -> Result<()> {
    let policy = PlatformPolicy { crc_files: crc.into_iter().collect(), ..Default::default() };
    let r = reconcile_class(stage_dir, class, deployed, &policy, write_delta)
        .with_context(|| format!("reconciling {} in {}", class.label(), stage_dir.display()))?;
    println!("delta: {}", r.delta.len());
    println!("obsolete: {}", r.obsolete.len());
    if r.full_sync { println!("full sync"); }
    Ok(())
}

fn cultures(tag: &str) -> Result<()> {
    for c in parent_cultures(tag)? { println!("{c}"); }
    Ok(())
}

fn stamp(file: &Path, crc: bool) -> Result<()> {
    let s = if crc { content_stamp(file)? } else { mtime_stamp(file)? };
    println!("{s}");
    Ok(())
}
