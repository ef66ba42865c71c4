use stagehand_core::archiver::ArchiveBuilder;
use stagehand_core::cancel::CancelToken;
use stagehand_core::config::StageConfig;
use stagehand_core::manifest::FileClass;
use stagehand_core::pipeline::{plan, run};
use stagehand_core::source::FsSource;
use stagehand_core::stamp::content_stamp;
use stagehand_core::{Result, StageError};
use std::fs;
use std::path::Path;

struct FakePak(i32);

impl ArchiveBuilder for FakePak {
    fn name(&self) -> &str {
        "fakepak"
    }
    fn build(&self, response_file: &Path, output: &Path) -> Result<i32> {
        if self.0 == 0 {
            fs::copy(response_file, output).map_err(|e| StageError::io(output, e))?;
        }
        Ok(self.0)
    }
}

fn project(root: &Path) {
    for (rel, body) in [
        ("proj/Binaries/Linux/Game", "elf"),
        ("proj/Content/a.uasset", "a"),
        ("proj/Content/Maps/b.umap", "b"),
        ("proj/Content/junk.tmp", "junk"),
        ("proj/Content/Movies/intro.mp4", "mp4"),
    ] {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, body).unwrap();
    }
}

fn config(root: &Path, pak: &str, extra: &str) -> StageConfig {
    let text = format!(
        r#"
stage_dir = "stage"
log_dir = "logs"
extra_ufs_dirs = ["(Path=\"Movies\")"]

[project]
name = "Game"
root = "proj"

[platform]
name = "Linux"
crc_files = ["Game/Binaries/Linux/Game"]
pak = "{pak}"

[[rules]]
class = "non-ufs"
source = "proj/Binaries/Linux"
dest = "Game/Binaries/Linux"

[[rules]]
class = "ufs"
source = "proj/Content"
dest = "Game/Content"
exclude = ["*.tmp", "Movies/*"]
{extra}
"#
    );
    StageConfig::from_toml_str(&text, root).unwrap()
}

const DEPLOY: &str = r#"
[deploy]
iterative = true
reconcile = true
"#;

#[test]
fn loose_run_copies_and_records() {
    let td = tempfile::tempdir().unwrap();
    project(td.path());
    let cfg = config(td.path(), "never", DEPLOY);
    let stage = td.path().join("stage");

    let report = run(&cfg, &FsSource, None, &CancelToken::new()).unwrap();
    assert_eq!(report.non_ufs_files, 1);
    assert_eq!(report.ufs_files, 3);
    assert_eq!(report.copied, 4);
    assert!(report.paks.is_empty());
    assert!(stage.join("Game/Content/Movies/intro.mp4").is_file());
    assert!(!stage.join("Game/Content/junk.tmp").exists());

    let non_ufs = fs::read_to_string(stage.join(FileClass::NonUfs.deployed_manifest())).unwrap();
    let hash = content_stamp(&td.path().join("proj/Binaries/Linux/Game")).unwrap();
    assert_eq!(non_ufs, format!("Game/Binaries/Linux/Game\t{hash}\n"));
    assert_eq!(
        fs::read_to_string(stage.join(FileClass::Ufs.deployed_manifest())).unwrap().lines().count(),
        3
    );

    let logs = td.path().join("logs");
    for f in ["PrePak_UFSFiles.txt", "FinalCopy_NonUFSFiles.txt", "Manifest_UFSFiles.txt"] {
        assert!(logs.join(f).is_file(), "{f}");
    }

    // Nothing deployed yet: everything is in the delta.
    let ufs = &report.reconciled[0];
    assert_eq!((ufs.class, ufs.delta, ufs.obsolete), (FileClass::Ufs, 5, 0));

    let again = run(&cfg, &FsSource, None, &CancelToken::new()).unwrap();
    assert_eq!(again.copied, 0);
    assert_eq!(again.up_to_date, 4);

    let json = serde_json::to_value(&again).unwrap();
    assert_eq!(json["reconciled"][1]["class"], "non-ufs");
    assert_eq!(json["reconciled"][1]["delta"], 1);
}

#[test]
fn packed_run_stages_the_pak_only() {
    let td = tempfile::tempdir().unwrap();
    project(td.path());
    let cfg = config(td.path(), "always", "");
    let stage = td.path().join("stage");

    let report = run(&cfg, &FsSource, Some(&FakePak(0)), &CancelToken::new()).unwrap();
    assert!(report.used_pak);
    assert_eq!(report.paks, vec!["Game/Content/Paks/Game-Linux.pak"]);
    assert!(stage.join("Game/Content/Paks/Game-Linux.pak").is_file());
    assert!(!stage.join("Game/Content/a.uasset").exists());
    assert!(stage.join("Game/Binaries/Linux/Game").is_file());

    let listing = fs::read_to_string(td.path().join("logs/PakList_Game.txt")).unwrap();
    assert_eq!(listing.lines().count(), 3);
    assert!(listing.contains("\"../../../Game/Content/a.uasset\""));

    let ufs = fs::read_to_string(stage.join(FileClass::Ufs.deployed_manifest())).unwrap();
    assert!(ufs.starts_with("Game/Content/Paks/Game-Linux.pak\t"));
    assert_eq!(ufs.lines().count(), 1);
}

#[test]
fn archiver_failure_and_missing_archiver() {
    let td = tempfile::tempdir().unwrap();
    project(td.path());
    let cfg = config(td.path(), "always", "");
    let err = run(&cfg, &FsSource, Some(&FakePak(1)), &CancelToken::new()).unwrap_err();
    assert!(matches!(err, StageError::ExternalTool { code: 1, .. }));
    let err = run(&cfg, &FsSource, None, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, StageError::Config(_)));
}

#[test]
fn cancelled_before_any_stage() {
    let td = tempfile::tempdir().unwrap();
    project(td.path());
    let cfg = config(td.path(), "never", "");
    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(matches!(run(&cfg, &FsSource, None, &cancel), Err(StageError::Cancelled)));
    assert!(!td.path().join("stage").exists());
}

#[test]
fn plan_writes_nothing() {
    let td = tempfile::tempdir().unwrap();
    project(td.path());
    let cfg = config(td.path(), "optional", "");
    let ctx = plan(&cfg, &FsSource, &CancelToken::new()).unwrap();
    assert_eq!(ctx.ufs.len(), 3);
    assert!(!td.path().join("stage").exists());
    assert!(!td.path().join("logs").exists());
}

#[test]
fn iterative_rerun_without_ufs_rule_drops_old_manifest() {
    let td = tempfile::tempdir().unwrap();
    project(td.path());
    let stage = td.path().join("stage");
    let first = run(&config(td.path(), "never", DEPLOY), &FsSource, None, &CancelToken::new()).unwrap();
    assert_eq!(first.ufs_files, 3);

    // What the device now holds.
    fs::copy(stage.join(FileClass::Ufs.deployed_manifest()), td.path().join("device_ufs.txt")).unwrap();

    let text = r#"
stage_dir = "stage"

[project]
name = "Game"
root = "proj"

[platform]
name = "Linux"
pak = "never"

[[rules]]
class = "non-ufs"
source = "proj/Binaries/Linux"
dest = "Game/Binaries/Linux"

[deploy]
iterative = true
reconcile = true
deployed_ufs = ["device_ufs.txt"]
"#;
    let cfg = StageConfig::from_toml_str(text, td.path()).unwrap();
    let second = run(&cfg, &FsSource, None, &CancelToken::new()).unwrap();
    assert_eq!(second.ufs_files, 0);
    assert!(!stage.join(FileClass::Ufs.deployed_manifest()).exists());

    // Only the bookkeeping manifests go out; every deployed UFS file is obsolete.
    let ufs = &second.reconciled[0];
    assert_eq!((ufs.class, ufs.delta, ufs.obsolete, ufs.full_sync), (FileClass::Ufs, 2, 3, false));
    let removed = fs::read_to_string(stage.join(FileClass::Ufs.obsolete_manifest())).unwrap();
    assert!(removed.contains("Game/Content/a.uasset"));
}
