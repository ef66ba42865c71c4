use stagehand_core::manifest::{
    FileClass, NON_UFS_DEPLOYED_MANIFEST, UFS_DELTA_MANIFEST, UFS_DEPLOYED_MANIFEST,
    UFS_OBSOLETE_MANIFEST,
};
use stagehand_core::policy::PlatformPolicy;
use stagehand_core::reconcile::{reconcile_class, ReconcileState, Reconciler};
use stagehand_core::StageError;
use std::fs;
use std::path::{Path, PathBuf};

const T1: &str = "2020-01-01T00:00:00.000Z";
const T2: &str = "2021-06-01T12:30:00.250Z";

fn policy() -> PlatformPolicy {
    PlatformPolicy {
        crc_files: ["Game/Binaries/game.so".to_string()].into_iter().collect(),
        ..Default::default()
    }
}

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let p = dir.join(name);
    fs::create_dir_all(dir).unwrap();
    fs::write(&p, text).unwrap();
    p
}

fn staged(stage: &Path, class: FileClass, text: &str) {
    write(stage, class.deployed_manifest(), text);
}

fn read_list(p: &Path) -> Vec<String> {
    fs::read_to_string(p).unwrap().lines().map(str::to_string).collect()
}

#[test]
fn reconciling_against_itself_deploys_only_bookkeeping() {
    let td = tempfile::tempdir().unwrap();
    let stage = td.path().join("stage");
    let text = format!("Game/a.txt\t{T1}\nGame/Binaries/game.so\tABCD\n");
    staged(&stage, FileClass::Ufs, &text);
    let dev = write(&td.path().join("device"), "Manifest_UFSFiles_1.txt", &text);

    let r = reconcile_class(&stage, FileClass::Ufs, &[dev.clone()], &policy(), true).unwrap();
    assert_eq!(r.delta, vec![NON_UFS_DEPLOYED_MANIFEST, UFS_DEPLOYED_MANIFEST]);
    assert!(r.obsolete.is_empty());
    assert!(!r.full_sync);
    assert!(!dev.exists(), "deployed manifests are consumed");
    assert_eq!(read_list(&stage.join(UFS_DELTA_MANIFEST)), r.delta);
    assert!(read_list(&stage.join(UFS_OBSOLETE_MANIFEST)).is_empty());
}

#[test]
fn obsolete_is_deployed_minus_staged() {
    let td = tempfile::tempdir().unwrap();
    let stage = td.path().join("stage");
    staged(&stage, FileClass::NonUfs, &format!("Game/keep.bin\t{T1}\n"));
    let dev = write(td.path(), "dev.txt", &format!("Game/keep.bin\t{T1}\nGame/old.bin\t{T1}\n"));

    let r = reconcile_class(&stage, FileClass::NonUfs, &[dev], &policy(), false).unwrap();
    assert_eq!(r.obsolete, vec!["Game/old.bin"]);
    assert!(r.delta.is_empty());
    assert!(!stage.join(FileClass::NonUfs.delta_manifest()).exists());
    assert_eq!(read_list(&stage.join(FileClass::NonUfs.obsolete_manifest())), vec!["Game/old.bin"]);
}

#[test]
fn empty_source_forces_full_sync() {
    let td = tempfile::tempdir().unwrap();
    let stage = td.path().join("stage");
    staged(&stage, FileClass::NonUfs, &format!("a\t{T1}\nb\t{T1}\n"));
    let d1 = write(td.path(), "d1.txt", &format!("a\t{T1}\nstale\t{T1}\n"));
    let d2 = write(td.path(), "d2.txt", "\n");
    let d3 = write(td.path(), "d3.txt", &format!("b\t{T2}\n"));

    let r = reconcile_class(&stage, FileClass::NonUfs, &[d1.clone(), d2.clone(), d3.clone()], &policy(), true)
        .unwrap();
    assert!(r.full_sync);
    assert_eq!(r.delta, vec!["a", "b"]);
    assert!(r.obsolete.is_empty());
    assert!(!d1.exists() && !d2.exists() && !d3.exists());
}

#[test]
fn hash_and_timestamp_paths_compare_independently() {
    let td = tempfile::tempdir().unwrap();
    let stage = td.path().join("stage");
    staged(
        &stage,
        FileClass::Ufs,
        &format!(
            "Game/Binaries/game.so\tBBBB\nGame/older.txt\t{T1}\nGame/same.txt\t{T1}\nGame/newer.txt\t{T2}\n"
        ),
    );
    let dev = write(
        td.path(),
        "dev.txt",
        &format!(
            "Game/Binaries/game.so\tAAAA\nGame/older.txt\t{T2}\nGame/same.txt\t{T1}\nGame/newer.txt\t{T1}\n"
        ),
    );
    let r = reconcile_class(&stage, FileClass::Ufs, &[dev], &policy(), true).unwrap();
    assert_eq!(
        r.delta,
        vec!["Game/Binaries/game.so", "Game/newer.txt", NON_UFS_DEPLOYED_MANIFEST, UFS_DEPLOYED_MANIFEST]
    );
}

#[test]
fn unparsable_stamp_fails_the_run() {
    let td = tempfile::tempdir().unwrap();
    let dev = write(td.path(), "dev.txt", "Game/a.txt\t01/02/2020 10:00\n");
    let p = policy();
    let mut r = Reconciler::new(&p, FileClass::NonUfs);
    let err = r.collect_deployed(&[dev]).unwrap_err();
    assert!(matches!(err, StageError::BadStamp { line: 1, .. }));
    assert_eq!(r.state(), ReconcileState::Failed);
}

#[test]
fn missing_staged_manifest_obsoletes_everything() {
    let td = tempfile::tempdir().unwrap();
    let dev = write(td.path(), "dev.txt", &format!("x\t{T1}\n"));
    let p = policy();
    let mut r = Reconciler::new(&p, FileClass::NonUfs);
    r.collect_deployed(&[dev]).unwrap();
    assert_eq!(r.state(), ReconcileState::CollectingDeployed);
    assert!(r.collect_staged(&td.path().join("nope.txt")).unwrap().is_empty());
    let out = r.compute().unwrap();
    assert_eq!(r.state(), ReconcileState::Succeeded);
    assert_eq!(out.obsolete, vec!["x"]);
}

#[test]
fn deployed_paths_match_regardless_of_case() {
    let td = tempfile::tempdir().unwrap();
    let stage = td.path().join("stage");
    staged(&stage, FileClass::NonUfs, &format!("game/Binaries/Game\t{T1}\n"));
    let dev = write(td.path(), "dev.txt", &format!("Game\\Binaries\\Game\t{T1}\n"));
    let r = reconcile_class(&stage, FileClass::NonUfs, &[dev], &policy(), true).unwrap();
    assert!(r.delta.is_empty());
    assert!(r.obsolete.is_empty());
}
