//! Deployment delta reconciliation.
//!
//! Compares what a device reports as deployed with what was just staged and
//! produces two path lists: files to (re)deploy, and deployed files that are
//! no longer staged.

use crate::error::{IoContext, Result, StageError};
use crate::manifest::{FileClass, NON_UFS_DEPLOYED_MANIFEST, UFS_DEPLOYED_MANIFEST};
use crate::persist;
use crate::policy::PlatformPolicy;
use crate::record::DeployedRecord;
use crate::stamp::StampKind;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileState {
    Idle,
    CollectingDeployed,
    CollectingStaged,
    ComputingDelta,
    Succeeded,
    Failed,
}

/// Merged deployed manifests.
#[derive(Clone, Debug, Default)]
pub struct DeployedRead {
    pub record: DeployedRecord,
    /// Some source had no records, so nothing on the device can be trusted.
    pub full_sync: bool,
}

/// Merge every deployed manifest in `paths`, deleting each one after it is
/// read. The first manifest with no records discards everything merged so
/// far and stops merging; later manifests are still consumed.
pub fn read_deployed_manifests(paths: &[PathBuf], policy: &PlatformPolicy) -> Result<DeployedRead> {
    let mut out = DeployedRead::default();
    for path in paths {
        if !out.full_sync {
            let text = std::fs::read_to_string(path).at(path)?;
            let added = out.record.parse_into(path, &text, policy)?;
            if added == 0 {
                warn!(
                    "deployed manifest {} has no entries, deploying everything",
                    path.display()
                );
                out.record.clear();
                out.full_sync = true;
            } else {
                debug!("read {} deployed record(s) from {}", added, path.display());
            }
        }
        std::fs::remove_file(path).at(path)?;
    }
    Ok(out)
}

/// The manifest written by the last apply. A missing file is an empty record.
pub fn read_staged_manifest(path: &Path, policy: &PlatformPolicy) -> Result<DeployedRecord> {
    if !path.is_file() {
        debug!("no staged manifest at {}", path.display());
        return Ok(DeployedRecord::new());
    }
    DeployedRecord::read(path, policy).map(|(rec, _)| rec)
}

/// Deployed paths that are not staged any more, spelled as deployed.
pub fn compute_obsolete(deployed: &DeployedRecord, staged: &DeployedRecord) -> Vec<String> {
    deployed.iter().filter(|d| !staged.contains(&d.path)).map(|d| d.path.clone()).collect()
}

/// Staged paths that need deploying, spelled as staged. The UFS delta also
/// always carries both bookkeeping manifests.
pub fn compute_delta(
    deployed: &DeployedRecord,
    staged: &DeployedRecord,
    policy: &PlatformPolicy,
    class: FileClass,
) -> Result<Vec<String>> {
    let mut delta = vec![];
    for s in staged.iter() {
        let needs = match deployed.get(&s.path) {
            None => true,
            Some(d) => {
                let kind = StampKind::for_crc(policy.is_crc_significant(&s.path));
                match kind {
                    StampKind::ContentHash => s.stamp != d.stamp,
                    StampKind::Timestamp => kind.supersedes(&s.stamp, &d.stamp).ok_or_else(|| {
                        StageError::BadStamp {
                            path: PathBuf::from(&s.path),
                            line: 0,
                            value: format!("{} / {}", s.stamp, d.stamp),
                        }
                    })?,
                }
            }
        };
        if needs {
            delta.push(s.path.clone());
        }
    }
    if class == FileClass::Ufs {
        for name in [NON_UFS_DEPLOYED_MANIFEST, UFS_DEPLOYED_MANIFEST] {
            if !delta.iter().any(|d| d == name) {
                delta.push(name.to_string());
            }
        }
    }
    Ok(delta)
}

/// One path per line.
pub fn write_path_list(path: &Path, list: &[String]) -> Result<()> {
    persist::write_lines(path, list)
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct Reconciliation {
    pub delta: Vec<String>,
    pub obsolete: Vec<String>,
    pub full_sync: bool,
}

impl Reconciliation {
    /// Write `Manifest_Remove*.txt` always, and `Manifest_Delta*.txt` when
    /// deploying iteratively. Returns the files written.
    pub fn write(&self, stage_dir: &Path, class: FileClass, iterative: bool) -> Result<Vec<PathBuf>> {
        let mut written = vec![];
        let obsolete = stage_dir.join(class.obsolete_manifest());
        write_path_list(&obsolete, &self.obsolete)?;
        written.push(obsolete);
        if iterative {
            let delta = stage_dir.join(class.delta_manifest());
            write_path_list(&delta, &self.delta)?;
            written.push(delta);
        }
        Ok(written)
    }
}

/// Drives one class through deployed -> staged -> delta. Steps must run in
/// order; any error leaves the reconciler in [`ReconcileState::Failed`].
#[derive(Debug)]
pub struct Reconciler<'a> {
    policy: &'a PlatformPolicy,
    class: FileClass,
    state: ReconcileState,
    deployed: DeployedRead,
    staged: DeployedRecord,
}

impl<'a> Reconciler<'a> {
    pub fn new(policy: &'a PlatformPolicy, class: FileClass) -> Self {
        Self {
            policy,
            class,
            state: ReconcileState::Idle,
            deployed: DeployedRead::default(),
            staged: DeployedRecord::new(),
        }
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    fn enter(&mut self, from: ReconcileState, to: ReconcileState) -> Result<()> {
        if self.state != from {
            let was = self.state;
            self.state = ReconcileState::Failed;
            return Err(StageError::config(format!(
                "reconciler for {} cannot go from {:?} to {:?}",
                self.class.label(),
                was,
                to
            )));
        }
        self.state = to;
        Ok(())
    }

    fn fail<T>(&mut self, r: Result<T>) -> Result<T> {
        if r.is_err() {
            self.state = ReconcileState::Failed;
        }
        r
    }

    pub fn collect_deployed(&mut self, paths: &[PathBuf]) -> Result<&DeployedRead> {
        self.enter(ReconcileState::Idle, ReconcileState::CollectingDeployed)?;
        let r = read_deployed_manifests(paths, self.policy);
        self.deployed = self.fail(r)?;
        Ok(&self.deployed)
    }

    pub fn collect_staged(&mut self, path: &Path) -> Result<&DeployedRecord> {
        self.enter(ReconcileState::CollectingDeployed, ReconcileState::CollectingStaged)?;
        let r = read_staged_manifest(path, self.policy);
        self.staged = self.fail(r)?;
        Ok(&self.staged)
    }

    pub fn compute(&mut self) -> Result<Reconciliation> {
        self.enter(ReconcileState::CollectingStaged, ReconcileState::ComputingDelta)?;
        let obsolete = compute_obsolete(&self.deployed.record, &self.staged);
        let r = compute_delta(&self.deployed.record, &self.staged, self.policy, self.class);
        let delta = self.fail(r)?;
        self.state = ReconcileState::Succeeded;
        info!(
            "{}: {} to deploy, {} obsolete{}",
            self.class.label(),
            delta.len(),
            obsolete.len(),
            if self.deployed.full_sync { " (full sync)" } else { "" }
        );
        Ok(Reconciliation { delta, obsolete, full_sync: self.deployed.full_sync })
    }
}

/// Reconcile one class against the stage directory and write the lists.
pub fn reconcile_class(
    stage_dir: &Path,
    class: FileClass,
    deployed: &[PathBuf],
    policy: &PlatformPolicy,
    iterative: bool,
) -> Result<Reconciliation> {
    let mut r = Reconciler::new(policy, class);
    r.collect_deployed(deployed)?;
    r.collect_staged(&stage_dir.join(class.deployed_manifest()))?;
    let out = r.compute()?;
    out.write(stage_dir, class, iterative)?;
    Ok(out)
}
