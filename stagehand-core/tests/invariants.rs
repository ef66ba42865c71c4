use proptest::prelude::*;
use stagehand_core::builder::{StageRequest, StagingContext};
use stagehand_core::manifest::FileClass;
use stagehand_core::policy::PlatformPolicy;
use stagehand_core::reconcile::{compute_delta, compute_obsolete};
use stagehand_core::record::DeployedRecord;
use stagehand_core::source::{name_matcher, SourceProvider};
use stagehand_core::stamp::format_timestamp;
use stagehand_core::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Files under one fixed root, no disk involved.
struct MemSource {
    root: PathBuf,
    files: Vec<String>,
}

impl SourceProvider for MemSource {
    fn enumerate(&self, _root: &Path, pattern: &str, recursive: bool) -> Result<Vec<String>> {
        let m = name_matcher(pattern)?;
        let mut out: Vec<String> = self
            .files
            .iter()
            .filter(|f| recursive || !f.contains('/'))
            .filter(|f| m.is_match(f.rsplit('/').next().unwrap_or(f.as_str())))
            .cloned()
            .collect();
        out.sort();
        Ok(out)
    }
    fn exists(&self, path: &Path) -> bool {
        path == self.root
    }
    fn subdirectories(&self, _root: &Path) -> Result<Vec<String>> {
        Ok(vec![])
    }
}

fn stamp_strategy() -> impl Strategy<Value = String> {
    (0i64..4_000_000_000_000)
        .prop_map(|ms| format_timestamp(chrono::DateTime::from_timestamp_millis(ms).unwrap()))
}

fn record_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    proptest::collection::btree_map("[a-z]{1,6}(/[a-z]{1,6}){0,2}\\.[a-z]{2,3}", stamp_strategy(), 0..30)
}

proptest! {
    #[test]
    fn tab_format_round_trips(files in record_strategy()) {
        let p = PlatformPolicy::default();
        let text: String = files.iter().map(|(k, v)| format!("{k}\t{v}\n")).collect();
        let mut first = DeployedRecord::new();
        prop_assert_eq!(first.parse_into(Path::new("a"), &text, &p).unwrap(), files.len());
        let mut second = DeployedRecord::new();
        second.parse_into(Path::new("b"), &first.render(), &p).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.render(), text);
    }

    #[test]
    fn nothing_to_do_against_self(files in record_strategy()) {
        let p = PlatformPolicy::default();
        let mut rec = DeployedRecord::new();
        for (k, v) in &files {
            rec.merge(k, v, &p).unwrap();
        }
        prop_assert!(compute_delta(&rec, &rec, &p, FileClass::NonUfs).unwrap().is_empty());
        prop_assert!(compute_obsolete(&rec, &rec).is_empty());
    }

    #[test]
    fn staging_is_order_independent_and_respects_excludes(
        names in proptest::collection::btree_set("[a-z]{1,6}(/[a-z]{1,6})?", 1..30),
        exts in proptest::collection::vec(prop_oneof![Just("uasset"), Just("umap"), Just("txt")], 30),
        seed in any::<u64>(),
    ) {
        let files: Vec<String> =
            names.iter().zip(&exts).map(|(n, e)| format!("{n}.{e}")).collect();
        let mut shuffled = files.clone();
        let k = shuffled.len();
        shuffled.rotate_left((seed as usize) % k);

        let root = PathBuf::from("/src/Content");
        let req = StageRequest::new(FileClass::Ufs, &root).dest("Game/Content").exclude(["*.uasset", "*.umap"]);
        let run = |files: Vec<String>| {
            StagingContext::new("/stage", PlatformPolicy::default())
                .stage_files(&MemSource { root: root.clone(), files }, &req)
                .unwrap()
                .0
        };
        let a = run(files.clone());
        let b = run(shuffled);
        prop_assert_eq!(a.ufs.entries(), b.ufs.entries());
        let want = files.iter().filter(|f| f.ends_with(".txt")).count();
        prop_assert_eq!(a.ufs.len(), want);
        prop_assert!(a.ufs.iter().all(|e| e.dest.ends_with(".txt")));
    }
}
