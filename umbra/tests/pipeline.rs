//! Deterministic end-to-end runs of the batch pipeline, driving the stages
//! directly instead of going through the filesystem watcher.

use git_fixture::GitFixture;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use umbra::{
    classify::{self, ChangeOp},
    hash_index::ContentHashIndex,
    mirror, normalize,
    shadow::ShadowWorktree,
    wip, Repository, WipOwner,
};

struct Pipeline {
    fixture: GitFixture,
    main: Repository,
    shadow: ShadowWorktree,
    hashes: ContentHashIndex,
    owner: WipOwner,
    _shadow_root: tempfile::TempDir,
}

impl Pipeline {
    fn new() -> Self {
        umbra_log::test();
        let fixture = GitFixture::new().expect("fixture");
        fixture
            .commit_file("README.md", "hello\n", "base")
            .expect("commit");
        let main = Repository::open(fixture.dir()).expect("open");
        let shadow_root = tempfile::tempdir().expect("shadow root");
        let shadow = ShadowWorktree::open_or_create(&main, shadow_root.path()).expect("shadow");
        let owner = main.head_owner().expect("owner");
        Self {
            fixture,
            main,
            shadow,
            hashes: ContentHashIndex::new(),
            owner,
            _shadow_root: shadow_root,
        }
    }

    /// Re-resolve the owner after the fixture made commits of its own.
    fn re_anchor(&mut self) {
        self.owner = self.main.head_owner().expect("owner");
    }

    /// Run one flushed batch through normalize, prepare, classify, mirror,
    /// commit. Returns the summary of the appended WIP commit, if one was
    /// made.
    fn flush(&mut self, rels: &[&str]) -> Option<String> {
        let raw: BTreeSet<PathBuf> = rels.iter().map(|r| self.fixture.dir().join(r)).collect();
        let surviving = normalize::normalize_batch(&self.main, self.shadow.workdir(), raw);
        if surviving.is_empty() {
            return None;
        }

        // Branch checkout and reconciliation run before the mirror writes.
        let merged = wip::prepare(&self.main, &self.shadow, &self.owner).expect("prepare");

        let snapshot = self.main.status().expect("status");
        let changes = classify::classify_batch(
            &self.main,
            &snapshot,
            self.shadow.workdir(),
            &self.hashes,
            &surviving,
        )
        .expect("classify");
        if changes.is_empty() {
            return None;
        }

        let outcome = mirror::apply_batch(self.main.workdir(), self.shadow.workdir(), changes);
        assert_eq!(outcome.failed, 0, "no mirror failures expected here");

        let descriptors: Vec<String> = outcome
            .applied
            .iter()
            .filter_map(|change| change.op.descriptor(&change.rel))
            .collect();
        if descriptors.is_empty() {
            return None;
        }

        let wip = wip::commit_batch(&self.shadow, &self.owner, &descriptors, merged)
            .expect("commit");
        for change in &outcome.applied {
            let abs = self.main.workdir().join(&change.rel);
            match &change.op {
                ChangeOp::Modify { hash } => self.hashes.record(abs, *hash),
                ChangeOp::Delete | ChangeOp::Remove => self.hashes.forget(&abs),
                ChangeOp::EnsureDir => {}
            }
        }
        wip.summary
    }

    fn commit_count(&self) -> usize {
        self.main
            .wip_commits(&self.owner.branch_name(), self.owner.anchor())
            .expect("history")
            .len()
    }

    fn shadow_files(&self) -> BTreeMap<String, String> {
        collect_files(self.shadow.workdir())
    }

    fn main_files(&self) -> BTreeMap<String, String> {
        collect_files(self.fixture.dir())
            .into_iter()
            .filter(|(rel, _)| !self.main.is_ignored(Path::new(rel)))
            .collect()
    }
}

/// All files under `root` by relative path, skipping git metadata.
fn collect_files(root: &Path) -> BTreeMap<String, String> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, String>) {
        for entry in std::fs::read_dir(dir).expect("read_dir") {
            let entry = entry.expect("entry");
            let path = entry.path();
            if entry.file_name() == ".git" {
                continue;
            }
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path
                    .strip_prefix(root)
                    .expect("inside root")
                    .to_string_lossy()
                    .into_owned();
                let content = std::fs::read_to_string(&path).expect("read");
                out.insert(rel, content);
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

#[test]
fn tracked_edit_lands_in_shadow_with_descriptor() {
    let mut pipeline = Pipeline::new();
    pipeline
        .fixture
        .commit_file("a.txt", "x", "add a")
        .expect("commit");
    pipeline.re_anchor();

    pipeline.fixture.write_file("a.txt", "y").expect("write");
    let summary = pipeline.flush(&["a.txt"]);

    assert_eq!(summary.as_deref(), Some("a.txt is modified"));
    assert_eq!(
        std::fs::read_to_string(pipeline.shadow.workdir().join("a.txt")).expect("read"),
        "y"
    );
}

#[test]
fn shadow_converges_to_the_main_tree() {
    let mut pipeline = Pipeline::new();
    pipeline
        .fixture
        .commit_file(".gitignore", "*.log\n", "ignore")
        .expect("commit");
    pipeline.re_anchor();

    // A mixed sequence: tracked edit, untracked create, ignored create,
    // then a tracked delete, over several batches.
    pipeline
        .fixture
        .write_file("README.md", "changed\n")
        .expect("write");
    pipeline.fixture.write_file("notes.txt", "new\n").expect("write");
    pipeline.fixture.write_file("debug.log", "junk\n").expect("write");
    pipeline.flush(&["README.md", "notes.txt", "debug.log"]);

    pipeline.fixture.remove_file("README.md").expect("remove");
    pipeline.flush(&["README.md"]);

    assert_eq!(pipeline.shadow_files(), pipeline.main_files());
    assert!(!pipeline.shadow.workdir().join("debug.log").exists());
}

#[test]
fn redelivered_unchanged_path_is_idempotent() {
    let mut pipeline = Pipeline::new();
    pipeline.fixture.write_file("a.txt", "same\n").expect("write");

    assert!(pipeline.flush(&["a.txt"]).is_some());
    let commits = pipeline.commit_count();

    // Same path, identical content, two more batches.
    assert!(pipeline.flush(&["a.txt"]).is_none());
    assert!(pipeline.flush(&["a.txt"]).is_none());
    assert_eq!(pipeline.commit_count(), commits);
}

#[test]
fn untracked_create_then_delete_in_one_window_is_silent() {
    let mut pipeline = Pipeline::new();
    // b.txt existed only between two raw notifications; by flush time it is
    // gone and was never mirrored.
    let summary = pipeline.flush(&["b.txt"]);
    assert!(summary.is_none());
    assert!(!pipeline.shadow.workdir().join("b.txt").exists());
    assert_eq!(pipeline.commit_count(), 0, "no wip commits at all");
}

#[test]
fn manual_commit_on_main_is_absorbed_before_the_next_snapshot() {
    let mut pipeline = Pipeline::new();
    pipeline.fixture.write_file("wip.txt", "draft\n").expect("write");
    pipeline.flush(&["wip.txt"]);

    // HEAD advances while the shadow branch stays behind.
    pipeline
        .fixture
        .commit_file("feature.rs", "fn f() {}\n", "user commit")
        .expect("commit");
    let head = pipeline.main.head_oid().expect("head").expect("some");

    let outcome = wip::snapshot(&pipeline.main, &pipeline.shadow, &pipeline.owner, "Snapshot now")
        .expect("snapshot");
    assert!(outcome.merged.is_some());

    let history = pipeline
        .main
        .wip_commits(&pipeline.owner.branch_name(), None)
        .expect("history");
    assert!(history.iter().any(|c| c.oid == head));
    assert_eq!(history[0].oid, outcome.commit.expect("commit"));
}
