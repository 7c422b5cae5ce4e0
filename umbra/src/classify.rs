//! Status-aware change classification.
//!
//! Decides, per surviving path, what the mirror must do: write the file,
//! ensure a directory, delete a tracked mirror copy, remove an untracked
//! one, or nothing. Classification runs against a status snapshot taken
//! immediately beforehand; snapshot membership is authoritative over raw
//! filesystem existence checks.
//!
//! Byte-identical re-notifications are downgraded to no-ops through the
//! content-hash index, so an editor that rewrites unchanged files does not
//! produce empty WIP commits.

use crate::{
    error::Result,
    hash_index::{hash_file, ContentHashIndex},
    repo::Repository,
    status::StatusSnapshot,
};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

/// What the mirror should do for one path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeOp {
    /// Write the file's current bytes into the shadow tree.
    Modify { hash: blake3::Hash },
    /// Create the directory (with intermediates) in the shadow tree.
    EnsureDir,
    /// A tracked file disappeared from the main tree.
    Delete,
    /// An untracked mirror copy no longer has a counterpart.
    Remove,
}

impl ChangeOp {
    /// Human-readable descriptor for commit messages and summaries.
    /// Directory creation contributes no descriptor.
    pub fn descriptor(&self, rel: &Path) -> Option<String> {
        let name = rel.file_name()?.to_string_lossy();
        match self {
            ChangeOp::Modify { .. } => Some(format!("{name} is modified")),
            ChangeOp::EnsureDir => None,
            ChangeOp::Delete => Some(format!("{name} is deleted")),
            ChangeOp::Remove => Some(format!("{name} is removed")),
        }
    }
}

/// One classified, actionable change.
#[derive(Clone, Debug)]
pub struct ClassifiedChange {
    /// Path relative to the working-tree root.
    pub rel: PathBuf,
    pub op: ChangeOp,
}

/// Classify one normalized batch. No-ops are dropped here; the returned
/// list is exactly what the mirror will attempt.
pub fn classify_batch(
    repo: &Repository,
    snapshot: &StatusSnapshot,
    shadow_workdir: &Path,
    hashes: &ContentHashIndex,
    paths: &BTreeSet<PathBuf>,
) -> Result<Vec<ClassifiedChange>> {
    let workdir = repo.workdir();
    let mut changes = Vec::new();

    for path in paths {
        let Ok(rel) = path.strip_prefix(workdir) else {
            continue;
        };
        let shadow_copy = shadow_workdir.join(rel);

        let op = if snapshot.is_staged_or_unstaged(rel) {
            if !path.exists() {
                Some(ChangeOp::Delete)
            } else if path.is_dir() {
                Some(ChangeOp::EnsureDir)
            } else {
                upsert_op(path, hashes)
            }
        } else if snapshot.is_untracked(rel) {
            // Untracked files mirror like tracked ones; a missing source
            // with a lingering mirror copy means it was deleted after the
            // snapshot.
            if !path.exists() && shadow_copy.exists() {
                Some(ChangeOp::Remove)
            } else if path.exists() {
                if path.is_dir() {
                    Some(ChangeOp::EnsureDir)
                } else {
                    upsert_op(path, hashes)
                }
            } else {
                None
            }
        } else {
            // In neither set: became ignored, or was already gone when the
            // snapshot was taken.
            if path.exists() && !repo.is_ignored(rel) {
                if path.is_dir() {
                    Some(ChangeOp::EnsureDir)
                } else {
                    upsert_op(path, hashes)
                }
            } else if shadow_copy.exists() {
                // Orphaned mirror artifact.
                Some(ChangeOp::Remove)
            } else {
                None
            }
        };

        if let Some(op) = op {
            changes.push(ClassifiedChange {
                rel: rel.to_path_buf(),
                op,
            });
        }
    }

    Ok(changes)
}

/// Hash the file and compare with the last mirrored content. Identical
/// content downgrades to a no-op; a read failure skips the path so the next
/// batch retries it.
fn upsert_op(path: &Path, hashes: &ContentHashIndex) -> Option<ChangeOp> {
    match hash_file(path) {
        Ok(hash) => {
            if hashes.is_unchanged(path, &hash) {
                None
            } else {
                Some(ChangeOp::Modify { hash })
            }
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "skipping unreadable path: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_fixture::GitFixture;

    struct Setup {
        fixture: GitFixture,
        repo: Repository,
        shadow: tempfile::TempDir,
    }

    impl Setup {
        fn new() -> Self {
            let fixture = GitFixture::new().expect("fixture");
            let repo = Repository::open(fixture.dir()).expect("open");
            let shadow = tempfile::tempdir().expect("shadow dir");
            Self {
                fixture,
                repo,
                shadow,
            }
        }

        fn classify(&self, hashes: &ContentHashIndex, rels: &[&str]) -> Vec<ClassifiedChange> {
            let snapshot = self.repo.status().expect("status");
            let paths: BTreeSet<PathBuf> =
                rels.iter().map(|r| self.fixture.dir().join(r)).collect();
            classify_batch(&self.repo, &snapshot, self.shadow.path(), hashes, &paths)
                .expect("classify")
        }
    }

    #[test]
    fn tracked_edit_is_a_modify() {
        let setup = Setup::new();
        setup
            .fixture
            .commit_file("a.txt", "x", "base")
            .expect("commit");
        setup.fixture.write_file("a.txt", "y").expect("write");

        let changes = setup.classify(&ContentHashIndex::new(), &["a.txt"]);
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0].op, ChangeOp::Modify { .. }));
        assert_eq!(
            changes[0].op.descriptor(&changes[0].rel).as_deref(),
            Some("a.txt is modified")
        );
    }

    #[test]
    fn tracked_deletion_is_a_delete() {
        let setup = Setup::new();
        setup
            .fixture
            .commit_file("a.txt", "x", "base")
            .expect("commit");
        setup.fixture.remove_file("a.txt").expect("remove");

        let changes = setup.classify(&ContentHashIndex::new(), &["a.txt"]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].op, ChangeOp::Delete);
        assert_eq!(
            changes[0].op.descriptor(&changes[0].rel).as_deref(),
            Some("a.txt is deleted")
        );
    }

    #[test]
    fn unchanged_content_downgrades_to_noop() {
        let setup = Setup::new();
        setup
            .fixture
            .commit_file("a.txt", "x", "base")
            .expect("commit");
        setup.fixture.write_file("a.txt", "y").expect("write");

        let mut hashes = ContentHashIndex::new();
        hashes.record(setup.fixture.dir().join("a.txt"), blake3::hash(b"y"));

        let changes = setup.classify(&hashes, &["a.txt"]);
        assert!(changes.is_empty(), "identical content must be a noop");
    }

    #[test]
    fn untracked_create_then_delete_is_a_noop() {
        // Scenario: an untracked file was created and deleted inside one
        // debounce window; by classification time it neither exists nor has
        // a shadow copy.
        let setup = Setup::new();
        setup
            .fixture
            .commit_file("keep.txt", "x", "base")
            .expect("commit");

        let changes = setup.classify(&ContentHashIndex::new(), &["b.txt"]);
        assert!(changes.is_empty());
    }

    #[test]
    fn untracked_file_is_mirrored_and_its_loss_removed() {
        let setup = Setup::new();
        setup
            .fixture
            .commit_file("keep.txt", "x", "base")
            .expect("commit");
        setup.fixture.write_file("new.txt", "fresh").expect("write");

        let changes = setup.classify(&ContentHashIndex::new(), &["new.txt"]);
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0].op, ChangeOp::Modify { .. }));

        // Mirror it, then delete the source: the shadow copy must go.
        std::fs::write(setup.shadow.path().join("new.txt"), "fresh").expect("write");
        setup.fixture.remove_file("new.txt").expect("remove");

        let changes = setup.classify(&ContentHashIndex::new(), &["new.txt"]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].op, ChangeOp::Remove);
        assert_eq!(
            changes[0].op.descriptor(&changes[0].rel).as_deref(),
            Some("new.txt is removed")
        );
    }

    #[test]
    fn orphaned_shadow_copy_is_cleaned_up() {
        // Path in neither snapshot set, gone from disk, but still mirrored.
        let setup = Setup::new();
        setup
            .fixture
            .commit_file("keep.txt", "x", "base")
            .expect("commit");
        std::fs::write(setup.shadow.path().join("stale.txt"), "old").expect("write");

        let changes = setup.classify(&ContentHashIndex::new(), &["stale.txt"]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].op, ChangeOp::Remove);
    }

    #[test]
    fn newly_ignored_path_is_not_mirrored() {
        let setup = Setup::new();
        setup
            .fixture
            .commit_file(".gitignore", "*.tmp\n", "ignore")
            .expect("commit");
        setup.fixture.write_file("scratch.tmp", "x").expect("write");

        let changes = setup.classify(&ContentHashIndex::new(), &["scratch.tmp"]);
        assert!(changes.is_empty());
    }
}
