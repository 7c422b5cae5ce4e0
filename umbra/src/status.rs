//! Status snapshots of the main repository.
//!
//! A [`StatusSnapshot`] classifies every changed path into the staged,
//! unstaged, and untracked sets. The classifier refreshes a snapshot
//! immediately before each pass so it never acts on a stale view of a
//! concurrent manual stage/unstage.

use git2::Status;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

/// Point-in-time classification of every changed path in the repository.
///
/// Paths are stored relative to the repository's working-tree root, the way
/// libgit2 reports them. Untracked directory entries keep their trailing
/// separator stripped.
#[derive(Debug, Default)]
pub struct StatusSnapshot {
    staged: HashSet<PathBuf>,
    unstaged: HashSet<PathBuf>,
    untracked: HashSet<PathBuf>,
}

impl StatusSnapshot {
    pub(crate) fn insert(&mut self, path: &str, status: Status) {
        let staged = Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE;
        let unstaged = Status::WT_MODIFIED
            | Status::WT_DELETED
            | Status::WT_RENAMED
            | Status::WT_TYPECHANGE;

        // Untracked directories are reported as "dir/".
        let rel = PathBuf::from(path.trim_end_matches('/'));

        if status.intersects(staged) {
            self.staged.insert(rel.clone());
        }
        if status.intersects(unstaged) {
            self.unstaged.insert(rel.clone());
        }
        if status.contains(Status::WT_NEW) {
            self.untracked.insert(rel);
        }
    }

    /// True if the path has staged or unstaged changes against HEAD.
    pub fn is_staged_or_unstaged(&self, rel: &Path) -> bool {
        self.staged.contains(rel) || self.unstaged.contains(rel)
    }

    /// True if the path is untracked.
    ///
    /// libgit2 collapses untracked directories into a single entry for the
    /// directory, so a file inside one matches through its ancestors.
    pub fn is_untracked(&self, rel: &Path) -> bool {
        rel.ancestors().any(|p| self.untracked.contains(p))
    }

    /// Untracked paths that are directories on disk, as absolute paths.
    ///
    /// Used to seed the watcher's exclude set: a large generated tree that
    /// git already considers one opaque untracked directory does not need
    /// per-file notifications.
    pub fn untracked_dirs(&self, workdir: &Path) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .untracked
            .iter()
            .map(|rel| workdir.join(rel))
            .filter(|abs| abs.is_dir())
            .collect();
        dirs.sort();
        dirs
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.unstaged.is_empty() && self.untracked.is_empty()
    }
}
