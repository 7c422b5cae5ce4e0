//! Version-control engine wrapper.
//!
//! Wraps [`git2::Repository`] with the operations the WIP pipeline consumes:
//! status snapshots and ignore queries on the read side, branch / checkout /
//! stage / commit / merge mutators on the write side, plus worktree
//! management and the shadow history walk.
//!
//! Read-side failures map to [`Error::Classification`], write-side failures
//! to [`Error::Commit`], so the propagation policy of the pipeline falls out
//! of the types.
//!
//! # Thread Safety
//!
//! [`Repository`] is not thread-safe; each repository worker owns its own
//! instance.

use crate::{
    error::{Error, Result},
    owner::WipOwner,
    status::StatusSnapshot,
};
use git2::{
    build::CheckoutBuilder, BranchType, ErrorCode, IndexAddOption, Oid, Signature, StatusOptions,
    WorktreeAddOptions, WorktreePruneOptions,
};
use std::path::{Path, PathBuf};

/// Fallback committer identity when the repository has none configured.
const FALLBACK_NAME: &str = "umbra";
const FALLBACK_EMAIL: &str = "umbra@localhost";

/// One commit on a shadow branch.
#[derive(Clone, Debug)]
pub struct WipCommitInfo {
    pub oid: Oid,
    /// Commit time, seconds since epoch.
    pub time: i64,
    pub summary: String,
}

/// Outcome of [`Repository::merge_into`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The branch already contained the source commit.
    UpToDate,
    /// The branch was fast-forwarded to the source commit.
    FastForward(Oid),
    /// A merge commit was created.
    Merged(Oid),
}

/// A git repository (main or shadow worktree) opened for the pipeline.
pub struct Repository {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl Repository {
    /// Open the repository at `path` (working tree root or `.git` dir).
    pub fn open(path: &Path) -> Result<Self> {
        let repo = git2::Repository::open(path)
            .map_err(|e| Error::Open(format!("{}: {}", path.display(), e.message())))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| Error::Open(format!("{}: bare repository", path.display())))?
            .to_path_buf();
        Ok(Self { repo, workdir })
    }

    /// True if a git repository exists at `path`.
    pub fn exists_at(path: &Path) -> bool {
        git2::Repository::open(path).is_ok()
    }

    /// Working tree root.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// The repository's metadata directory.
    ///
    /// For a linked worktree this is the private `.git/worktrees/<name>`
    /// directory, not the shared one.
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// True if this repository is a linked worktree.
    pub fn is_worktree(&self) -> bool {
        self.repo.is_worktree()
    }

    // ---- read side -------------------------------------------------------

    /// Take a fresh status snapshot.
    ///
    /// Untracked files are included; untracked directories stay collapsed to
    /// one entry, matching the watcher's exclude seeding.
    pub fn status(&self) -> Result<StatusSnapshot> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).exclude_submodules(true);

        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(Error::classification)?;

        let mut snapshot = StatusSnapshot::default();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else {
                // Non-utf8 path; nothing downstream can do with it.
                tracing::warn!("skipping non-utf8 path in status");
                continue;
            };
            snapshot.insert(path, entry.status());
        }
        Ok(snapshot)
    }

    /// True if the workdir-relative path matches the repository's ignore
    /// rules. Query failures count as not ignored.
    pub fn is_ignored(&self, rel: &Path) -> bool {
        match self.repo.is_path_ignored(rel) {
            Ok(ignored) => ignored,
            Err(e) => {
                tracing::warn!(path = %rel.display(), "ignore query failed: {}", e.message());
                false
            }
        }
    }

    /// Raw ignore rules: root `.gitignore` lines plus the repository's
    /// internal exclude file, comments and blanks stripped.
    pub fn ignore_rules(&self) -> Vec<String> {
        let mut rules = Vec::new();
        for path in [
            self.workdir.join(".gitignore"),
            self.repo.path().join("info").join("exclude"),
        ] {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            rules.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(String::from),
            );
        }
        rules
    }

    /// Resolve what the repository's HEAD currently anchors.
    pub fn head_owner(&self) -> Result<WipOwner> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head
                    .peel_to_commit()
                    .map_err(|e| Error::commit("peeling HEAD", e))?;
                if head.is_branch() {
                    let name = head
                        .shorthand()
                        .ok_or_else(|| {
                            Error::Commit("HEAD branch name is not utf-8".to_string())
                        })?
                        .to_string();
                    Ok(WipOwner::Branch {
                        name,
                        oid: commit.id(),
                    })
                } else {
                    Ok(WipOwner::Detached { oid: commit.id() })
                }
            }
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                Ok(WipOwner::Unborn)
            }
            Err(e) => Err(Error::commit("resolving HEAD", e)),
        }
    }

    /// OID of the current HEAD commit, `None` for an unborn branch.
    pub fn head_oid(&self) -> Result<Option<Oid>> {
        Ok(self.head_owner()?.anchor())
    }

    /// Commit time of HEAD, seconds since epoch. `None` for unborn.
    pub fn head_commit_time(&self) -> Result<Option<i64>> {
        match self.head_oid()? {
            Some(oid) => Ok(Some(self.commit_time(oid)?)),
            None => Ok(None),
        }
    }

    /// Commit time for an arbitrary commit.
    pub fn commit_time(&self, oid: Oid) -> Result<i64> {
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|e| Error::commit("looking up commit", e))?;
        Ok(commit.time().seconds())
    }

    /// Look up a local branch tip, `None` if the branch does not exist.
    pub fn find_branch(&self, name: &str) -> Option<Oid> {
        self.repo
            .find_branch(name, BranchType::Local)
            .ok()
            .and_then(|b| b.get().target())
    }

    /// Name of the currently checked-out branch, if HEAD is on one.
    pub fn current_branch(&self) -> Option<String> {
        let head = self.repo.head().ok()?;
        if head.is_branch() {
            head.shorthand().map(String::from)
        } else {
            None
        }
    }

    // ---- write side ------------------------------------------------------

    /// Create (or force-reset) a local branch at `oid`.
    pub fn create_branch(&self, name: &str, oid: Oid) -> Result<()> {
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|e| Error::commit("looking up branch anchor", e))?;
        self.repo
            .branch(name, &commit, true)
            .map_err(|e| Error::commit("creating branch", e))?;
        Ok(())
    }

    /// Check out a local branch, forcing the working tree to match.
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        self.repo
            .set_head(&format!("refs/heads/{name}"))
            .map_err(|e| Error::commit("setting HEAD", e))?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))
            .map_err(|e| Error::commit("checking out branch", e))?;
        Ok(())
    }

    /// Stage every change in the working tree, including deletions.
    pub fn stage_all(&self) -> Result<()> {
        let mut index = self
            .repo
            .index()
            .map_err(|e| Error::commit("opening index", e))?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .map_err(|e| Error::commit("staging additions", e))?;
        index
            .update_all(["*"].iter(), None)
            .map_err(|e| Error::commit("staging deletions", e))?;
        index.write().map_err(|e| Error::commit("writing index", e))?;
        Ok(())
    }

    /// Commit the index onto HEAD.
    pub fn commit(&self, message: &str) -> Result<Oid> {
        let sig = self.signature()?;
        let mut index = self
            .repo
            .index()
            .map_err(|e| Error::commit("opening index", e))?;
        let tree_id = index
            .write_tree()
            .map_err(|e| Error::commit("writing tree", e))?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| Error::commit("looking up tree", e))?;

        let parent = match self.repo.head() {
            Ok(head) => Some(
                head.peel_to_commit()
                    .map_err(|e| Error::commit("peeling HEAD", e))?,
            ),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
            Err(e) => return Err(Error::commit("resolving HEAD", e)),
        };
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .map_err(|e| Error::commit("creating commit", e))
    }

    /// A commit of the empty tree with no parents and no ref update.
    ///
    /// Used to anchor a shadow branch for a repository that has no commits
    /// yet, without touching the user's unborn branch.
    pub fn create_bootstrap_commit(&self) -> Result<Oid> {
        let sig = self.signature()?;
        let builder = self
            .repo
            .treebuilder(None)
            .map_err(|e| Error::commit("creating tree builder", e))?;
        let tree_id = builder
            .write()
            .map_err(|e| Error::commit("writing empty tree", e))?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| Error::commit("looking up empty tree", e))?;
        self.repo
            .commit(None, &sig, &sig, "Shadow history bootstrap", &tree, &[])
            .map_err(|e| Error::commit("creating bootstrap commit", e))
    }

    /// Merge `source_oid` into the currently checked-out branch.
    ///
    /// Fast-forwards when possible; otherwise creates a merge commit.
    /// Conflicts are never auto-resolved -- they surface as
    /// [`Error::MergeConflict`].
    pub fn merge_into(&self, source_oid: Oid, message: &str) -> Result<MergeOutcome> {
        let head = self
            .repo
            .head()
            .map_err(|e| Error::commit("resolving HEAD for merge", e))?;
        let our_commit = head
            .peel_to_commit()
            .map_err(|e| Error::commit("peeling HEAD for merge", e))?;

        if our_commit.id() == source_oid {
            return Ok(MergeOutcome::UpToDate);
        }

        let annotated = self
            .repo
            .find_annotated_commit(source_oid)
            .map_err(|e| Error::commit("looking up merge source", e))?;
        let (analysis, _pref) = self
            .repo
            .merge_analysis(&[&annotated])
            .map_err(|e| Error::commit("analyzing merge", e))?;

        if analysis.is_up_to_date() {
            return Ok(MergeOutcome::UpToDate);
        }

        let branch = self.current_branch().unwrap_or_else(|| "HEAD".to_string());

        if analysis.is_fast_forward() || analysis.is_unborn() {
            let refname = format!("refs/heads/{branch}");
            let mut reference = self
                .repo
                .find_reference(&refname)
                .map_err(|e| Error::commit("looking up branch ref", e))?;
            reference
                .set_target(source_oid, "fast-forward shadow branch")
                .map_err(|e| Error::commit("fast-forwarding branch", e))?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::new().force()))
                .map_err(|e| Error::commit("checking out fast-forward", e))?;
            return Ok(MergeOutcome::FastForward(source_oid));
        }

        let their_commit = self
            .repo
            .find_commit(source_oid)
            .map_err(|e| Error::commit("looking up merge source commit", e))?;
        let mut merged_index = self
            .repo
            .merge_commits(&our_commit, &their_commit, None)
            .map_err(|e| Error::commit("merging commits", e))?;

        if merged_index.has_conflicts() {
            return Err(Error::MergeConflict { branch, source_oid });
        }

        let tree_id = merged_index
            .write_tree_to(&self.repo)
            .map_err(|e| Error::commit("writing merged tree", e))?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(|e| Error::commit("looking up merged tree", e))?;
        let sig = self.signature()?;
        let merge_oid = self
            .repo
            .commit(
                Some("HEAD"),
                &sig,
                &sig,
                message,
                &tree,
                &[&our_commit, &their_commit],
            )
            .map_err(|e| Error::commit("creating merge commit", e))?;
        // Bring index and working tree in line with the new HEAD.
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))
            .map_err(|e| Error::commit("checking out merge result", e))?;
        Ok(MergeOutcome::Merged(merge_oid))
    }

    // ---- worktrees -------------------------------------------------------

    /// Register a linked worktree at `path`, checked out on `branch`.
    ///
    /// The branch must already exist; the worktree adopts it instead of
    /// letting libgit2 invent one named after the worktree.
    pub fn add_worktree(&self, name: &str, path: &Path, branch: &str) -> Result<()> {
        let reference = self
            .repo
            .find_reference(&format!("refs/heads/{branch}"))
            .map_err(|e| Error::commit("looking up worktree branch", e))?;
        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(&reference));
        self.repo
            .worktree(name, path, Some(&opts))
            .map_err(|e| Error::commit("adding worktree", e))?;
        Ok(())
    }

    /// Prune a worktree registration, including a locked or still-valid one.
    pub fn prune_worktree(&self, name: &str) -> Result<()> {
        let worktree = match self.repo.find_worktree(name) {
            Ok(wt) => wt,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(()),
            Err(e) => return Err(Error::commit("looking up worktree", e)),
        };
        let mut opts = WorktreePruneOptions::new();
        opts.valid(true).locked(true).working_tree(true);
        worktree
            .prune(Some(&mut opts))
            .map_err(|e| Error::commit("pruning worktree", e))?;
        Ok(())
    }

    // ---- history ---------------------------------------------------------

    /// Walk a shadow branch from its tip, excluding `stop_at` (the owner's
    /// anchor commit) and everything behind it.
    pub fn wip_commits(&self, branch: &str, stop_at: Option<Oid>) -> Result<Vec<WipCommitInfo>> {
        let Some(tip) = self.find_branch(branch) else {
            return Ok(Vec::new());
        };
        let mut walk = self
            .repo
            .revwalk()
            .map_err(Error::classification)?;
        walk.push(tip).map_err(Error::classification)?;

        let mut commits = Vec::new();
        for oid in walk {
            let oid = oid.map_err(Error::classification)?;
            if Some(oid) == stop_at {
                break;
            }
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(Error::classification)?;
            commits.push(WipCommitInfo {
                oid,
                time: commit.time().seconds(),
                summary: commit.summary().unwrap_or("").to_string(),
            });
        }
        Ok(commits)
    }

    fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig),
            Err(_) => Signature::now(FALLBACK_NAME, FALLBACK_EMAIL)
                .map_err(|e| Error::commit("creating fallback signature", e)),
        }
    }
}
