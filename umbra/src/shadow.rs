//! Shadow worktree lifecycle.
//!
//! Each watched repository gets one linked worktree under the shadow root,
//! sharing the main repository's object store but carrying its own index and
//! checkout. WIP branches are only ever checked out here, never in the main
//! working tree, so the engine can stage and commit without disturbing what
//! the user sees.
//!
//! The worktree is durable: reopening a repository finds the existing
//! registration and resumes the same shadow histories.

use crate::{
    error::Result,
    owner::WipOwner,
    repo::Repository,
};
use std::path::{Path, PathBuf};

/// Registration name of the shadow worktree inside the main repository.
const WORKTREE_NAME: &str = "umbra_wip";

/// The shadow worktree of one watched repository.
pub struct ShadowWorktree {
    repo: Repository,
    workdir: PathBuf,
}

/// Where the shadow worktree for `main_workdir` lives: the main working
/// tree's absolute path re-rooted under `shadow_root`.
pub fn shadow_path(shadow_root: &Path, main_workdir: &Path) -> PathBuf {
    let mut path = shadow_root.to_path_buf();
    for component in main_workdir.components() {
        use std::path::Component;
        match component {
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
            other => path.push(other),
        }
    }
    path
}

impl ShadowWorktree {
    /// Open the repository's shadow worktree, creating it on first use.
    ///
    /// Creation anchors the worktree on the current owner's shadow branch;
    /// for an unborn repository a parentless bootstrap commit provides the
    /// anchor without touching the user's unborn branch.
    pub fn open_or_create(main: &Repository, shadow_root: &Path) -> Result<Self> {
        let workdir = shadow_path(shadow_root, main.workdir());

        if Repository::exists_at(&workdir) {
            let repo = Repository::open(&workdir)?;
            return Ok(Self { repo, workdir });
        }

        // A stale registration (directory wiped by hand, crashed mid-create)
        // blocks re-adding under the same name.
        main.prune_worktree(WORKTREE_NAME)?;
        if workdir.exists() {
            std::fs::remove_dir_all(&workdir)
                .map_err(|e| crate::error::Error::io(&workdir, e))?;
        }
        if let Some(parent) = workdir.parent() {
            std::fs::create_dir_all(parent).map_err(|e| crate::error::Error::io(parent, e))?;
        }

        let owner = main.head_owner()?;
        let branch = owner.branch_name();
        if main.find_branch(&branch).is_none() {
            let anchor = match owner.anchor() {
                Some(oid) => oid,
                None => main.create_bootstrap_commit()?,
            };
            main.create_branch(&branch, anchor)?;
        }
        main.add_worktree(WORKTREE_NAME, &workdir, &branch)?;

        let repo = Repository::open(&workdir)?;
        tracing::info!(
            shadow = %workdir.display(),
            branch,
            "created shadow worktree"
        );
        Ok(Self { repo, workdir })
    }

    /// Make sure the owner's shadow branch exists and is checked out here.
    ///
    /// Called at the head of every commit sequence; a HEAD move in the main
    /// repository (branch switch, new commit) lands the next batch on a
    /// different branch.
    pub fn ensure_branch(&self, owner: &WipOwner) -> Result<()> {
        let branch = owner.branch_name();
        if self.repo.find_branch(&branch).is_none() {
            let anchor = match owner.anchor() {
                Some(oid) => oid,
                None => self.repo.create_bootstrap_commit()?,
            };
            self.repo.create_branch(&branch, anchor)?;
        }
        if self.repo.current_branch().as_deref() != Some(branch.as_str()) {
            self.repo.checkout_branch(&branch)?;
        }
        Ok(())
    }

    /// The shadow working tree root.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Tear the worktree down: drop the registration and the directory.
    ///
    /// Shadow branches stay behind; a later reopen resumes them.
    pub fn delete(self, main: &Repository) -> Result<()> {
        let workdir = self.workdir;
        drop(self.repo);
        tear_down(main, &workdir)
    }

    /// Tear down whatever worktree exists for `main` without opening it.
    ///
    /// For deletes issued before this process has touched the worktree;
    /// a missing registration or directory is not an error.
    pub fn remove(main: &Repository, shadow_root: &Path) -> Result<()> {
        tear_down(main, &shadow_path(shadow_root, main.workdir()))
    }
}

fn tear_down(main: &Repository, workdir: &Path) -> Result<()> {
    main.prune_worktree(WORKTREE_NAME)?;
    match std::fs::remove_dir_all(workdir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(crate::error::Error::io(workdir, e)),
    }
    tracing::info!(shadow = %workdir.display(), "deleted shadow worktree");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_fixture::GitFixture;

    #[test]
    fn shadow_path_re_roots_the_workdir() {
        let root = Path::new("/data/umbra/wip_worktrees");
        assert_eq!(
            shadow_path(root, Path::new("/home/dev/project")),
            PathBuf::from("/data/umbra/wip_worktrees/home/dev/project")
        );
    }

    #[test]
    fn create_then_reopen_resumes_the_same_worktree() {
        let fixture = GitFixture::new().expect("fixture");
        fixture.commit_file("a.txt", "x\n", "base").expect("commit");
        let main = Repository::open(fixture.dir()).expect("open");
        let shadow_root = tempfile::tempdir().expect("root");

        let shadow = ShadowWorktree::open_or_create(&main, shadow_root.path()).expect("create");
        let workdir = shadow.workdir().to_path_buf();
        assert!(workdir.join("a.txt").exists(), "checkout materializes files");
        assert!(shadow.repo().is_worktree());

        let owner = main.head_owner().expect("owner");
        assert_eq!(
            shadow.repo().current_branch().as_deref(),
            Some(owner.branch_name().as_str())
        );

        drop(shadow);
        let reopened = ShadowWorktree::open_or_create(&main, shadow_root.path()).expect("reopen");
        assert_eq!(reopened.workdir(), workdir);
    }

    #[test]
    fn unborn_repository_gets_a_bootstrap_anchor() {
        let fixture = GitFixture::new().expect("fixture");
        let main = Repository::open(fixture.dir()).expect("open");
        let shadow_root = tempfile::tempdir().expect("root");

        let shadow = ShadowWorktree::open_or_create(&main, shadow_root.path()).expect("create");
        assert_eq!(
            shadow.repo().current_branch().as_deref(),
            Some(crate::owner::WipOwner::Unborn.branch_name().as_str())
        );
        // The user's repository still has no commits of its own.
        assert_eq!(main.head_oid().expect("head"), None);
    }

    #[test]
    fn ensure_branch_follows_the_owner() {
        let fixture = GitFixture::new().expect("fixture");
        fixture.commit_file("a.txt", "x\n", "base").expect("commit");
        let main = Repository::open(fixture.dir()).expect("open");
        let shadow_root = tempfile::tempdir().expect("root");
        let shadow = ShadowWorktree::open_or_create(&main, shadow_root.path()).expect("create");

        // A new commit on the main branch moves the owner to a new anchor.
        fixture.commit_file("a.txt", "y\n", "advance").expect("commit");
        let owner = main.head_owner().expect("owner");
        shadow.ensure_branch(&owner).expect("ensure");
        assert_eq!(
            shadow.repo().current_branch().as_deref(),
            Some(owner.branch_name().as_str())
        );
    }

    #[test]
    fn remove_without_opening_tears_down_the_worktree() {
        let fixture = GitFixture::new().expect("fixture");
        fixture.commit_file("a.txt", "x\n", "base").expect("commit");
        let main = Repository::open(fixture.dir()).expect("open");
        let shadow_root = tempfile::tempdir().expect("root");

        let shadow = ShadowWorktree::open_or_create(&main, shadow_root.path()).expect("create");
        let workdir = shadow.workdir().to_path_buf();
        drop(shadow);

        // No handle open, as after a process restart.
        ShadowWorktree::remove(&main, shadow_root.path()).expect("remove");
        assert!(!workdir.exists());

        // Nothing left to remove is fine too.
        ShadowWorktree::remove(&main, shadow_root.path()).expect("remove again");
    }

    #[test]
    fn delete_removes_directory_and_allows_recreate() {
        let fixture = GitFixture::new().expect("fixture");
        fixture.commit_file("a.txt", "x\n", "base").expect("commit");
        let main = Repository::open(fixture.dir()).expect("open");
        let shadow_root = tempfile::tempdir().expect("root");

        let shadow = ShadowWorktree::open_or_create(&main, shadow_root.path()).expect("create");
        let workdir = shadow.workdir().to_path_buf();
        shadow.delete(&main).expect("delete");
        assert!(!workdir.exists());

        // Re-creation under the same name must work after a delete.
        let again = ShadowWorktree::open_or_create(&main, shadow_root.path()).expect("recreate");
        assert!(again.workdir().exists());
    }
}
