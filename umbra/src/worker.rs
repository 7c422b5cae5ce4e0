//! Per-repository worker.
//!
//! All mutable state for one watched repository (git handles, the content
//! hash index, the cached owner, the watcher) is owned by a single dedicated
//! thread. Everything that touches it arrives as a [`Job`] on a bounded
//! channel and executes strictly in order, so an automatic batch and a
//! manual snapshot can never interleave.
//!
//! The pipeline for one batch is normalize, prepare (branch checkout and
//! HEAD reconciliation), classify, mirror, commit. Each batch carries the
//! instant it was submitted; the worker checks the configured deadline at
//! stage boundaries and abandons a batch that blew past it instead of
//! stalling the queue forever.

use crate::{
    classify::{self, ChangeOp},
    config::Config,
    debounce,
    error::{Error, Result},
    hash_index::ContentHashIndex,
    mirror, normalize,
    owner::WipOwner,
    repo::{Repository, WipCommitInfo},
    shadow::{self, ShadowWorktree},
    watcher::{WatchSignal, WorkdirWatcher},
    wip,
};
use smol::channel::{Receiver, Sender};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    thread,
    time::Instant,
};

/// Work item on a repository's serial queue.
#[derive(Debug)]
pub enum Job {
    /// One flushed debounce window.
    Batch {
        paths: BTreeSet<PathBuf>,
        rescan: bool,
        submitted: Instant,
    },
    /// User-triggered "snapshot now" with a message.
    Snapshot { message: String },
    /// List the current owner's shadow history, newest first.
    History {
        reply: Sender<Result<Vec<WipCommitInfo>>>,
    },
    /// Tear down the shadow worktree.
    DeleteShadow,
    Shutdown,
}

/// One successful batch, announced to subscribers.
#[derive(Clone, Debug)]
pub struct ChangeSummary {
    /// Main working-tree root the summary belongs to.
    pub root: PathBuf,
    /// The lone descriptor, or `"<n> files are changed"`.
    pub text: String,
}

/// Handle the engine keeps per repository. Dropping it does not stop the
/// worker; send [`Job::Shutdown`] and join.
pub struct WorkerHandle {
    jobs: Sender<Job>,
    thread: thread::JoinHandle<()>,
}

impl WorkerHandle {
    /// Queue a job. Returns false if the worker is gone.
    pub fn submit(&self, job: Job) -> bool {
        smol::block_on(self.jobs.send(job)).is_ok()
    }

    pub fn shutdown(self) {
        let _ = smol::block_on(self.jobs.send(Job::Shutdown));
        let _ = self.thread.join();
    }
}

/// Spawn the watcher, debouncer, and worker thread for one repository.
pub fn spawn(
    root: &Path,
    config: &Config,
    summaries: Sender<ChangeSummary>,
) -> Result<WorkerHandle> {
    let main = Repository::open(root)?;
    let owner = main.head_owner()?;

    let (raw_tx, raw_rx) = smol::channel::bounded(config.channel_capacity);
    let (job_tx, job_rx) = smol::channel::bounded(config.channel_capacity);
    // Runs until the raw channel closes; no join needed.
    let _debouncer = debounce::spawn(raw_rx, config.debounce_window(), job_tx.clone());

    let mut ctx = RepositoryContext {
        main,
        owner,
        shadow: None,
        hashes: ContentHashIndex::new(),
        watcher: None,
        raw_tx,
        summaries,
        config: config.clone(),
    };
    ctx.rewatch();

    let thread = thread::Builder::new()
        .name("umbra-worker".to_string())
        .spawn(move || ctx.run(job_rx))
        .map_err(|e| Error::io(root, e))?;

    Ok(WorkerHandle {
        jobs: job_tx,
        thread,
    })
}

/// All mutable state of one watched repository.
struct RepositoryContext {
    main: Repository,
    /// Cached owner. Refreshed per batch, but a HEAD move that keeps the
    /// same identity (a new commit on the same branch) keeps the cached
    /// anchor so the shadow branch lags and reconciles.
    owner: WipOwner,
    shadow: Option<ShadowWorktree>,
    hashes: ContentHashIndex,
    watcher: Option<WorkdirWatcher>,
    raw_tx: Sender<WatchSignal>,
    summaries: Sender<ChangeSummary>,
    config: Config,
}

impl RepositoryContext {
    fn run(mut self, jobs: Receiver<Job>) {
        while let Ok(job) = smol::block_on(jobs.recv()) {
            let result = match job {
                Job::Batch {
                    paths,
                    rescan,
                    submitted,
                } => self.process_batch(paths, rescan, submitted),
                Job::Snapshot { message } => self.process_snapshot(&message),
                Job::History { reply } => {
                    let _ = reply.try_send(self.history());
                    Ok(())
                }
                Job::DeleteShadow => self.delete_shadow(),
                Job::Shutdown => break,
            };
            if let Err(e) = result {
                tracing::error!(root = %self.main.workdir().display(), "job failed: {e}");
            }
        }
    }

    fn process_batch(
        &mut self,
        raw: BTreeSet<PathBuf>,
        rescan: bool,
        submitted: Instant,
    ) -> Result<()> {
        let deadline = submitted + self.config.batch_timeout();

        // The whole shadow root is self-referential, not just this
        // repository's worktree under it.
        let surviving = normalize::normalize_batch(&self.main, &self.config.shadow_root(), raw);
        if rescan || surviving.is_empty() {
            // An empty flush means the OS watch silently died; a rescan flag
            // means it dropped events. Either way the watch is rebuilt.
            self.rewatch();
            if surviving.is_empty() {
                return Ok(());
            }
        }

        check_deadline(deadline, "classification")?;
        self.refresh_owner()?;
        self.ensure_shadow()?;
        // Branch checkout and reconciliation happen before the mirror
        // writes; their forced checkouts would discard uncommitted copies.
        let merged = {
            let shadow = self.shadow()?;
            wip::prepare(&self.main, shadow, &self.owner)?
        };
        let snapshot = self.main.status()?;
        let shadow_workdir = self.shadow_dir();

        let changes = classify::classify_batch(
            &self.main,
            &snapshot,
            &shadow_workdir,
            &self.hashes,
            &surviving,
        )?;
        if changes.is_empty() {
            return Ok(());
        }

        check_deadline(deadline, "mirroring")?;
        let outcome = mirror::apply_batch(self.main.workdir(), &shadow_workdir, changes);
        if outcome.failed > 0 {
            tracing::warn!(
                root = %self.main.workdir().display(),
                failed = outcome.failed,
                "batch applied partially; failed paths retry next flush"
            );
        }

        let mut descriptors = Vec::new();
        for change in &outcome.applied {
            if let Some(descriptor) = change.op.descriptor(&change.rel) {
                descriptors.push(descriptor);
            }
        }
        if descriptors.is_empty() {
            // Directory-only batches mirror but never commit; git tracks no
            // empty directories and an empty message helps nobody.
            return Ok(());
        }

        check_deadline(deadline, "committing")?;
        let wip = wip::commit_batch(self.shadow()?, &self.owner, &descriptors, merged)?;

        // Hashes record only after the commit sequence succeeded, so a
        // failed commit leaves the paths eligible for redelivery.
        for change in &outcome.applied {
            let abs = self.main.workdir().join(&change.rel);
            match &change.op {
                ChangeOp::Modify { hash } => self.hashes.record(abs, *hash),
                ChangeOp::Delete | ChangeOp::Remove => self.hashes.forget(&abs),
                ChangeOp::EnsureDir => {}
            }
        }
        if let Some(summary) = wip.summary {
            self.announce(summary);
        }
        Ok(())
    }

    fn process_snapshot(&mut self, message: &str) -> Result<()> {
        self.refresh_owner()?;
        self.ensure_shadow()?;
        let wip = wip::snapshot(&self.main, self.shadow()?, &self.owner, message)?;
        if let Some(summary) = wip.summary {
            self.announce(summary);
        }
        Ok(())
    }

    /// Walk the cached owner's shadow branch, stopping at its anchor.
    ///
    /// Reads through the main handle; shadow branches live in the shared
    /// object store.
    fn history(&self) -> Result<Vec<WipCommitInfo>> {
        self.main
            .wip_commits(&self.owner.branch_name(), self.owner.anchor())
    }

    fn delete_shadow(&mut self) -> Result<()> {
        match self.shadow.take() {
            Some(shadow) => shadow.delete(&self.main)?,
            // A fresh process has not opened the worktree yet, but the
            // registration and directory may still exist on disk.
            None => ShadowWorktree::remove(&self.main, &self.config.shadow_root())?,
        }
        // The mirrored copies are gone, so the recorded hashes are stale.
        self.hashes = ContentHashIndex::new();
        Ok(())
    }

    /// Re-resolve the owner, keeping the cached anchor when the identity is
    /// unchanged.
    fn refresh_owner(&mut self) -> Result<()> {
        let current = self.main.head_owner()?;
        if !self.owner.same_identity(&current) {
            tracing::info!(
                root = %self.main.workdir().display(),
                from = %self.owner.branch_name(),
                to = %current.branch_name(),
                "owner changed"
            );
            self.owner = current;
        }
        Ok(())
    }

    fn ensure_shadow(&mut self) -> Result<()> {
        if self.shadow.is_none() {
            let shadow = ShadowWorktree::open_or_create(&self.main, &self.config.shadow_root())?;
            self.shadow = Some(shadow);
        }
        Ok(())
    }

    fn shadow(&self) -> Result<&ShadowWorktree> {
        self.shadow
            .as_ref()
            .ok_or_else(|| Error::Commit("shadow worktree disappeared mid-job".to_string()))
    }

    fn shadow_dir(&self) -> PathBuf {
        shadow::shadow_path(&self.config.shadow_root(), self.main.workdir())
    }

    /// Drop any existing watch and establish a fresh one with freshly
    /// seeded excludes.
    fn rewatch(&mut self) {
        self.watcher = None;
        let excludes = self.watch_excludes();
        self.watcher =
            WorkdirWatcher::spawn(self.main.workdir(), excludes, self.raw_tx.clone());
        if self.watcher.is_none() {
            tracing::error!(
                root = %self.main.workdir().display(),
                "could not establish filesystem watch"
            );
        } else {
            tracing::debug!(root = %self.main.workdir().display(), "watch established");
        }
    }

    /// Paths the watcher drops at the source: git metadata, the shadow
    /// worktree, configured extras, ignored directories named by the ignore
    /// rules, and untracked directories known right now.
    fn watch_excludes(&self) -> Vec<PathBuf> {
        let workdir = self.main.workdir();
        let mut excludes = vec![
            self.main.git_dir().to_path_buf(),
            self.config.shadow_root(),
        ];
        excludes.extend(self.config.exclude.iter().cloned());

        let rules = self.main.ignore_rules();
        let negated: Vec<&str> = rules
            .iter()
            .filter_map(|r| r.strip_prefix('!'))
            .map(|r| r.trim_matches('/'))
            .collect();
        for rule in &rules {
            if rule.starts_with('!') {
                continue;
            }
            let name = rule.trim_matches('/');
            if name.is_empty() || negated.contains(&name) {
                continue;
            }
            let candidate = workdir.join(name);
            if candidate.is_dir() {
                excludes.push(candidate);
            }
        }

        if let Ok(snapshot) = self.main.status() {
            excludes.extend(snapshot.untracked_dirs(workdir));
        }
        excludes.sort();
        excludes.dedup();
        excludes
    }

    fn announce(&self, text: String) {
        let summary = ChangeSummary {
            root: self.main.workdir().to_path_buf(),
            text,
        };
        // A full or unwatched summary channel never blocks the pipeline.
        if let Err(e) = self.summaries.try_send(summary) {
            tracing::debug!("dropping change summary: {e}");
        }
    }
}

fn check_deadline(deadline: Instant, stage: &'static str) -> Result<()> {
    if Instant::now() > deadline {
        Err(Error::Timeout { stage })
    } else {
        Ok(())
    }
}
