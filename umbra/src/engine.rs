//! Multi-repository front door.
//!
//! An [`Engine`] holds one worker per opened repository and a shared channel
//! of change summaries. All mutation goes through the workers' serial
//! queues; the engine itself only routes.

use crate::{
    config::Config,
    error::{Error, Result},
    repo::WipCommitInfo,
    worker::{self, ChangeSummary, Job, WorkerHandle},
};
use parking_lot::Mutex;
use smol::channel::{Receiver, Sender};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// The shadow WIP versioning engine.
pub struct Engine {
    config: Config,
    workers: Mutex<HashMap<PathBuf, WorkerHandle>>,
    summary_tx: Sender<ChangeSummary>,
    summary_rx: Receiver<ChangeSummary>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let (summary_tx, summary_rx) = smol::channel::bounded(config.channel_capacity);
        Self {
            config,
            workers: Mutex::new(HashMap::new()),
            summary_tx,
            summary_rx,
        }
    }

    /// Start watching and versioning the repository rooted at `root`.
    ///
    /// Opening an already-open repository is a no-op.
    pub fn open_repository(&self, root: &Path) -> Result<()> {
        let root = root.canonicalize().map_err(|e| Error::io(root, e))?;
        let mut workers = self.workers.lock();
        if workers.contains_key(&root) {
            return Ok(());
        }
        let handle = worker::spawn(&root, &self.config, self.summary_tx.clone())?;
        tracing::info!(root = %root.display(), "watching repository");
        workers.insert(root, handle);
        Ok(())
    }

    /// Stop watching `root`, draining its queue first. True if it was open.
    pub fn close_repository(&self, root: &Path) -> bool {
        let Some(handle) = self.remove(root) else {
            return false;
        };
        handle.shutdown();
        true
    }

    /// Queue a manual "snapshot now" with the given commit message.
    pub fn snapshot_now(&self, root: &Path, message: &str) -> Result<()> {
        self.submit(
            root,
            Job::Snapshot {
                message: message.to_string(),
            },
        )
    }

    /// Queue deletion of the repository's shadow worktree. Shadow branches
    /// survive; the next batch recreates the worktree.
    pub fn delete_wip_worktree(&self, root: &Path) -> Result<()> {
        self.submit(root, Job::DeleteShadow)
    }

    /// The current owner's shadow history, newest first, ending at the
    /// owner's anchor commit.
    ///
    /// Runs on the repository's queue, so it observes every batch queued
    /// before it.
    pub fn wip_history(&self, root: &Path) -> Result<Vec<WipCommitInfo>> {
        let (reply_tx, reply_rx) = smol::channel::bounded(1);
        self.submit(root, Job::History { reply: reply_tx })?;
        smol::block_on(reply_rx.recv())
            .map_err(|_| Error::Open(format!("{}: worker stopped", root.display())))?
    }

    /// Receiver of human-readable summaries, one per successful batch or
    /// snapshot, across all open repositories. Point-to-point: each summary
    /// goes to exactly one receiver.
    pub fn summaries(&self) -> Receiver<ChangeSummary> {
        self.summary_rx.clone()
    }

    /// Shut every worker down, draining their queues.
    pub fn shutdown(self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for (root, handle) in workers {
            tracing::debug!(root = %root.display(), "stopping worker");
            handle.shutdown();
        }
    }

    fn submit(&self, root: &Path, job: Job) -> Result<()> {
        let root = root.canonicalize().map_err(|e| Error::io(root, e))?;
        let workers = self.workers.lock();
        let handle = workers
            .get(&root)
            .ok_or_else(|| Error::Open(format!("{}: repository is not open", root.display())))?;
        if handle.submit(job) {
            Ok(())
        } else {
            Err(Error::Open(format!("{}: worker stopped", root.display())))
        }
    }

    fn remove(&self, root: &Path) -> Option<WorkerHandle> {
        let root = root.canonicalize().ok()?;
        self.workers.lock().remove(&root)
    }
}
