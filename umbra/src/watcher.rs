//! Filesystem watcher over a repository's working tree.
//!
//! Emits raw absolute paths with no event-type information through a bounded
//! channel. Paths under the exclude set (git metadata directory, the shadow
//! worktree itself, known generated trees) are dropped at the source so
//! mirror writes never re-trigger the watch that produced them.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use smol::channel::Sender;
use std::path::{Path, PathBuf};

/// A raw signal from the notification source.
#[derive(Debug, Clone)]
pub enum WatchSignal {
    /// Changed paths, unordered, possibly duplicated, no event type.
    Paths(Vec<PathBuf>),
    /// The watch dropped events or errored; the working tree must be
    /// re-watched. Carried through the debouncer as an empty batch.
    Rescan,
}

/// Handle to a running workdir watch. Dropping it stops the watch.
pub struct WorkdirWatcher {
    _watcher: RecommendedWatcher,
}

impl WorkdirWatcher {
    /// Start watching `root` recursively. Sends signals to `sender`.
    ///
    /// Returns [`None`] if the watcher can't be created; the caller treats
    /// that the same as a dead watch and retries on the next rescan.
    pub fn spawn(
        root: &Path,
        excludes: Vec<PathBuf>,
        sender: Sender<WatchSignal>,
    ) -> Option<Self> {
        let mut watcher = notify::recommended_watcher(
            move |event: Result<notify::Event, notify::Error>| {
                let signal = match event {
                    Ok(event) if needs_rescan(&event) => WatchSignal::Rescan,
                    Ok(event) => {
                        let paths: Vec<PathBuf> = event
                            .paths
                            .into_iter()
                            .filter(|p| !is_excluded(p, &excludes))
                            .collect();
                        if paths.is_empty() {
                            return;
                        }
                        WatchSignal::Paths(paths)
                    }
                    Err(_) => WatchSignal::Rescan,
                };
                // A full channel means a flush is already pending; raw
                // signals are safe to drop because the batch dedups anyway.
                let _ = sender.try_send(signal);
            },
        )
        .ok()?;

        watcher.watch(root, RecursiveMode::Recursive).ok()?;
        Some(Self { _watcher: watcher })
    }
}

fn needs_rescan(event: &notify::Event) -> bool {
    event.need_rescan()
}

fn is_excluded(path: &Path, excludes: &[PathBuf]) -> bool {
    excludes.iter().any(|ex| path.starts_with(ex))
}
