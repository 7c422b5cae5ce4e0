//! Debounced aggregation of raw watch signals.
//!
//! A timer-driven batcher reads the watcher's bounded channel and coalesces
//! everything arriving within one fixed-length window into a single
//! deduplicated batch. The window is anchored at the first signal after the
//! previous flush -- it does not slide or reset on later arrivals, so a
//! steady stream of notifications still flushes once per window.
//!
//! A watch backend can also die without ever signalling an error. To keep
//! that detectable, a long quiet stretch flushes an empty batch; the worker
//! answers every empty flush by rebuilding the watch.

use crate::{watcher::WatchSignal, worker::Job};
use smol::channel::{Receiver, Sender};
use std::{
    collections::BTreeSet,
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

/// Spawn the batcher thread for one repository.
///
/// Runs until the signal channel closes (watcher and engine dropped) or the
/// job channel closes (worker shut down).
pub fn spawn(
    signals: Receiver<WatchSignal>,
    window: Duration,
    jobs: Sender<Job>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || run(signals, window, jobs))
}

/// Quiet windows before a liveness flush.
const IDLE_WINDOWS: u32 = 12;

fn run(signals: Receiver<WatchSignal>, window: Duration, jobs: Sender<Job>) {
    loop {
        // Wait for something to happen, then collect for one full window.
        let idle = Instant::now() + window * IDLE_WINDOWS;
        let first = match smol::block_on(smol::future::or(
            async { Some(signals.recv().await) },
            async {
                smol::Timer::at(idle).await;
                None
            },
        )) {
            Some(Ok(signal)) => signal,
            Some(Err(_)) => return,
            None => {
                // Nothing heard for the whole idle stretch. An empty flush
                // makes the worker verify the watch is still alive.
                if !flush(&jobs, BTreeSet::new(), false) {
                    return;
                }
                continue;
            }
        };

        let mut paths = BTreeSet::new();
        let mut rescan = false;
        absorb(first, &mut paths, &mut rescan);

        let deadline = Instant::now() + window;
        loop {
            let next = smol::block_on(smol::future::or(
                async { Some(signals.recv().await) },
                async {
                    smol::Timer::at(deadline).await;
                    None
                },
            ));
            match next {
                Some(Ok(signal)) => absorb(signal, &mut paths, &mut rescan),
                Some(Err(_)) => {
                    flush(&jobs, paths, rescan);
                    return;
                }
                None => break,
            }
        }

        if !flush(&jobs, paths, rescan) {
            return;
        }
    }
}

fn absorb(signal: WatchSignal, paths: &mut BTreeSet<PathBuf>, rescan: &mut bool) {
    match signal {
        WatchSignal::Paths(batch) => paths.extend(batch),
        WatchSignal::Rescan => *rescan = true,
    }
}

fn flush(jobs: &Sender<Job>, paths: BTreeSet<PathBuf>, rescan: bool) -> bool {
    let job = Job::Batch {
        paths,
        rescan,
        submitted: Instant::now(),
    };
    smol::block_on(jobs.send(job)).is_ok()
}
