//! Content-hash index for suppressing redundant mirror writes.
//!
//! Maps a main-tree path to the last content hash that was successfully
//! mirrored. A re-notification for byte-identical content downgrades to a
//! no-op instead of producing another write and another WIP commit.
//!
//! The index lives in process memory only. After a restart it is empty and
//! gets rebuilt lazily as files are re-touched, so the first post-restart
//! batch may re-mirror files that did not actually change. That is an
//! accepted tradeoff, not a correctness bug.

use crate::error::{Error, Result};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// `path -> last successfully mirrored content hash`.
///
/// Mutated only by the owning repository worker, and only after the mirror
/// write for that path succeeded. A failed write leaves the old entry in
/// place so the next batch retries the path.
#[derive(Debug, Default)]
pub struct ContentHashIndex {
    hashes: HashMap<PathBuf, blake3::Hash>,
}

impl ContentHashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `hash` matches the last mirrored content for `path`.
    pub fn is_unchanged(&self, path: &Path, hash: &blake3::Hash) -> bool {
        self.hashes.get(path) == Some(hash)
    }

    /// Record a successful mirror write.
    pub fn record(&mut self, path: PathBuf, hash: blake3::Hash) {
        self.hashes.insert(path, hash);
    }

    /// Drop the entry for a path that no longer exists in the mirror.
    pub fn forget(&mut self, path: &Path) {
        self.hashes.remove(path);
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Hash a file's current content.
pub fn hash_file(path: &Path) -> Result<blake3::Hash> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(blake3::hash(&bytes))
}
