//! Path normalization and filtering between debounce and classification.
//!
//! Editors commonly write through swap files (`file.txt~`) or atomic-save
//! staging directories (`dir~/file.txt`); both refer to the real path next
//! to them. Everything ignored, self-referential (git metadata, the shadow
//! worktree itself), or outside the working tree is dropped here so the
//! classifier only ever sees candidate working-tree paths.

use crate::repo::Repository;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

/// Suffix editors append to swap files and atomic-save directories.
const SWAP_SUFFIX: char = '~';

/// Normalize one flushed batch into candidate working-tree paths.
///
/// Output paths are absolute, deduplicated, and guaranteed to be inside the
/// main working tree and outside the metadata and shadow directories.
pub fn normalize_batch(
    repo: &Repository,
    shadow_dir: &Path,
    raw: BTreeSet<PathBuf>,
) -> BTreeSet<PathBuf> {
    let workdir = repo.workdir();
    let git_dir = repo.git_dir();

    let mut surviving = BTreeSet::new();
    for path in raw {
        let Some(path) = strip_swap_suffix(&path) else {
            continue;
        };
        if in_swap_dir(&path) {
            continue;
        }
        if path.starts_with(git_dir) || path.starts_with(shadow_dir) {
            continue;
        }
        let Ok(rel) = path.strip_prefix(workdir) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            // The workdir root itself carries no information.
            continue;
        }
        if repo.is_ignored(rel) {
            continue;
        }
        surviving.insert(path);
    }
    surviving
}

/// Strip a single trailing swap suffix, recovering the real path.
///
/// Returns [`None`] for a path with no usable file name.
fn strip_swap_suffix(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    match name.strip_suffix(SWAP_SUFFIX) {
        Some("") => None,
        Some(stripped) => Some(path.with_file_name(stripped)),
        None => Some(path.to_path_buf()),
    }
}

/// True if the path sits inside an atomic-save staging directory.
fn in_swap_dir(path: &Path) -> bool {
    path.parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(SWAP_SUFFIX))
}
