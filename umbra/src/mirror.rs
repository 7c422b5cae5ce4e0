//! Applying classified changes to the shadow working tree.
//!
//! Every operation preserves the path's position relative to the main
//! working-tree root. Deletes are idempotent: a missing target is success,
//! not an error. Failures are per-path -- the batch keeps going and the
//! failed path stays out of the applied list, which keeps it out of the
//! hash index and the commit message so the next batch retries it.

use crate::{
    classify::{ChangeOp, ClassifiedChange},
    error::{Error, Result},
};
use std::{fs, io, path::Path};

/// Result of mirroring one batch.
#[derive(Debug, Default)]
pub struct MirrorOutcome {
    /// Changes whose filesystem operation succeeded.
    pub applied: Vec<ClassifiedChange>,
    /// Number of per-path failures (already logged).
    pub failed: usize,
}

/// Apply a batch of classified changes under `shadow_workdir`.
pub fn apply_batch(
    main_workdir: &Path,
    shadow_workdir: &Path,
    changes: Vec<ClassifiedChange>,
) -> MirrorOutcome {
    let mut outcome = MirrorOutcome::default();
    for change in changes {
        match apply_one(main_workdir, shadow_workdir, &change) {
            Ok(()) => outcome.applied.push(change),
            Err(e) => {
                tracing::warn!(path = %change.rel.display(), "mirror write failed: {e}");
                outcome.failed += 1;
            }
        }
    }
    outcome
}

fn apply_one(main_workdir: &Path, shadow_workdir: &Path, change: &ClassifiedChange) -> Result<()> {
    let source = main_workdir.join(&change.rel);
    let target = shadow_workdir.join(&change.rel);

    match &change.op {
        ChangeOp::Modify { .. } => {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            fs::copy(&source, &target).map_err(|e| Error::io(&target, e))?;
            Ok(())
        }
        ChangeOp::EnsureDir => {
            fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))
        }
        ChangeOp::Delete | ChangeOp::Remove => remove_idempotent(&target),
    }
}

fn remove_idempotent(target: &Path) -> Result<()> {
    let result = if target.is_dir() {
        fs::remove_dir_all(target)
    } else {
        fs::remove_file(target)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(target, e)),
    }
}
