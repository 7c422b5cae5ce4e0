//! The WIP commit engine.
//!
//! Turns a mirrored batch (or a manual snapshot request) into a commit on
//! the owner's shadow branch. The full sequence runs under the repository
//! worker, so an automatic batch and a manual snapshot can never interleave:
//!
//! 1. [`prepare`]: make sure the owner's shadow branch exists and is checked
//!    out, then reconcile -- if the shadow tip lags the main HEAD, merge the
//!    main HEAD into the shadow branch, so the HEAD is an ancestor of the
//!    commit about to be appended;
//! 2. the mirror writes the batch into the shadow worktree;
//! 3. [`commit_batch`]: stage everything and commit with the joined batch
//!    descriptors (or the caller's message).
//!
//! The split matters: both reconciliation paths end in a forced checkout,
//! which would discard any not-yet-committed mirror writes. Preparation must
//! therefore happen before the mirror touches the worktree.
//!
//! Merge conflicts during reconciliation are a hard failure of the batch.
//! Nothing is auto-resolved and no WIP commit is appended on top of a
//! conflicted state.

use crate::{
    error::Result,
    owner::WipOwner,
    repo::{MergeOutcome, Repository},
    shadow::ShadowWorktree,
};
use git2::Oid;

/// What one commit run produced.
#[derive(Debug)]
pub struct WipOutcome {
    /// The appended WIP commit. `None` when the mirror left the shadow tree
    /// identical to the branch tip.
    pub commit: Option<Oid>,
    /// The reconciling merge, when one was needed.
    pub merged: Option<MergeOutcome>,
    /// Human-readable summary for the notification channel.
    pub summary: Option<String>,
}

/// Check out the owner's shadow branch and absorb a lagging main HEAD.
///
/// Must run before the mirror writes the batch: the reconciling merge (and
/// a branch switch) force-checkout the worktree, which would discard
/// anything mirrored but not yet committed.
pub fn prepare(
    main: &Repository,
    shadow: &ShadowWorktree,
    owner: &WipOwner,
) -> Result<Option<MergeOutcome>> {
    shadow.ensure_branch(owner)?;
    reconcile(main, shadow, owner)
}

/// Commit one mirrored batch onto the owner's shadow branch.
///
/// `merged` is the reconciliation result of the [`prepare`] call that opened
/// this batch; it is carried through into the outcome.
pub fn commit_batch(
    shadow: &ShadowWorktree,
    owner: &WipOwner,
    descriptors: &[String],
    merged: Option<MergeOutcome>,
) -> Result<WipOutcome> {
    let message = descriptors.join("\n");
    let summary = match descriptors {
        [] => String::new(),
        [only] => only.clone(),
        many => format!("{} files are changed", many.len()),
    };
    finish(shadow, owner, &message, summary, false, merged)
}

/// Prepare and commit the shadow worktree's current state with a
/// caller-supplied message, regardless of pending descriptors.
pub fn snapshot(
    main: &Repository,
    shadow: &ShadowWorktree,
    owner: &WipOwner,
    message: &str,
) -> Result<WipOutcome> {
    let merged = prepare(main, shadow, owner)?;
    finish(shadow, owner, message, message.to_string(), true, merged)
}

fn finish(
    shadow: &ShadowWorktree,
    owner: &WipOwner,
    message: &str,
    summary: String,
    allow_empty: bool,
    merged: Option<MergeOutcome>,
) -> Result<WipOutcome> {
    shadow.repo().stage_all()?;
    if !allow_empty && shadow.repo().status()?.is_empty() {
        // Every surviving change was content-identical to the branch tip.
        return Ok(WipOutcome {
            commit: None,
            merged,
            summary: None,
        });
    }

    let commit = shadow.repo().commit(message)?;
    tracing::debug!(branch = %owner.branch_name(), %commit, "appended wip commit");
    Ok(WipOutcome {
        commit: Some(commit),
        merged,
        summary: Some(summary),
    })
}

/// Merge the main HEAD into the shadow branch when the branch tip's commit
/// time does not exceed the HEAD's. An equal timestamp still triggers the
/// attempt (commits land within one second in quick succession); the merge
/// analysis reports up-to-date when there is nothing to do.
fn reconcile(
    main: &Repository,
    shadow: &ShadowWorktree,
    owner: &WipOwner,
) -> Result<Option<MergeOutcome>> {
    let Some(main_oid) = main.head_oid()? else {
        return Ok(None);
    };
    let branch = owner.branch_name();
    let Some(tip) = shadow.repo().find_branch(&branch) else {
        return Ok(None);
    };
    if tip == main_oid {
        return Ok(None);
    }
    let tip_time = shadow.repo().commit_time(tip)?;
    let main_time = main.commit_time(main_oid)?;
    if tip_time > main_time {
        return Ok(None);
    }

    let outcome = shadow
        .repo()
        .merge_into(main_oid, &format!("Reconcile {branch} with {main_oid}"))?;
    match outcome {
        MergeOutcome::UpToDate => Ok(None),
        outcome => {
            tracing::info!(branch, %main_oid, ?outcome, "reconciled shadow branch with HEAD");
            Ok(Some(outcome))
        }
    }
}
