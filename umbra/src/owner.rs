//! Owner context and the shadow-branch naming function.
//!
//! A [`WipOwner`] identifies what a WIP history is anchored to: the live
//! status of a branch, a tag or commit being inspected, or an unborn
//! repository. The mapping to a branch name is pure and stable across
//! process restarts, so re-opening a repository resumes the same shadow
//! history instead of starting a new one.

use git2::Oid;

/// Prefix shared by every shadow branch the engine maintains.
pub const WIP_BRANCH_PREFIX: &str = "_umbra_wip_";

/// The anchoring context for a shadow branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WipOwner {
    /// Live status of a checked-out branch.
    Branch { name: String, oid: Oid },
    /// A tag being inspected.
    Tag { name: String, oid: Oid },
    /// A detached HEAD or historical commit being inspected.
    Detached { oid: Oid },
    /// A repository with no commits yet.
    Unborn,
}

impl WipOwner {
    /// The commit the owner's shadow branch is anchored at, if any.
    pub fn anchor(&self) -> Option<Oid> {
        match self {
            WipOwner::Branch { oid, .. }
            | WipOwner::Tag { oid, .. }
            | WipOwner::Detached { oid } => Some(*oid),
            WipOwner::Unborn => None,
        }
    }

    /// True if `other` anchors the same shadow history.
    ///
    /// Branch and tag owners are identified by name: a new commit on the
    /// same branch advances HEAD but keeps the owner, so the shadow branch
    /// lags and gets reconciled instead of being replaced. Detached owners
    /// are identified by commit.
    pub fn same_identity(&self, other: &WipOwner) -> bool {
        match (self, other) {
            (WipOwner::Branch { name: a, .. }, WipOwner::Branch { name: b, .. }) => a == b,
            (WipOwner::Tag { name: a, .. }, WipOwner::Tag { name: b, .. }) => a == b,
            (WipOwner::Detached { oid: a }, WipOwner::Detached { oid: b }) => a == b,
            (WipOwner::Unborn, WipOwner::Unborn) => true,
            _ => false,
        }
    }

    /// Map the owner to its shadow branch name.
    ///
    /// Same owner, same name -- the function has no hidden inputs.
    pub fn branch_name(&self) -> String {
        match self {
            WipOwner::Branch { name, oid } => {
                format!(
                    "{WIP_BRANCH_PREFIX}for_branch_{}_commit_{oid}",
                    sanitize_ref(name)
                )
            }
            WipOwner::Tag { name, oid } => {
                format!(
                    "{WIP_BRANCH_PREFIX}for_tag_{}_commit_{oid}",
                    sanitize_ref(name)
                )
            }
            WipOwner::Detached { oid } => {
                format!("{WIP_BRANCH_PREFIX}for_detached_commit_{oid}")
            }
            WipOwner::Unborn => format!("{WIP_BRANCH_PREFIX}for_no_commit"),
        }
    }
}

/// True if `name` is a shadow branch maintained by this engine.
pub fn is_wip_branch(name: &str) -> bool {
    name.starts_with(WIP_BRANCH_PREFIX)
}

/// Ref names can contain `/`, which is not valid inside a single branch
/// segment of the generated name.
fn sanitize_ref(name: &str) -> String {
    name.replace('/', "_")
}
