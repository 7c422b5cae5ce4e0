//! Shadow WIP versioning engine.
//!
//! Watches a repository's working tree, debounces raw filesystem
//! notifications into batches, classifies each surviving path against a
//! fresh status snapshot, mirrors the result into a shadow worktree, and
//! commits the mirror onto an auto-maintained per-owner branch, reconciled
//! with the main repository's HEAD.
//!
//! [`Engine`] is the front door; everything below it runs on one serial
//! queue per repository.

pub mod classify;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod hash_index;
pub mod mirror;
pub mod normalize;
pub mod owner;
pub mod repo;
pub mod shadow;
pub mod status;
pub mod watcher;
pub mod wip;
pub mod worker;

pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
pub use owner::{is_wip_branch, WipOwner, WIP_BRANCH_PREFIX};
pub use repo::{MergeOutcome, Repository, WipCommitInfo};
pub use worker::ChangeSummary;
