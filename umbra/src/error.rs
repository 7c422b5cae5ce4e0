//! Error taxonomy for the shadow WIP pipeline.
//!
//! Each variant maps to a distinct propagation policy:
//!
//! - [`Error::Io`] -- one path failed to mirror; the batch continues with its
//!   remaining paths and the failed path is retried on the next batch.
//! - [`Error::Classification`] -- the status snapshot could not be refreshed;
//!   the whole batch is aborted before any mirroring happens.
//! - [`Error::Commit`] -- any step of the commit sequence failed; the whole
//!   sequence is aborted and no partial WIP commit is created.
//! - [`Error::MergeConflict`] -- the HEAD-reconciliation merge produced
//!   conflicts. There is no automatic resolution; the batch's commit step
//!   fails loudly.
//! - [`Error::Timeout`] -- the batch blew past its deadline between two
//!   pipeline stages.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the WIP versioning pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Mirror read/write/remove failure on a single path.
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Status snapshot query failure.
    #[error("status query failed: {0}")]
    Classification(String),

    /// Branch create/checkout/stage/commit failure.
    #[error("commit sequence failed: {0}")]
    Commit(String),

    /// The reconciling merge of main HEAD into the shadow branch conflicted.
    #[error("merging {source_oid} into {branch} produced conflicts")]
    MergeConflict {
        branch: String,
        source_oid: git2::Oid,
    },

    /// A batch exceeded its processing deadline.
    #[error("batch deadline exceeded during {stage}")]
    Timeout { stage: &'static str },

    /// A repository or worktree could not be opened or created.
    #[error("repository open failed: {0}")]
    Open(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn classification(err: git2::Error) -> Self {
        Error::Classification(err.message().to_string())
    }

    pub(crate) fn commit(context: &str, err: git2::Error) -> Self {
        Error::Commit(format!("{context}: {}", err.message()))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
