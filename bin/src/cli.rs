//! Command-line definition for the `umbra` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "umbra", about = "Shadow WIP versioning for git working trees")]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to this file (or directory, keeping the default name).
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch repositories and keep their shadow histories current.
    Watch(WatchArgs),
    /// Append a manual snapshot commit to a repository's shadow history.
    Snapshot(SnapshotArgs),
    /// List a repository's shadow history for its current owner.
    History(RepoArgs),
    /// Delete a repository's shadow worktree (its branches survive).
    DeleteWorktree(RepoArgs),
}

#[derive(Debug, Parser)]
pub struct WatchArgs {
    /// Repository working-tree roots to watch.
    #[arg(required = true)]
    pub roots: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct SnapshotArgs {
    /// Repository working-tree root.
    pub root: PathBuf,

    /// Commit message for the snapshot.
    #[arg(short, long, default_value = "Manual snapshot")]
    pub message: String,
}

#[derive(Debug, Parser)]
pub struct RepoArgs {
    /// Repository working-tree root.
    pub root: PathBuf,
}
