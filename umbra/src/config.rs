//! Engine configuration.
//!
//! Loaded from a TOML file when one is given, otherwise every field has a
//! default. Tests construct [`Config`] directly with short windows.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Configuration for the WIP versioning engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Length of the debounce window in seconds.
    ///
    /// All raw notifications arriving within one window coalesce into a
    /// single batch.
    pub debounce_secs: u64,

    /// Deadline for one batch's classify/mirror/commit pipeline in seconds.
    ///
    /// Checked cooperatively between pipeline stages; a batch that blows
    /// past it fails with a timeout instead of stalling the repository's
    /// queue forever.
    pub batch_timeout_secs: u64,

    /// Capacity of the bounded channels between watcher, debouncer, and
    /// worker. Overflow drops raw notifications, which the self-healing
    /// rescan recovers from.
    pub channel_capacity: usize,

    /// Root directory holding all shadow worktrees.
    ///
    /// Defaults to `<data_local_dir>/umbra/wip_worktrees`.
    pub shadow_root: Option<PathBuf>,

    /// Extra absolute paths excluded from watching, e.g. large generated
    /// trees the ignore rules don't cover.
    pub exclude: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_secs: 5,
            batch_timeout_secs: 60,
            channel_capacity: 1024,
            shadow_root: None,
            exclude: Vec::new(),
        }
    }
}

impl Config {
    /// Read and deserialize a TOML config file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    /// The directory shadow worktrees live under.
    pub fn shadow_root(&self) -> PathBuf {
        self.shadow_root.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("umbra")
                .join("wip_worktrees")
        })
    }
}
