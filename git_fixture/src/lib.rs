use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use tempfile::TempDir;

/// Run a git command in `dir`, returning stdout on success.
pub fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("running git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "git {} failed in {}:\n{stderr}",
            args.join(" "),
            dir.display()
        );
    }

    String::from_utf8(output.stdout).context("git output is not utf-8")
}

/// Reproducible temp git repository for exercising the WIP engine.
///
/// States are built imperatively: write files, stage, commit, or run
/// arbitrary git commands. The repository starts empty (unborn HEAD) until
/// the first commit.
pub struct GitFixture {
    _temp_dir: TempDir,
    dir: PathBuf,
}

impl GitFixture {
    /// Init a repo in a fresh temp dir with test user config.
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().context("creating temp dir")?;
        let dir = fs::canonicalize(temp_dir.path()).context("canonicalizing temp dir")?;
        run_git(&dir, &["init"])?;
        run_git(&dir, &["config", "user.name", "Test"])?;
        run_git(&dir, &["config", "user.email", "test@test.com"])?;
        Ok(Self {
            _temp_dir: temp_dir,
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a file relative to the repo root, creating parent directories.
    pub fn write_file(&self, rel: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    /// Remove a file relative to the repo root.
    pub fn remove_file(&self, rel: &str) -> Result<()> {
        let path = self.dir.join(rel);
        fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))
    }

    /// Write, stage, and commit a single file.
    pub fn commit_file(&self, rel: &str, content: &str, message: &str) -> Result<()> {
        self.write_file(rel, content)?;
        run_git(&self.dir, &["add", rel])?;
        run_git(&self.dir, &["commit", "-m", message])?;
        Ok(())
    }

    /// Stage everything and commit.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        run_git(&self.dir, &["add", "-A"])?;
        run_git(&self.dir, &["commit", "-m", message])?;
        Ok(())
    }

    /// Run a git command in the fixture directory, returning stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        run_git(&self.dir, args)
    }

    /// Full OID of the fixture's HEAD commit.
    pub fn head(&self) -> Result<String> {
        Ok(self.git(&["rev-parse", "HEAD"])?.trim().to_string())
    }
}
