use chrono::DateTime;
use std::error::Error;
use umbra::Engine;

use crate::cli::RepoArgs;

/// Print the shadow history for the repository's current owner, newest
/// first.
pub fn handle(args: RepoArgs, engine: &Engine) -> Result<(), Box<dyn Error>> {
    engine.open_repository(&args.root)?;
    let history = engine.wip_history(&args.root)?;

    if history.is_empty() {
        println!("no shadow history for {}", args.root.display());
        return Ok(());
    }
    for commit in history {
        let when = DateTime::from_timestamp(commit.time, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| commit.time.to_string());
        let oid = commit.oid.to_string();
        println!("{} {} {}", &oid[..8.min(oid.len())], when, commit.summary);
    }
    Ok(())
}
