use std::error::Error;
use umbra::Engine;

use crate::cli::RepoArgs;

/// Delete the repository's shadow worktree. Shadow branches stay in the
/// object store; the next batch or snapshot recreates the worktree.
pub fn handle(args: RepoArgs, engine: &Engine) -> Result<(), Box<dyn Error>> {
    engine.open_repository(&args.root)?;
    engine.delete_wip_worktree(&args.root)?;
    println!("deleted shadow worktree for {}", args.root.display());
    Ok(())
}
