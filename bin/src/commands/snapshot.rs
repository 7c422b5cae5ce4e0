use std::error::Error;
use umbra::Engine;

use crate::cli::SnapshotArgs;

/// Append one manual snapshot commit and wait for it to land.
pub fn handle(args: SnapshotArgs, engine: &Engine) -> Result<(), Box<dyn Error>> {
    engine.open_repository(&args.root)?;
    engine.snapshot_now(&args.root, &args.message)?;

    // The history query runs behind the snapshot on the same queue.
    let history = engine.wip_history(&args.root)?;
    match history.first() {
        Some(commit) => println!("recorded {} \"{}\"", commit.oid, commit.summary),
        None => println!("recorded snapshot"),
    }
    Ok(())
}
