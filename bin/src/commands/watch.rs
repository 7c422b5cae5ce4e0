use std::error::Error;
use umbra::Engine;

use crate::cli::WatchArgs;

/// Watch the given repositories and print one line per successful batch.
/// Runs until interrupted.
pub fn handle(args: WatchArgs, engine: &Engine) -> Result<(), Box<dyn Error>> {
    for root in &args.roots {
        engine.open_repository(root)?;
        println!("watching {}", root.display());
    }

    let summaries = engine.summaries();
    while let Ok(summary) = smol::block_on(summaries.recv()) {
        println!("{}: {}", summary.root.display(), summary.text);
    }
    Ok(())
}
