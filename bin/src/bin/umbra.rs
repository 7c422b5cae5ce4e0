use clap::Parser;
use umbra::{Config, Engine};
use umbra_bin::{
    cli::{Cli, Command},
    commands,
};

fn main() {
    let cli = Cli::parse();

    let _log_guard = umbra_log::init(umbra_log::LogConfig {
        log_file_path: cli.log_file.clone(),
    })
    .unwrap_or_else(|e| {
        eprintln!("Error: failed to initialize logging: {e}");
        std::process::exit(1);
    });

    let config = match &cli.config {
        Some(path) => Config::load(path).unwrap_or_else(|e| {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }),
        None => Config::default(),
    };
    let engine = Engine::new(config);

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Command::Watch(args) => commands::watch::handle(args, &engine),
        Command::Snapshot(args) => commands::snapshot::handle(args, &engine),
        Command::History(args) => commands::history::handle(args, &engine),
        Command::DeleteWorktree(args) => commands::delete::handle(args, &engine),
    };

    if let Err(e) = result {
        eprintln!("Command failed: {e}");
        std::process::exit(1);
    }

    // Drain every queued batch before exiting.
    engine.shutdown();
}
