//! Logging setup for Umbra with file output and optional stdout.
//!
//! Logs always go to a file at `warn` level (or higher if the environment
//! asks for it). Stdout logging is enabled when `UMBRA_LOG` or `RUST_LOG` is
//! set, or in debug builds.
//!
//! ## Environment Variables
//!
//! 1. **`UMBRA_LOG`** (highest priority) - Umbra-specific logging control
//! 2. **`RUST_LOG`** - Standard tracing environment variable
//! 3. **Default** - `warn` globally, `info` for umbra crates
//!
//! ## Log File Location
//!
//! Default: `<data_local_dir>/umbra/logs/umbra-<pid>.log`
//! - macOS: `~/Library/Application Support/umbra/logs/umbra-12345.log`
//! - Linux: `~/.local/share/umbra/logs/umbra-12345.log`
//!
//! Override with `--log-file <path>`.

use std::{env, path::PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Returned from [`init`]; must be held alive to ensure log file flushing.
pub struct LogGuard {
    _file_guard: WorkerGuard,
    pub log_file: PathBuf,
}

pub struct LogConfig {
    pub log_file_path: Option<PathBuf>,
}

/// Initialize logging.
///
/// Respects the environment variable priority described in the module docs:
/// `UMBRA_LOG` > `RUST_LOG` > default settings.
///
/// The returned [`LogGuard`] must be held for the lifetime of the program --
/// dropping it flushes and stops the background file writer.
pub fn init(config: LogConfig) -> Result<LogGuard, Box<dyn std::error::Error + Send + Sync>> {
    let (log_dir, filename) = resolve_log_path(config.log_file_path);

    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::never(&log_dir, &filename);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = create_file_filter();
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_filter(file_filter);

    let stdout_enabled =
        env::var("UMBRA_LOG").is_ok() || env::var("RUST_LOG").is_ok() || cfg!(debug_assertions);

    let stdout_layer = if stdout_enabled {
        Some(fmt::layer().with_filter(create_filter()))
    } else {
        None
    };

    Registry::default()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    Ok(LogGuard {
        _file_guard: file_guard,
        log_file: log_dir.join(filename),
    })
}

/// Initialize logging for tests.
///
/// Stdout-only (no file output). Will not crash if called multiple times or
/// if logging is already initialized by another test.
pub fn test() {
    let _ = fmt().with_env_filter(create_filter()).try_init();
}

fn resolve_log_path(override_path: Option<PathBuf>) -> (PathBuf, String) {
    let filename = format!("umbra-{}.log", std::process::id());

    if let Some(path) = override_path {
        if path.extension().is_some() {
            let dir = path
                .parent()
                .unwrap_or_else(|| std::path::Path::new("."))
                .to_path_buf();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(filename);
            return (dir, name);
        }
        return (path, filename);
    }

    let dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("umbra")
        .join("logs");

    (dir, filename)
}

/// File filter: uses the user-specified level if set, otherwise `warn`.
fn create_file_filter() -> EnvFilter {
    if env::var("UMBRA_LOG").is_ok() || env::var("RUST_LOG").is_ok() {
        return create_filter();
    }
    EnvFilter::new("warn")
}

/// Create the appropriate [`EnvFilter`] based on environment variables.
///
/// Priority: `UMBRA_LOG` > `RUST_LOG` > defaults.
fn create_filter() -> EnvFilter {
    if let Ok(umbra_log) = env::var("UMBRA_LOG") {
        return expand_umbra_log(&umbra_log);
    }

    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }

    // Default: warn globally, info for umbra crates
    EnvFilter::new("warn,umbra=info,umbra_bin=info")
}

/// Expand `UMBRA_LOG` values into full tracing filter strings.
///
/// - `UMBRA_LOG=debug` becomes `warn,umbra=debug,umbra_bin=debug`
/// - `UMBRA_LOG=umbra::worker=trace,umbra=debug` is used as-is
fn expand_umbra_log(umbra_log: &str) -> EnvFilter {
    if umbra_log.contains('=') || umbra_log.contains(':') || umbra_log.contains(',') {
        return EnvFilter::new(umbra_log);
    }

    EnvFilter::new(format!("warn,umbra={umbra_log},umbra_bin={umbra_log}"))
}
