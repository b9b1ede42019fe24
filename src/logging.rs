//! Diagnostic logging.
//!
//! Diagnostics go to stderr so they never interleave with the spot display
//! on stdout. An optional log file receives the same events without ANSI
//! colors; it is truncated when the session starts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default level when neither `RUST_LOG` nor a setting is given.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Keeps the log file writer alive. Dropping it flushes the file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> io::Result<Option<LoggingGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false);

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return Ok(None);
    };

    let (dir, name) = prepare_log_file(path)?;
    let file_appender = tracing_appender::rolling::never(dir, name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(Some(LoggingGuard {
        _file_guard: file_guard,
    }))
}

/// Create the log directory and truncate the file.
///
/// Returns the directory and file name for the appender.
fn prepare_log_file(path: &Path) -> io::Result<(PathBuf, PathBuf)> {
    let name = path
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log file has no file name"))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    fs::create_dir_all(&dir)?;
    fs::write(dir.join(&name), "")?;
    Ok((dir, name))
}
