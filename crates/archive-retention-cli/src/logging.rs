use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "logs/archive-retention.log";
const DEFAULT_LOG_FILE_NAME: &str = "archive-retention.log";

/// Stdout plus a plain-text log file.
///
/// `TRACING_LEVEL` filters both. `LOG_FILE_PATH` may be relative to the working
/// directory or absolute. `quiet` only raises the stdout threshold, the file
/// still gets everything the filter lets through.
pub fn init_logger(quiet: bool) -> impl Drop {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::new(filter);

    let log_file_path = env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let (log_dir, log_file) = split_log_path(Path::new(&log_file_path));

    let file_appender = tracing_appender::rolling::never(&log_dir, &log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_level = if quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::TRACE
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true)
                .with_filter(stdout_level),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(filter_layer)
        .init();

    info!(
        "Logging to stdout{} and {}",
        if quiet { " (warnings only)" } else { "" },
        log_dir.join(&log_file).display()
    );

    guard
}

/// Directory and file name for the appender. A bare file name lands in the
/// working directory, a path without a file name (`/`, `..`) gets the default one.
fn split_log_path(path: &Path) -> (PathBuf, OsString) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    match path.file_name() {
        Some(name) => (dir, name.to_os_string()),
        None => (path.to_path_buf(), OsString::from(DEFAULT_LOG_FILE_NAME)),
    }
}
