//! Subscriber setup for the command-line tool.
//!
//! Human-readable events go to stderr. When a log file is configured, the
//! same events are also written as JSON lines to a daily-rolling file so a
//! month's run can be audited afterwards.

use std::path::{Path, PathBuf};

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{MetricsError, Result};

const DEFAULT_LOG_FILE: &str = "logs/drive_metrics.log";

#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    /// Level for stderr when `RUST_LOG` is unset.
    pub stderr_level: LevelFilter,
    /// JSON log destination. `None` disables the file layer.
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            stderr_level: LevelFilter::INFO,
            file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
        }
    }
}

impl LogSettings {
    /// Settings for `-v`/`-q` counts. `LOG_FILE_PATH` overrides the default
    /// file location and an empty value turns the file off.
    pub fn from_flags(verbose: u8, quiet: u8) -> Self {
        let file = match std::env::var("LOG_FILE_PATH") {
            Ok(p) if p.trim().is_empty() => None,
            Ok(p) => Some(PathBuf::from(p)),
            Err(_) => Some(PathBuf::from(DEFAULT_LOG_FILE)),
        };
        Self {
            stderr_level: level_for(verbose, quiet),
            file,
        }
    }
}

/// Each `-v` raises and each `-q` lowers the stderr level by one step from
/// `info`.
pub fn level_for(verbose: u8, quiet: u8) -> LevelFilter {
    const LEVELS: [LevelFilter; 6] = [
        LevelFilter::OFF,
        LevelFilter::ERROR,
        LevelFilter::WARN,
        LevelFilter::INFO,
        LevelFilter::DEBUG,
        LevelFilter::TRACE,
    ];
    let step = (3 + i32::from(verbose) - i32::from(quiet)).clamp(0, 5);
    LEVELS[step as usize]
}

/// Splits `logs/run.log` into the appender's directory and file prefix.
fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "drive_metrics.log".to_string());
    (dir, prefix)
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held until
/// the program exits.
pub fn init(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let stderr_filter = EnvFilter::builder()
        .with_default_directive(settings.stderr_level.into())
        .from_env_lossy();
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let (file_layer, guard) = match &settings.file {
        Some(path) => {
            let (dir, prefix) = split_log_path(path);
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(prefix)
                .build(dir)
                .map_err(|e| MetricsError::Io(std::io::Error::other(e)))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let filter = EnvFilter::builder()
                .with_default_directive(LevelFilter::DEBUG.into())
                .with_env_var("RUST_LOG_JSON")
                .from_env_lossy();
            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(writer)
                .with_filter(filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_steps() {
        assert_eq!(level_for(0, 0), LevelFilter::INFO);
        assert_eq!(level_for(1, 0), LevelFilter::DEBUG);
        assert_eq!(level_for(9, 0), LevelFilter::TRACE);
        assert_eq!(level_for(0, 1), LevelFilter::WARN);
        assert_eq!(level_for(0, 9), LevelFilter::OFF);
        assert_eq!(level_for(2, 1), LevelFilter::DEBUG);
    }

    #[test]
    fn test_split_log_path() {
        let (dir, prefix) = split_log_path(Path::new("logs/run.log"));
        assert_eq!(dir, PathBuf::from("logs"));
        assert_eq!(prefix, "run.log");

        let (dir, prefix) = split_log_path(Path::new("run.log"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(prefix, "run.log");
    }
}
