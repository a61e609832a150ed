//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays clean for command output. With
//! `logging.file = true` a daily rolling file is written as well.

use crate::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// File name prefix of the rolling log file.
const LOG_FILE_PREFIX: &str = "lexigen-update.log";

/// Filter from `RUST_LOG`, falling back to the configured directive.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter))
}

/// Install the global subscriber.
///
/// Returns the file writer guard when file logging is enabled; keep it alive
/// for the lifetime of the program or buffered lines are lost. Calling this
/// twice is harmless: the second call leaves the first subscriber in place.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = if config.file {
        let dir = config.dir.clone().unwrap_or_else(crate::app_dirs::logs_dir);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            eprintln!("cannot create log directory {}: {e}", dir.display());
            (None, None)
        } else {
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
    } else {
        (None, None)
    };

    let result = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(stderr)
        .with(file_layer)
        .try_init();
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    guard
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn file_logging_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let config = LoggingConfig {
            file: true,
            dir: Some(logs.clone()),
            ..Default::default()
        };
        let guard = init(&config);
        assert!(guard.is_some());
        assert!(logs.is_dir());
        // A second init must not panic.
        let _ = init(&LoggingConfig::default());
    }
}
