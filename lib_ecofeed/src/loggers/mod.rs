//! # Logging Setup
//!
//! Installs the global `tracing` subscriber used by the ecofeed binaries.
//!
//! - Console output is human readable, with targets and ANSI colors.
//! - With a log directory, a second layer writes JSON lines to a daily
//!   rotating file through a non-blocking appender.
//! - `RUST_LOG` wins over the configured level when set.
//!
//! The library never calls this itself; it only emits events.

use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Failures while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The log directory could not be created.
    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    /// The level is not a valid `EnvFilter` directive.
    #[error("Invalid log filter '{0}'")]
    Filter(String),

    /// Another global subscriber was installed first.
    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}

/// Options for [`init_tracing`].
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `lib_ecofeed=debug,info`.
    pub level: String,
    /// Directory for the JSON log file. `None` logs to the console only.
    pub log_dir: Option<PathBuf>,
    /// File name prefix for the rotating log.
    pub app_name: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            app_name: "ecofeed".to_string(),
        }
    }
}

/// Installs the global subscriber.
///
/// Keep the returned guard alive for the life of the program; dropping it
/// flushes and stops the file writer.
pub fn init_tracing(options: &LogOptions) -> Result<Option<WorkerGuard>, LoggerError> {
    let env_filter: EnvFilter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.level))
        .map_err(|_| LoggerError::Filter(options.level.clone()))?;

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = rolling::daily(dir, format!("{}.log", options.app_name));
            let (writer, guard) = non_blocking(file_appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggerError::AlreadyInstalled(e.to_string()))?;

    tracing::info!("Logging initialized with level: {}", options.level);
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = LogOptions {
            level: "debug".to_string(),
            log_dir: Some(dir.path().join("logs")),
            app_name: "ecofeed-test".to_string(),
        };

        let first = init_tracing(&options);
        let second = init_tracing(&LogOptions::default());

        // Another test binary thread may have won the race for the global slot.
        if let Ok(guard) = first {
            assert!(guard.is_some());
            assert!(dir.path().join("logs").is_dir());
        }
        assert!(matches!(second, Err(LoggerError::AlreadyInstalled(_))));
    }
}
