//! Logging configuration and initialization
//!
//! Provides structured logging with tracing, supporting console output,
//! file logging, and JSON format for log aggregation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable console output (default: true)
    #[serde(rename = "consoleEnabled", default = "default_console_enabled")]
    pub console_enabled: bool,
    /// Enable file logging (default: false)
    #[serde(rename = "fileEnabled", default)]
    pub file_enabled: bool,
    /// Path for the log file (default: None, uses pipe_source.log)
    #[serde(rename = "filePath", default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Use JSON format for logs (default: false)
    #[serde(rename = "jsonFormat", default)]
    pub json_format: bool,
    /// Default log level filter (default: "info")
    #[serde(rename = "defaultLevel", default = "default_level")]
    pub default_level: String,
}

fn default_console_enabled() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_enabled: false,
            file_path: None,
            json_format: false,
            default_level: default_level(),
        }
    }
}

/// Initialize the logging system with the given configuration
///
/// Returns a guard that must be kept alive for as long as file logging
/// should be flushed. Fails if a global subscriber is already installed,
/// which is normal when the host set up its own.
///
/// # Environment Variables
///
/// - `PIPE_SOURCE_LOG`: Set log level filter (e.g., "debug", "info,pipe_source=debug")
/// - `PIPE_SOURCE_LOG_FORMAT`: Set to "json" for JSON output
pub fn init_logging(
    config: &LogConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    // PIPE_SOURCE_LOG first, then RUST_LOG, then the configured level
    let env_filter = EnvFilter::try_from_env("PIPE_SOURCE_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let use_json = std::env::var("PIPE_SOURCE_LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(config.json_format);

    let mut file_guard: Option<WorkerGuard> = None;

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.file_enabled {
        let log_path = config
            .file_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("pipe_source.log"));
        let file = std::fs::File::create(&log_path)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        if config.console_enabled {
            let console_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .compact();

            subscriber.with(file_layer).with(console_layer).try_init()?;
        } else {
            subscriber.with(file_layer).try_init()?;
        }
    } else if config.console_enabled {
        if use_json {
            let json_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            subscriber.with(json_layer).try_init()?;
        } else {
            let console_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .compact();

            subscriber.with(console_layer).try_init()?;
        }
    } else {
        subscriber.try_init()?;
    }

    tracing::info!(
        target: "pipe_source",
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(file_guard)
}

pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(config.console_enabled);
        assert!(!config.file_enabled);
        assert!(!config.json_format);
        assert_eq!(config.default_level, "info");
    }
}
