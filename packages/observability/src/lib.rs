//! # Observability
//!
//! Logging bootstrap for the youtrack-reporter services.
//!
//! Services call [`init_with_config`] once at startup and then use the
//! standard `tracing` macros. Output goes to stderr (compact or JSON) and,
//! optionally, to an append-only JSONL file that external tools can tail.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "youtrack-reporter".into(),
//!     default_level: "debug".into(),
//!     ..Default::default()
//! })?;
//! tracing::info!("ready");
//! ```

mod file_writer;

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub use file_writer::LogFileWriter;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written once at startup and used in the file name default.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional JSONL log file.
    pub log_path: Option<PathBuf>,

    /// Emit logs to stderr.
    pub also_stderr: bool,

    /// Render stderr output as JSON instead of the compact human format.
    pub json_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
            json_stderr: false,
        }
    }
}

/// Build the env filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Initialize the logging layer.
///
/// Returns an error if the log file cannot be opened. Calling this more than
/// once is harmless: the second global subscriber is silently refused.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if let Some(path) = &config.log_path {
        let writer = LogFileWriter::open(path)?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .with_writer(writer)
                .with_filter(env_filter(&config.default_level))
                .boxed(),
        );
    }

    if config.also_stderr {
        let layer = if config.json_stderr {
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_writer(io::stderr)
                .with_filter(env_filter(&config.default_level))
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_writer(io::stderr)
                .with_filter(env_filter(&config.default_level))
                .boxed()
        };
        layers.push(layer);
    }

    if tracing_subscriber::registry().with(layers).try_init().is_ok() {
        tracing::info!(
            service = %config.service_name,
            log_path = ?config.log_path,
            "observability initialized"
        );
    }

    Ok(())
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(config.also_stderr);
        assert!(!config.json_stderr);
    }

    #[test]
    fn test_init_reports_unwritable_log_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let result = init_with_config(LogConfig {
            service_name: "test".into(),
            log_path: Some(blocker.join("log.jsonl")),
            also_stderr: false,
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
