//! Logging initialization for the reporter.
//!
//! Thin mapping from [`Config`] onto the observability crate.

use crate::{Config, CoreResult};

/// Service name stamped on startup log lines.
pub const SERVICE_NAME: &str = "youtrack-reporter";

/// Initialize the logging system.
///
/// `RUST_LOG` still wins over `config.log_level` when set.
pub fn init_logging(config: &Config) -> CoreResult<()> {
    observability::init_with_config(observability::LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: config.log_level.clone(),
        log_path: config.log_file.clone(),
        also_stderr: true,
        json_stderr: config.log_json,
    })?;
    Ok(())
}
