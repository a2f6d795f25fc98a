//! Configuration, error types and logging bootstrap for youtrack-reporter.

mod config;
mod error;
mod logging;

pub use config::{
    BrokerKind, Config, DatabaseSettings, MessageQueueSettings, QueueNames, TrackerSettings,
    DEFAULT_LOG_LEVEL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, SERVICE_NAME};
