//! Configuration management for the reporter.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! environment variables. The binary applies CLI flags last.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Message broker backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    /// Redis Streams.
    Redis,
    /// In-process queues. Nothing survives a restart except what the
    /// durability buffer persists; intended for local runs and tests.
    Memory,
}

impl BrokerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }

    pub fn parse(value: &str) -> CoreResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(CoreError::Config(format!(
                "Unsupported message broker: {other}"
            ))),
        }
    }
}

/// Queue names used by the reporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueNames {
    /// Internal queue carrying verification requests (consumed and produced).
    pub youtrack_reporter_internal: String,
    /// Inbound crash notifications.
    pub youtrack_reporter: String,
    /// Outbound results for the API gateway.
    pub api_gateway: String,
    /// Dead letter queue for inbound crash notifications.
    pub dlq: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            youtrack_reporter_internal: "youtrack-reporter-internal".to_string(),
            youtrack_reporter: "youtrack-reporter".to_string(),
            api_gateway: "api-gateway".to_string(),
            dlq: "youtrack-reporter-dlq".to_string(),
        }
    }
}

impl QueueNames {
    fn all(&self) -> [&str; 4] {
        [
            &self.youtrack_reporter_internal,
            &self.youtrack_reporter,
            &self.api_gateway,
            &self.dlq,
        ]
    }
}

/// Message bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageQueueSettings {
    pub broker: BrokerKind,
    /// Broker connection URL.
    pub url: String,
    /// Consumer group shared by all reporter instances.
    pub consumer_group: String,
    /// Consumer name. Must be stable across restarts so that deliveries left
    /// pending by a crash are picked up again.
    pub consumer_name: String,
    /// Blocking read timeout in milliseconds.
    pub block_timeout_ms: u64,
    /// Initial publish retry delay in milliseconds.
    pub retry_initial_delay_ms: u64,
    /// Maximum publish retry delay in milliseconds.
    pub retry_max_delay_ms: u64,
    pub queues: QueueNames,
}

impl Default for MessageQueueSettings {
    fn default() -> Self {
        Self {
            broker: BrokerKind::Redis,
            url: DEFAULT_REDIS_URL.to_string(),
            consumer_group: "youtrack-reporter".to_string(),
            consumer_name: "youtrack-reporter-1".to_string(),
            block_timeout_ms: 5000,
            retry_initial_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            queues: QueueNames::default(),
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite database file.
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("youtrack-reporter")
        .join("reporter.db")
}

/// Issue tracker client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
        }
    }
}

/// Main reporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Optional JSONL log file.
    pub log_file: Option<PathBuf>,
    /// Emit JSON on stderr.
    pub log_json: bool,
    /// Seconds to wait for in-flight work during shutdown.
    pub shutdown_timeout_secs: u64,
    pub database: DatabaseSettings,
    pub message_queue: MessageQueueSettings,
    pub tracker: TrackerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
            log_json: false,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            database: DatabaseSettings::default(),
            message_queue: MessageQueueSettings::default(),
            tracker: TrackerSettings::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> CoreResult<Self> {
        let mut config = Self::default();
        config.load_from_env()?;
        Ok(config)
    }

    /// Load configuration from an optional JSON file, then the environment.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.load_from_env()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override configuration from process environment variables.
    pub fn load_from_env(&mut self) -> CoreResult<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Override configuration from an arbitrary variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("REPORTER_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("REPORTER_LOG_FILE") {
            self.log_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("REPORTER_LOG_JSON") {
            self.log_json = parse_bool("REPORTER_LOG_JSON", &v)?;
        }
        if let Some(v) = get("SHUTDOWN_TIMEOUT") {
            self.shutdown_timeout_secs = parse_number("SHUTDOWN_TIMEOUT", &v)?;
        }
        if let Some(v) = get("DB_PATH") {
            self.database.path = PathBuf::from(v);
        }

        let mq = &mut self.message_queue;
        if let Some(v) = get("MQ_BROKER") {
            mq.broker = BrokerKind::parse(&v)?;
        }
        if let Some(v) = get("MQ_URL") {
            mq.url = v;
        }
        if let Some(v) = get("MQ_CONSUMER_GROUP") {
            mq.consumer_group = v;
        }
        if let Some(v) = get("MQ_CONSUMER_NAME") {
            mq.consumer_name = v;
        }
        if let Some(v) = get("MQ_BLOCK_MS") {
            mq.block_timeout_ms = parse_number("MQ_BLOCK_MS", &v)?;
        }
        if let Some(v) = get("MQ_RETRY_INITIAL_MS") {
            mq.retry_initial_delay_ms = parse_number("MQ_RETRY_INITIAL_MS", &v)?;
        }
        if let Some(v) = get("MQ_RETRY_MAX_MS") {
            mq.retry_max_delay_ms = parse_number("MQ_RETRY_MAX_MS", &v)?;
        }
        if let Some(v) = get("MQ_QUEUE_YOUTRACK_REPORTER_INTERNAL") {
            mq.queues.youtrack_reporter_internal = v;
        }
        if let Some(v) = get("MQ_QUEUE_YOUTRACK_REPORTER") {
            mq.queues.youtrack_reporter = v;
        }
        if let Some(v) = get("MQ_QUEUE_API_GATEWAY") {
            mq.queues.api_gateway = v;
        }
        if let Some(v) = get("MQ_QUEUE_DLQ") {
            mq.queues.dlq = v;
        }

        if let Some(v) = get("TRACKER_TIMEOUT_SECS") {
            self.tracker.request_timeout_secs = parse_number("TRACKER_TIMEOUT_SECS", &v)?;
        }

        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> CoreResult<()> {
        if self.shutdown_timeout_secs == 0 {
            return Err(CoreError::Config(
                "shutdown timeout must be greater than zero".to_string(),
            ));
        }

        if self.message_queue.broker == BrokerKind::Redis {
            let url = Url::parse(&self.message_queue.url)?;
            if !matches!(url.scheme(), "redis" | "rediss") {
                return Err(CoreError::Config(format!(
                    "unsupported broker URL scheme: {}",
                    url.scheme()
                )));
            }
        }

        let mut seen = HashSet::new();
        for name in self.message_queue.queues.all() {
            if name.trim().is_empty() {
                return Err(CoreError::Config("queue names must not be empty".to_string()));
            }
            if !seen.insert(name) {
                return Err(CoreError::Config(format!("queue name used twice: {name}")));
            }
        }

        Ok(())
    }

    /// Shutdown timeout as a Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn parse_number(key: &str, value: &str) -> CoreResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::Config(format!("{key} must be a non-negative integer, got {value:?}")))
}

fn parse_bool(key: &str, value: &str) -> CoreResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Config(format!("{key} must be a boolean, got {value:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.shutdown_timeout_secs, 30);
        assert_eq!(config.message_queue.broker, BrokerKind::Redis);
        assert_eq!(config.message_queue.queues.api_gateway, "api-gateway");
        assert!(config.database.path.ends_with("youtrack-reporter/reporter.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("REPORTER_LOG_LEVEL", "debug"),
                ("SHUTDOWN_TIMEOUT", "5"),
                ("MQ_BROKER", "memory"),
                ("MQ_QUEUE_DLQ", "dead"),
                ("DB_PATH", "/tmp/r.db"),
                ("REPORTER_LOG_JSON", "yes"),
            ]))
            .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.message_queue.broker, BrokerKind::Memory);
        assert_eq!(config.message_queue.queues.dlq, "dead");
        assert_eq!(config.database.path, PathBuf::from("/tmp/r.db"));
        assert!(config.log_json);
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("MQ_BROKER", "sqs")])).is_err());
        assert!(config.apply_env(env(&[("MQ_BLOCK_MS", "soon")])).is_err());
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("MQ_URL", "  ")])).unwrap();
        assert_eq!(config.message_queue.url, DEFAULT_REDIS_URL);
    }

    #[test]
    fn test_validate_rejects_duplicate_queues() {
        let mut config = Config::default();
        config.message_queue.queues.dlq = config.message_queue.queues.api_gateway.clone();
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_shutdown_timeout() {
        let mut config = Config::default();
        config.shutdown_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_redis_url() {
        let mut config = Config::default();
        config.message_queue.url = "http://localhost:6379".to_string();
        assert!(config.validate().is_err());

        config.message_queue.broker = BrokerKind::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_keeps_defaults_for_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reporter.json");
        std::fs::write(
            &path,
            r#"{"log_level":"warn","message_queue":{"queues":{"api_gateway":"gw"}}}"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.message_queue.queues.api_gateway, "gw");
        assert_eq!(config.message_queue.queues.dlq, "youtrack-reporter-dlq");
        assert_eq!(config.message_queue.block_timeout_ms, 5000);
    }
}
