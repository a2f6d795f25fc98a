//! Wire contracts exchanged over the bus.

use reporter_bus::Message;
use serde::{Deserialize, Serialize};

const LABEL_MAX: usize = 255;
const CRASH_INFO_MAX: usize = 1000;
const CRASH_OUTPUT_MAX: usize = 28000;

/// Request to validate a config's tracker credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    pub config_id: String,
    /// Revision of the config the request was issued against.
    pub update_rev: String,
}

impl Message for VerifyConfig {
    const NAME: &'static str = "youtrack-reporter.internal.verify";

    fn validate(&self) -> Result<(), String> {
        check_not_empty("config_id", &self.config_id)?;
        check_not_empty("update_rev", &self.update_rev)
    }
}

/// Outcome of a credential check. `error` is `None` on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationResult {
    pub config_id: String,
    pub update_rev: String,
    pub error: Option<String>,
}

impl IntegrationResult {
    pub fn ok(config_id: impl Into<String>, update_rev: impl Into<String>) -> Self {
        Self {
            config_id: config_id.into(),
            update_rev: update_rev.into(),
            error: None,
        }
    }

    pub fn failed(
        config_id: impl Into<String>,
        update_rev: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            config_id: config_id.into(),
            update_rev: update_rev.into(),
            error: Some(error.into()),
        }
    }
}

impl Message for IntegrationResult {
    const NAME: &'static str = "youtrack-reporter.integrations.result";
}

/// A crash seen for the first time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueCrashFound {
    pub config_id: String,
    pub crash_id: String,
    /// Short description, also used as the issue summary.
    pub crash_info: String,
    /// crash, oom, timeout, leak...
    pub crash_type: String,
    pub crash_output: String,
    pub crash_url: String,
    pub project_name: String,
    pub fuzzer_name: String,
    pub revision_name: String,
}

impl Message for UniqueCrashFound {
    const NAME: &'static str = "youtrack-reporter.crashes.unique";

    fn validate(&self) -> Result<(), String> {
        check_not_empty("config_id", &self.config_id)?;
        check_not_empty("crash_id", &self.crash_id)?;
        check_length("crash_info", &self.crash_info, CRASH_INFO_MAX)?;
        check_length("crash_type", &self.crash_type, LABEL_MAX)?;
        check_length("crash_output", &self.crash_output, CRASH_OUTPUT_MAX)?;
        check_http_url("crash_url", &self.crash_url)?;
        check_length("project_name", &self.project_name, LABEL_MAX)?;
        check_length("fuzzer_name", &self.fuzzer_name, LABEL_MAX)?;
        check_length("revision_name", &self.revision_name, LABEL_MAX)
    }
}

/// Another occurrence of an already reported crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCrashFound {
    pub config_id: String,
    pub crash_id: String,
    /// Occurrences seen so far, at least.
    pub duplicate_count: u64,
}

impl Message for DuplicateCrashFound {
    const NAME: &'static str = "youtrack-reporter.crashes.duplicate";

    fn validate(&self) -> Result<(), String> {
        check_not_empty("config_id", &self.config_id)?;
        check_not_empty("crash_id", &self.crash_id)
    }
}

/// A crash report could not be delivered to the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportUndelivered {
    pub config_id: String,
    pub error: String,
}

impl ReportUndelivered {
    pub fn new(config_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            config_id: config_id.into(),
            error: error.into(),
        }
    }
}

impl Message for ReportUndelivered {
    const NAME: &'static str = "youtrack-reporter.reports.undelivered";
}

fn check_not_empty(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    Ok(())
}

fn check_length(field: &str, value: &str, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len == 0 || len > max {
        return Err(format!("{field} must be 1 to {max} characters, got {len}"));
    }
    Ok(())
}

pub(crate) fn check_http_url(field: &str, value: &str) -> Result<(), String> {
    let parsed = url::Url::parse(value).map_err(|e| format!("{field} is not a URL: {e}"))?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(()),
        _ => Err(format!("{field} must be an http(s) URL")),
    }
}
