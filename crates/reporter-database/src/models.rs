//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tracker integration for one tenant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub id: String,
    /// Revision supplied by the caller on every write.
    pub update_rev: String,
    /// Tracker base URL.
    pub url: String,
    /// Bearer token for the tracker API.
    pub token: String,
    /// Project name as typed by the user.
    pub project: String,
    /// Tracker-internal project id, set only after credentials were validated.
    pub project_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationConfig")
            .field("id", &self.id)
            .field("update_rev", &self.update_rev)
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("project", &self.project)
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl IntegrationConfig {
    /// True when url, token or project differ, which invalidates `project_id`.
    pub fn connection_changed(&self, other: &IntegrationConfig) -> bool {
        self.url != other.url || self.token != other.token || self.project != other.project
    }
}

/// Input for inserting a new integration (id is assigned by the store).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIntegrationConfig {
    pub update_rev: String,
    pub url: String,
    pub token: String,
    pub project: String,
}

impl fmt::Debug for NewIntegrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewIntegrationConfig")
            .field("update_rev", &self.update_rev)
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("project", &self.project)
            .finish()
    }
}

/// Mapping from a crash to the issue filed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashIssue {
    pub crash_id: String,
    pub issue_id: String,
    pub created_at: DateTime<Utc>,
}

/// A produced message that was not acknowledged by the broker at shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsentMessage {
    pub name: String,
    pub body: serde_json::Value,
}

/// Unsent messages grouped by queue name, each group in send order.
pub type UnsentMessages = BTreeMap<String, Vec<UnsentMessage>>;

/// One persisted row of the unsent message table.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessageRow {
    pub queue: String,
    pub position: i64,
    pub name: String,
    pub body: String,
}
