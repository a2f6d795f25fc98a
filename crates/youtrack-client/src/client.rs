//! Tracker operations used by the coordinators.

use crate::TrackerResult;
use async_trait::async_trait;
use reporter_database::IntegrationConfig;
use serde::{Deserialize, Serialize};

/// An issue in the tracker, identified by its tracker-side id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
}

impl Issue {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Issue tracker operations.
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Check that `config` can reach its project and file issues there.
    ///
    /// Returns a copy of `config` with `project_id` resolved.
    async fn validate_credentials(&self, config: &IntegrationConfig) -> TrackerResult<IntegrationConfig>;

    /// File a new issue in the config's project.
    async fn create_issue(
        &self,
        config: &IntegrationConfig,
        summary: &str,
        description: &str,
    ) -> TrackerResult<Issue>;

    /// Replace an issue's description.
    async fn update_issue(
        &self,
        config: &IntegrationConfig,
        issue: &Issue,
        description: &str,
    ) -> TrackerResult<()>;

    /// Current description of an issue. An empty description reads as "".
    async fn get_issue_description(
        &self,
        config: &IntegrationConfig,
        issue: &Issue,
    ) -> TrackerResult<String>;
}
