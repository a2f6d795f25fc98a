//! Duplicate crash workflow: keep the issue's duplicate counter current.

use crate::description::rewrite_duplicates;
use crate::{DuplicateCrashFound, ReportUndelivered};
use async_trait::async_trait;
use reporter_bus::{ConsumeError, Consumer, ProducingChannel};
use reporter_database::{ConfigStore, IssueStore};
use std::sync::Arc;
use tracing::{info, warn};
use youtrack_client::{Issue, TrackerClient, TrackerResult};

/// Rewrites the duplicate counter of the issue filed for a crash.
///
/// A duplicate that arrives before its crash was ingested is reported as
/// undelivered; it is not held back for later.
pub struct DuplicateCoordinator {
    configs: Arc<dyn ConfigStore>,
    issues: Arc<dyn IssueStore>,
    tracker: Arc<dyn TrackerClient>,
    undelivered: Arc<ProducingChannel>,
}

impl DuplicateCoordinator {
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        issues: Arc<dyn IssueStore>,
        tracker: Arc<dyn TrackerClient>,
        undelivered: Arc<ProducingChannel>,
    ) -> Self {
        Self {
            configs,
            issues,
            tracker,
            undelivered,
        }
    }

    async fn report_undelivered(&self, config_id: &str, error: String) -> Result<(), ConsumeError> {
        self.undelivered
            .produce(&ReportUndelivered::new(config_id, error))
            .await
            .map_err(ConsumeError::failed)
    }

    async fn update_counter(
        &self,
        config: &reporter_database::IntegrationConfig,
        issue: &Issue,
        count: u64,
    ) -> TrackerResult<()> {
        let description = self.tracker.get_issue_description(config, issue).await?;
        let rewritten = rewrite_duplicates(&description, count);
        self.tracker.update_issue(config, issue, &rewritten).await
    }
}

#[async_trait]
impl Consumer for DuplicateCoordinator {
    type Message = DuplicateCrashFound;

    async fn consume(&self, msg: DuplicateCrashFound) -> Result<(), ConsumeError> {
        let config = match self.configs.get(&msg.config_id).await {
            Ok(config) => config,
            Err(e) if e.is_not_found() => {
                warn!(config_id = %msg.config_id, crash_id = %msg.crash_id, "No integration config for duplicate");
                return self.report_undelivered(&msg.config_id, e.to_string()).await;
            }
            Err(e) => return Err(ConsumeError::failed(e)),
        };

        let issue = match self.issues.get_issue(&msg.crash_id).await {
            Ok(issue_id) => Issue::new(issue_id),
            Err(e) if e.is_not_found() => {
                warn!(crash_id = %msg.crash_id, "Duplicate for a crash without an issue");
                return self.report_undelivered(&msg.config_id, e.to_string()).await;
            }
            Err(e) => return Err(ConsumeError::failed(e)),
        };

        match self.update_counter(&config, &issue, msg.duplicate_count).await {
            Ok(()) => {
                info!(
                    crash_id = %msg.crash_id,
                    issue_id = %issue.id,
                    duplicates = msg.duplicate_count,
                    "Duplicate counter updated"
                );
                Ok(())
            }
            Err(e) => {
                warn!(crash_id = %msg.crash_id, issue_id = %issue.id, error = %e, "Duplicate counter update failed");
                self.report_undelivered(&msg.config_id, e.to_string()).await
            }
        }
    }
}
