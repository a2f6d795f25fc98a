//! Unique crash ingestion: one tracker issue per crash.

use crate::description::{render_description, summary};
use crate::{ReportUndelivered, UniqueCrashFound};
use async_trait::async_trait;
use reporter_bus::{ConsumeError, Consumer, ProducingChannel};
use reporter_database::{ConfigStore, IssueStore};
use std::sync::Arc;
use tracing::{debug, info, warn};
use youtrack_client::TrackerClient;

/// Files an issue for each new crash and records the crash to issue mapping.
///
/// The mapping is written only after the tracker created the issue, so a
/// redelivered message either finds the mapping and stops, or retries the
/// creation.
pub struct CrashIngestCoordinator {
    configs: Arc<dyn ConfigStore>,
    issues: Arc<dyn IssueStore>,
    tracker: Arc<dyn TrackerClient>,
    undelivered: Arc<ProducingChannel>,
}

impl CrashIngestCoordinator {
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
}

#[async_trait]
impl Consumer for CrashIngestCoordinator {
    type Message = UniqueCrashFound;

    async fn consume(&self, msg: UniqueCrashFound) -> Result<(), ConsumeError> {
        let config = match self.configs.get(&msg.config_id).await {
            Ok(config) => config,
            Err(e) if e.is_not_found() => {
                warn!(config_id = %msg.config_id, crash_id = %msg.crash_id, "No integration config for crash");
                return self.report_undelivered(&msg.config_id, e.to_string()).await;
            }
            Err(e) => return Err(ConsumeError::failed(e)),
        };

        match self.issues.get_issue(&msg.crash_id).await {
            Ok(issue_id) => {
                info!(crash_id = %msg.crash_id, issue_id = %issue_id, "Crash already has an issue");
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ConsumeError::failed(e)),
        }

        debug!(
            config_id = %msg.config_id,
            crash_id = %msg.crash_id,
            crash_type = %msg.crash_type,
            project = %msg.project_name,
            fuzzer = %msg.fuzzer_name,
            revision = %msg.revision_name,
            "Filing issue for crash"
        );

        let issue = match self
            .tracker
            .create_issue(&config, &summary(&msg.crash_info), &render_description(&msg))
            .await
        {
            Ok(issue) => issue,
            Err(e) => {
                warn!(config_id = %msg.config_id, crash_id = %msg.crash_id, error = %e, "Issue creation failed");
                return self.report_undelivered(&msg.config_id, e.to_string()).await;
            }
        };

        match self.issues.insert_issue(&msg.crash_id, &issue.id).await {
            Ok(()) => {
                info!(crash_id = %msg.crash_id, issue_id = %issue.id, "Issue filed");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                info!(crash_id = %msg.crash_id, issue_id = %issue.id, "Crash mapped concurrently, keeping first mapping");
                Ok(())
            }
            Err(e) => Err(ConsumeError::failed(e)),
        }
    }
}
