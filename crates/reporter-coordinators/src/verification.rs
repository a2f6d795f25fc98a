//! Credential verification workflow.

use crate::{IntegrationResult, VerifyConfig};
use async_trait::async_trait;
use reporter_bus::{ConsumeError, Consumer, ProducingChannel};
use reporter_database::ConfigStore;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use youtrack_client::TrackerClient;

/// Validates a config's tracker credentials and reports the outcome.
///
/// Only the request carrying the config's current `update_rev` produces a
/// result; older requests were superseded by a later update and are dropped.
/// The resolved project id is written only if the config is still at that
/// revision when validation returns, so a slow validation never reverts a
/// newer update.
pub struct VerificationCoordinator {
    configs: Arc<dyn ConfigStore>,
    tracker: Arc<dyn TrackerClient>,
    results: Arc<ProducingChannel>,
}

impl VerificationCoordinator {
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        tracker: Arc<dyn TrackerClient>,
        results: Arc<ProducingChannel>,
    ) -> Self {
        Self {
            configs,
            tracker,
            results,
        }
    }
}

#[async_trait]
impl Consumer for VerificationCoordinator {
    type Message = VerifyConfig;

    async fn consume(&self, msg: VerifyConfig) -> Result<(), ConsumeError> {
        let config = match self.configs.get(&msg.config_id).await {
            Ok(config) => config,
            Err(e) if e.is_not_found() => {
                error!(config_id = %msg.config_id, "Config to verify was not found");
                return Err(ConsumeError::Failed(format!(
                    "config {} to verify was not found",
                    msg.config_id
                )));
            }
            Err(e) => return Err(ConsumeError::failed(e)),
        };

        if config.update_rev != msg.update_rev {
            debug!(
                config_id = %msg.config_id,
                requested_rev = %msg.update_rev,
                current_rev = %config.update_rev,
                "Stale verification request dropped"
            );
            return Ok(());
        }

        let result = match self.tracker.validate_credentials(&config).await {
            Ok(validated) => {
                let stored = self
                    .configs
                    .set_project_id(&config.id, &config.update_rev, validated.project_id.as_deref())
                    .await
                    .map_err(ConsumeError::failed)?;
                if !stored {
                    debug!(
                        config_id = %config.id,
                        update_rev = %config.update_rev,
                        "Config changed during verification, result dropped"
                    );
                    return Ok(());
                }
                info!(config_id = %config.id, update_rev = %config.update_rev, "Integration verified");
                IntegrationResult::ok(&config.id, &config.update_rev)
            }
            Err(e) => {
                warn!(
                    config_id = %config.id,
                    update_rev = %config.update_rev,
                    error = %e,
                    "Integration verification failed"
                );
                IntegrationResult::failed(&config.id, &config.update_rev, e.to_string())
            }
        };

        self.results
            .produce(&result)
            .await
            .map_err(ConsumeError::failed)
    }
}
