//! Integration config administration.

use crate::contracts::check_http_url;
use crate::{CoordinatorError, CoordinatorResult, VerifyConfig};
use reporter_bus::ProducingChannel;
use reporter_database::{ConfigStore, IntegrationConfig, NewIntegrationConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Input for [`IntegrationService::create`].
#[derive(Clone, Serialize, Deserialize)]
pub struct NewIntegration {
    pub url: String,
    pub token: String,
    pub project: String,
    /// Defaults to a fresh UUID.
    #[serde(default)]
    pub update_rev: Option<String>,
}

impl fmt::Debug for NewIntegration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewIntegration")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("project", &self.project)
            .field("update_rev", &self.update_rev)
            .finish()
    }
}

/// Input for [`IntegrationService::update`].
#[derive(Clone, Serialize, Deserialize)]
pub struct IntegrationUpdate {
    pub url: String,
    pub token: String,
    pub project: String,
    pub update_rev: String,
}

impl fmt::Debug for IntegrationUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationUpdate")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("project", &self.project)
            .field("update_rev", &self.update_rev)
            .finish()
    }
}

/// Config CRUD. Every write queues a `VerifyConfig` for the written revision.
pub struct IntegrationService {
    configs: Arc<dyn ConfigStore>,
    verify: Arc<ProducingChannel>,
}

impl IntegrationService {
    pub fn new(configs: Arc<dyn ConfigStore>, verify: Arc<ProducingChannel>) -> Self {
        Self { configs, verify }
    }

    pub async fn create(&self, input: NewIntegration) -> CoordinatorResult<IntegrationConfig> {
        check_connection(&input.url, &input.token, &input.project)?;
        let update_rev = match input.update_rev {
            Some(rev) if !rev.is_empty() => rev,
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let config = self
            .configs
            .insert(NewIntegrationConfig {
                update_rev,
                url: input.url,
                token: input.token,
                project: input.project,
            })
            .await?;
        info!(config_id = %config.id, update_rev = %config.update_rev, "Integration created");

        self.request_verification(&config).await?;
        Ok(config)
    }

    pub async fn get(&self, id: &str) -> CoordinatorResult<IntegrationConfig> {
        Ok(self.configs.get(id).await?)
    }

    pub async fn list(&self) -> CoordinatorResult<Vec<IntegrationConfig>> {
        Ok(self.configs.list().await?)
    }

    /// Overwrite the connection fields. The cached project id survives only
    /// if url, token and project are all unchanged.
    pub async fn update(
        &self,
        id: &str,
        input: IntegrationUpdate,
    ) -> CoordinatorResult<(IntegrationConfig, IntegrationConfig)> {
        check_connection(&input.url, &input.token, &input.project)?;
        if input.update_rev.is_empty() {
            return Err(CoordinatorError::InvalidInput(
                "update_rev must not be empty".to_string(),
            ));
        }

        let current = self.configs.get(id).await?;
        let mut next = current.clone();
        next.url = input.url;
        next.token = input.token;
        next.project = input.project;
        next.update_rev = input.update_rev;
        if current.connection_changed(&next) {
            next.project_id = None;
        }

        let (old, new) = self.configs.update(next).await?;
        info!(
            config_id = %new.id,
            old_rev = %old.update_rev,
            update_rev = %new.update_rev,
            revalidate = new.project_id.is_none(),
            "Integration updated"
        );

        self.request_verification(&new).await?;
        Ok((old, new))
    }

    pub async fn delete(&self, id: &str) -> CoordinatorResult<()> {
        self.configs.delete(id).await?;
        info!(config_id = %id, "Integration deleted");
        Ok(())
    }

    async fn request_verification(&self, config: &IntegrationConfig) -> CoordinatorResult<()> {
        self.verify
            .produce(&VerifyConfig {
                config_id: config.id.clone(),
                update_rev: config.update_rev.clone(),
            })
            .await?;
        Ok(())
    }
}

fn check_connection(url: &str, token: &str, project: &str) -> CoordinatorResult<()> {
    check_http_url("url", url).map_err(CoordinatorError::InvalidInput)?;
    if token.trim().is_empty() {
        return Err(CoordinatorError::InvalidInput("token must not be empty".to_string()));
    }
    if project.is_empty() {
        return Err(CoordinatorError::InvalidInput("project must not be empty".to_string()));
    }
    Ok(())
}
