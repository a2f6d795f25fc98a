//! Store traits consumed by the coordinators, and their SQLite implementation.
//!
//! Coordinators only see these traits, so another backend can be swapped in
//! without touching workflow code. Absence and insert collisions surface as
//! [`DatabaseError::NotFound`] and [`DatabaseError::AlreadyExists`]; every
//! other variant is a generic store failure.

use crate::{
    queries, AsyncDatabase, DatabaseError, DatabaseResult, IntegrationConfig,
    NewIntegrationConfig, PendingMessageRow, UnsentMessage, UnsentMessages,
};
use async_trait::async_trait;
use tracing::info;

/// Integration config collection.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch a config. Missing ids are `NotFound`.
    async fn get(&self, id: &str) -> DatabaseResult<IntegrationConfig>;

    /// Insert a config and return it with its assigned id.
    async fn insert(&self, config: NewIntegrationConfig) -> DatabaseResult<IntegrationConfig>;

    /// Overwrite a config, returning `(old, new)`. Missing ids are `NotFound`.
    async fn update(
        &self,
        config: IntegrationConfig,
    ) -> DatabaseResult<(IntegrationConfig, IntegrationConfig)>;

    /// Record the tracker project id resolved for revision `update_rev`.
    /// Returns false, writing nothing, if the config moved past that revision.
    async fn set_project_id(
        &self,
        id: &str,
        update_rev: &str,
        project_id: Option<&str>,
    ) -> DatabaseResult<bool>;

    /// Delete a config. Missing ids are `NotFound`.
    async fn delete(&self, id: &str) -> DatabaseResult<()>;

    async fn list(&self) -> DatabaseResult<Vec<IntegrationConfig>>;
}

/// Crash id to issue id mappings.
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Issue id filed for `crash_id`. Missing mappings are `NotFound`.
    async fn get_issue(&self, crash_id: &str) -> DatabaseResult<String>;

    /// Record a mapping. A second insert for the same crash is `AlreadyExists`.
    async fn insert_issue(&self, crash_id: &str, issue_id: &str) -> DatabaseResult<()>;
}

/// Persisted copy of produced-but-unacknowledged messages.
#[async_trait]
pub trait UnsentMessageStore: Send + Sync {
    /// Replace the whole persisted set. Returns the number of messages written.
    async fn save_unsent_messages(&self, messages: &UnsentMessages) -> DatabaseResult<usize>;

    /// Load the persisted set, grouped by queue in original order.
    async fn load_unsent_messages(&self) -> DatabaseResult<UnsentMessages>;
}

#[async_trait]
impl ConfigStore for AsyncDatabase {
    async fn get(&self, id: &str) -> DatabaseResult<IntegrationConfig> {
        let id = id.to_string();
        self.call(move |conn| {
            queries::get_config(conn, &id)?.ok_or_else(|| DatabaseError::NotFound(format!("config {id}")))
        })
        .await
    }

    async fn insert(&self, config: NewIntegrationConfig) -> DatabaseResult<IntegrationConfig> {
        self.call(move |conn| queries::insert_config(conn, &config)).await
    }

    async fn update(
        &self,
        config: IntegrationConfig,
    ) -> DatabaseResult<(IntegrationConfig, IntegrationConfig)> {
        self.call(move |conn| queries::update_config(conn, &config)).await
    }

    async fn set_project_id(
        &self,
        id: &str,
        update_rev: &str,
        project_id: Option<&str>,
    ) -> DatabaseResult<bool> {
        let id = id.to_string();
        let update_rev = update_rev.to_string();
        let project_id = project_id.map(str::to_string);
        self.call(move |conn| {
            queries::set_project_id(conn, &id, &update_rev, project_id.as_deref())
        })
        .await
    }

    async fn delete(&self, id: &str) -> DatabaseResult<()> {
        let id = id.to_string();
        self.call(move |conn| {
            if queries::delete_config(conn, &id)? {
                Ok(())
            } else {
                Err(DatabaseError::NotFound(format!("config {id}")))
            }
        })
        .await
    }

    async fn list(&self) -> DatabaseResult<Vec<IntegrationConfig>> {
        self.call(queries::list_configs).await
    }
}

#[async_trait]
impl IssueStore for AsyncDatabase {
    async fn get_issue(&self, crash_id: &str) -> DatabaseResult<String> {
        let crash_id = crash_id.to_string();
        self.call(move |conn| {
            queries::get_crash_issue(conn, &crash_id)?
                .map(|issue| issue.issue_id)
                .ok_or_else(|| DatabaseError::NotFound(format!("issue for crash {crash_id}")))
        })
        .await
    }

    async fn insert_issue(&self, crash_id: &str, issue_id: &str) -> DatabaseResult<()> {
        let crash_id = crash_id.to_string();
        let issue_id = issue_id.to_string();
        self.call(move |conn| queries::insert_crash_issue(conn, &crash_id, &issue_id))
            .await
    }
}

#[async_trait]
impl UnsentMessageStore for AsyncDatabase {
    async fn save_unsent_messages(&self, messages: &UnsentMessages) -> DatabaseResult<usize> {
        // Serialize outside the executor thread.
        let mut rows = Vec::new();
        for (queue, group) in messages {
            for (position, message) in group.iter().enumerate() {
                rows.push(PendingMessageRow {
                    queue: queue.clone(),
                    position: position as i64,
                    name: message.name.clone(),
                    body: serde_json::to_string(&message.body)?,
                });
            }
        }

        let written = self
            .call(move |conn| queries::replace_unsent_messages(conn, &rows))
            .await?;
        info!(count = written, queues = messages.len(), "Saved unsent messages");
        Ok(written)
    }

    async fn load_unsent_messages(&self) -> DatabaseResult<UnsentMessages> {
        let rows = self.call(queries::load_unsent_messages).await?;

        let mut messages = UnsentMessages::new();
        for row in rows {
            let body = serde_json::from_str(&row.body).map_err(|e| {
                DatabaseError::InvalidData(format!(
                    "unsent message {}#{} has a malformed body: {e}",
                    row.queue, row.position
                ))
            })?;
            messages.entry(row.queue).or_default().push(UnsentMessage {
                name: row.name,
                body,
            });
        }

        let count: usize = messages.values().map(Vec::len).sum();
        info!(count, queues = messages.len(), "Loaded unsent messages");
        Ok(messages)
    }
}
