//! One-shot integration administration.
//!
//! Runs a bus that only produces on the internal queue. Whatever the bus
//! could not publish before shutting down is appended to the durability
//! buffer, so the service sends it after its next start.

use super::init::{connect_broker, open_database, retry_policy};
use crate::{ConnectionArgs, IntegrationCommand};
use anyhow::{bail, Context};
use reporter_bus::{Broker, MemoryBroker, MessageBus};
use reporter_config_and_utils::{BrokerKind, Config};
use reporter_coordinators::{IntegrationService, IntegrationUpdate, NewIntegration};
use reporter_database::IntegrationConfig;
use reporter_outbox::DurabilityBuffer;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

const REDACTED: &str = "<redacted>";

pub async fn run_admin(config: Config, command: IntegrationCommand) -> anyhow::Result<()> {
    let db = open_database(&config).await?;
    let settings = &config.message_queue;

    let (broker, online): (Arc<dyn Broker>, bool) = match settings.broker {
        BrokerKind::Memory => (Arc::new(MemoryBroker::new()), false),
        BrokerKind::Redis => match connect_broker(settings).await {
            Ok(broker) => (broker, true),
            Err(e) => {
                warn!(error = %e, "Broker unavailable, verification requests will be queued locally");
                (Arc::new(MemoryBroker::new()), false)
            }
        },
    };

    let mut bus = MessageBus::new(broker, retry_policy(settings));
    let verify = bus.producing_channel(&settings.queues.youtrack_reporter_internal);
    if online {
        bus.start();
    }

    let service = IntegrationService::new(Arc::new(db.clone()), verify);
    let outcome = execute(&service, command).await;
    drop(service);

    if online {
        bus.shutdown(config.shutdown_timeout()).await;
    }
    let buffer = DurabilityBuffer::new(Arc::new(db.clone()));
    let unsent = bus.export_unsent().await;
    let queued = buffer.append(unsent).await;
    drop(buffer);
    drop(bus);
    db.close().await?;

    let queued = queued.context("failed to queue unsent messages")?;
    if queued > 0 {
        info!(queued, "Messages queued for the next service start");
    }

    let output = outcome?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn execute(service: &IntegrationService, command: IntegrationCommand) -> anyhow::Result<Value> {
    let output = match command {
        IntegrationCommand::Create(args) => {
            let config = service.create(new_integration(args)).await?;
            redacted(&config)?
        }
        IntegrationCommand::Show { id } => redacted(&service.get(&id).await?)?,
        IntegrationCommand::Update { id, connection } => {
            let (old, new) = service.update(&id, integration_update(connection)?).await?;
            json!({ "old": redacted(&old)?, "new": redacted(&new)? })
        }
        IntegrationCommand::Delete { id } => {
            service.delete(&id).await?;
            json!({ "deleted": id })
        }
        IntegrationCommand::List => {
            let configs = service.list().await?;
            Value::Array(configs.iter().map(redacted).collect::<Result<_, _>>()?)
        }
    };
    Ok(output)
}

fn new_integration(args: ConnectionArgs) -> NewIntegration {
    NewIntegration {
        url: args.url,
        token: args.token,
        project: args.project,
        update_rev: args.update_rev,
    }
}

fn integration_update(args: ConnectionArgs) -> anyhow::Result<IntegrationUpdate> {
    let Some(update_rev) = args.update_rev else {
        bail!("--update-rev is required when updating an integration");
    };
    Ok(IntegrationUpdate {
        url: args.url,
        token: args.token,
        project: args.project,
        update_rev,
    })
}

fn redacted(config: &IntegrationConfig) -> serde_json::Result<Value> {
    let mut value = serde_json::to_value(config)?;
    if let Some(token) = value.get_mut("token") {
        *token = Value::String(REDACTED.to_string());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reporter_bus::{Envelope, RetryPolicy};
    use reporter_coordinators::VerifyConfig;
    use reporter_database::AsyncDatabase;

    fn connection(update_rev: Option<&str>) -> ConnectionArgs {
        ConnectionArgs {
            url: "https://tracker.example".to_string(),
            token: "perm:secret".to_string(),
            project: "P".to_string(),
            update_rev: update_rev.map(str::to_string),
        }
    }

    fn offline_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.database.path = dir.path().join("reporter.db");
        config.message_queue.broker = BrokerKind::Memory;
        config
    }

    #[tokio::test]
    async fn test_output_never_contains_token() {
        let db = AsyncDatabase::open_in_memory().await.unwrap();
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        let mut bus = MessageBus::new(broker, RetryPolicy::default());
        let service = IntegrationService::new(
            Arc::new(db.clone()),
            bus.producing_channel("youtrack-reporter-internal"),
        );

        let created = execute(&service, IntegrationCommand::Create(connection(Some("r1"))))
            .await
            .unwrap();
        assert_eq!(created["token"], REDACTED);
        assert_eq!(created["update_rev"], "r1");

        let id = created["id"].as_str().unwrap().to_string();
        let listed = execute(&service, IntegrationCommand::List).await.unwrap();
        assert!(!listed.to_string().contains("perm:secret"));

        let updated = execute(
            &service,
            IntegrationCommand::Update {
                id: id.clone(),
                connection: connection(Some("r2")),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated["old"]["update_rev"], "r1");
        assert_eq!(updated["new"]["update_rev"], "r2");
        assert_eq!(updated["new"]["token"], REDACTED);
    }

    #[tokio::test]
    async fn test_update_requires_revision() {
        let db = AsyncDatabase::open_in_memory().await.unwrap();
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        let mut bus = MessageBus::new(broker, RetryPolicy::default());
        let service = IntegrationService::new(
            Arc::new(db.clone()),
            bus.producing_channel("youtrack-reporter-internal"),
        );

        let result = execute(
            &service,
            IntegrationCommand::Update {
                id: "c1".to_string(),
                connection: connection(None),
            },
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_offline_create_queues_verification_for_the_service() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(&dir);

        run_admin(config.clone(), IntegrationCommand::Create(connection(Some("r1"))))
            .await
            .unwrap();

        let db = AsyncDatabase::open(&config.database.path).await.unwrap();
        let buffer = DurabilityBuffer::new(Arc::new(db.clone()));
        let unsent = buffer.load().await.unwrap();
        let queued: &Vec<Envelope> = &unsent["youtrack-reporter-internal"];
        assert_eq!(queued.len(), 1);
        let request = queued[0].decode::<VerifyConfig>().unwrap();
        assert_eq!(request.update_rev, "r1");
    }
}
