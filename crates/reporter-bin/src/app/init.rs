//! Shared startup steps.

use anyhow::Context;
use reporter_bus::{Broker, MemoryBroker, RedisBroker, RedisBrokerConfig, RetryPolicy};
use reporter_config_and_utils::{BrokerKind, Config, MessageQueueSettings};
use reporter_coordinators::ChannelTopology;
use reporter_database::AsyncDatabase;
use std::sync::Arc;
use tracing::{info, warn};

/// Connect the configured broker and make sure it answers.
pub(crate) async fn connect_broker(settings: &MessageQueueSettings) -> anyhow::Result<Arc<dyn Broker>> {
    let broker: Arc<dyn Broker> = match settings.broker {
        BrokerKind::Redis => {
            let redis = RedisBroker::connect(RedisBrokerConfig {
                url: settings.url.clone(),
                consumer_group: settings.consumer_group.clone(),
                consumer_name: settings.consumer_name.clone(),
                block_timeout_ms: settings.block_timeout_ms,
            })
            .await
            .with_context(|| format!("failed to connect to broker at {}", settings.url))?;
            Arc::new(redis)
        }
        BrokerKind::Memory => {
            warn!("Using the in-memory broker; queues live only as long as this process");
            Arc::new(MemoryBroker::new())
        }
    };

    broker.ping().await.context("broker did not answer ping")?;
    info!(broker = settings.broker.as_str(), "Broker connected");
    Ok(broker)
}

pub(crate) fn retry_policy(settings: &MessageQueueSettings) -> RetryPolicy {
    RetryPolicy::from_millis(settings.retry_initial_delay_ms, settings.retry_max_delay_ms)
}

pub(crate) fn topology(settings: &MessageQueueSettings) -> ChannelTopology {
    ChannelTopology {
        inbound: settings.queues.youtrack_reporter.clone(),
        internal: settings.queues.youtrack_reporter_internal.clone(),
        api_gateway: settings.queues.api_gateway.clone(),
        dlq: settings.queues.dlq.clone(),
    }
}

pub(crate) async fn open_database(config: &Config) -> anyhow::Result<AsyncDatabase> {
    let db = AsyncDatabase::open(&config.database.path)
        .await
        .with_context(|| format!("failed to open database {}", config.database.path.display()))?;
    db.health_check().await.context("database health check failed")?;
    info!(path = %config.database.path.display(), "Database ready");
    Ok(db)
}
