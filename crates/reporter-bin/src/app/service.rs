//! Service lifecycle: restore, run, drain, capture.

use super::init::{connect_broker, open_database, retry_policy, topology};
use anyhow::Context;
use reporter_bus::MessageBus;
use reporter_config_and_utils::{Config, SERVICE_NAME};
use reporter_coordinators::{register_coordinators, Collaborators};
use reporter_outbox::DurabilityBuffer;
use std::sync::Arc;
use tracing::{error, info, warn};
use youtrack_client::{YouTrackClient, YouTrackClientConfig};

/// Run the reporter until Ctrl-C or SIGTERM.
pub async fn run_service(config: Config) -> anyhow::Result<()> {
    info!(
        service = SERVICE_NAME,
        version = env!("CARGO_PKG_VERSION"),
        broker = config.message_queue.broker.as_str(),
        database = %config.database.path.display(),
        "Starting reporter"
    );

    let broker = connect_broker(&config.message_queue).await?;
    let mut bus = MessageBus::new(broker, retry_policy(&config.message_queue));
    let db = open_database(&config).await?;

    let buffer = DurabilityBuffer::new(Arc::new(db.clone()));
    let restored = buffer
        .restore(&mut bus)
        .await
        .context("failed to restore unsent messages")?;

    let tracker = YouTrackClient::new(YouTrackClientConfig {
        timeout_secs: config.tracker.request_timeout_secs,
        ..Default::default()
    })?;
    register_coordinators(
        &mut bus,
        &topology(&config.message_queue),
        Collaborators {
            configs: Arc::new(db.clone()),
            issues: Arc::new(db.clone()),
            tracker: Arc::new(tracker),
        },
    )?;

    bus.start();
    if let Err(e) = buffer.commit_restore().await {
        // The replayed rows stay stored and are dropped again by `capture`.
        warn!(error = %e, "Failed to remove restored messages from the store");
    }
    info!(restored, "Reporter running");

    wait_for_shutdown_signal().await?;
    info!("Shutdown requested");

    bus.shutdown(config.shutdown_timeout()).await;
    let persisted = buffer.capture(&bus).await;
    drop(buffer);
    drop(bus);

    let closed = db.close().await;
    let persisted = persisted.context("failed to persist unsent messages")?;
    if let Err(e) = closed {
        error!(error = %e, "Failed to close database");
    }
    info!(persisted, "Reporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")
}
