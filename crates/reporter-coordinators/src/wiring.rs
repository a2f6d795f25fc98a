//! Registration of the coordinators on a [`MessageBus`].

use crate::{CrashIngestCoordinator, DuplicateCoordinator, VerificationCoordinator};
use reporter_bus::{BusResult, MessageBus};
use reporter_database::{ConfigStore, IssueStore};
use std::sync::Arc;
use tracing::info;
use youtrack_client::TrackerClient;

/// Queue names the coordinators read from and write to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTopology {
    /// Crash events from the fuzzing pipeline.
    pub inbound: String,
    /// Verification requests, produced and consumed by this service.
    pub internal: String,
    /// Integration results and undelivered reports.
    pub api_gateway: String,
    /// Deliveries that could not be handled.
    pub dlq: String,
}

/// What the coordinators are built from.
#[derive(Clone)]
pub struct Collaborators {
    pub configs: Arc<dyn ConfigStore>,
    pub issues: Arc<dyn IssueStore>,
    pub tracker: Arc<dyn TrackerClient>,
}

/// Create the producing channels and register every coordinator on its
/// consuming channel. Both consuming channels park failures in the DLQ.
pub fn register_coordinators(
    bus: &mut MessageBus,
    topology: &ChannelTopology,
    deps: Collaborators,
) -> BusResult<()> {
    let api_gateway = bus.producing_channel(&topology.api_gateway);
    let dlq = bus.producing_channel(&topology.dlq);
    bus.producing_channel(&topology.internal);

    let mut inbound = bus.consuming_channel(&topology.inbound);
    inbound.add_consumer(CrashIngestCoordinator::new(
        deps.configs.clone(),
        deps.issues.clone(),
        deps.tracker.clone(),
        api_gateway.clone(),
    ))?;
    inbound.add_consumer(DuplicateCoordinator::new(
        deps.configs.clone(),
        deps.issues,
        deps.tracker.clone(),
        api_gateway.clone(),
    ))?;
    inbound.use_dead_letter_queue(dlq.clone());
    bus.add_consuming_channel(inbound);

    let mut internal = bus.consuming_channel(&topology.internal);
    internal.add_consumer(VerificationCoordinator::new(
        deps.configs,
        deps.tracker,
        api_gateway,
    ))?;
    internal.use_dead_letter_queue(dlq);
    bus.add_consuming_channel(internal);

    info!(
        inbound = %topology.inbound,
        internal = %topology.internal,
        api_gateway = %topology.api_gateway,
        dlq = %topology.dlq,
        "Coordinators registered"
    );
    Ok(())
}
