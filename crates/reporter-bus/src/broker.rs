//! Broker abstraction the channels are built on.

use crate::{BusResult, Envelope};
use async_trait::async_trait;

/// One envelope handed out by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Broker-assigned id used to acknowledge the delivery.
    pub id: String,
    pub envelope: Envelope,
}

/// A message broker with named queues.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Round-trip to the broker.
    async fn ping(&self) -> BusResult<()>;

    /// Append an envelope to `queue`. Returns once the broker accepted it.
    async fn publish(&self, queue: &str, envelope: &Envelope) -> BusResult<()>;

    /// Start reading `queue`. Deliveries left unacknowledged by an earlier
    /// subscription of this consumer are handed out again first.
    async fn subscribe(&self, queue: &str) -> BusResult<Box<dyn Subscription>>;
}

/// A reader over one queue.
#[async_trait]
pub trait Subscription: Send {
    fn queue(&self) -> &str;

    /// Wait for the next delivery. `None` means the wait timed out.
    async fn next(&mut self) -> BusResult<Option<Delivery>>;

    /// Acknowledge a delivery so it is never handed out again.
    async fn ack(&mut self, delivery_id: &str) -> BusResult<()>;

    /// Re-establish the connection after an error.
    async fn reconnect(&mut self) -> BusResult<()> {
        Ok(())
    }
}
