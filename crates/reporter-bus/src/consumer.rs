//! Consuming channel: typed dispatch over one inbound queue.

use crate::{
    Broker, BusError, BusResult, ConsumeError, Delivery, Envelope, Message, ProducingChannel,
    Subscription,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Handler for one message type.
#[async_trait]
pub trait Consumer: Send + Sync + 'static {
    type Message: Message;

    async fn consume(&self, message: Self::Message) -> Result<(), ConsumeError>;
}

/// Type-erased consumer stored in the dispatch table.
#[async_trait]
trait Dispatch: Send + Sync {
    async fn dispatch(&self, envelope: &Envelope) -> Result<(), ConsumeError>;
}

struct Typed<C>(C);

#[async_trait]
impl<C: Consumer> Dispatch for Typed<C> {
    async fn dispatch(&self, envelope: &Envelope) -> Result<(), ConsumeError> {
        let message = envelope
            .decode::<C::Message>()
            .map_err(ConsumeError::Rejected)?;
        self.0.consume(message).await
    }
}

/// What to do with a delivery after handling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handled, or parked in the dead letter queue.
    Ack,
    /// Failed with nowhere to park it; stays pending at the broker.
    Retain,
}

/// Inbound side of one queue.
pub struct ConsumingChannel {
    queue: String,
    broker: Arc<dyn Broker>,
    consumers: HashMap<&'static str, Arc<dyn Dispatch>>,
    dead_letter: Option<Arc<ProducingChannel>>,
}

impl ConsumingChannel {
    pub fn new(queue: impl Into<String>, broker: Arc<dyn Broker>) -> Self {
        Self {
            queue: queue.into(),
            broker,
            consumers: HashMap::new(),
            dead_letter: None,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Register the handler for `C::Message`. One handler per message name.
    pub fn add_consumer<C: Consumer>(&mut self, consumer: C) -> BusResult<&mut Self> {
        let name = <C::Message as Message>::NAME;
        if self.consumers.contains_key(name) {
            return Err(BusError::DuplicateConsumer(name.to_string()));
        }
        self.consumers.insert(name, Arc::new(Typed(consumer)));
        debug!(queue = %self.queue, message = name, "Consumer registered");
        Ok(self)
    }

    /// Route failed deliveries to `dlq` instead of leaving them pending.
    pub fn use_dead_letter_queue(&mut self, dlq: Arc<ProducingChannel>) -> &mut Self {
        self.dead_letter = Some(dlq);
        self
    }

    pub fn message_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.consumers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Dispatch a delivery and decide its fate.
    pub async fn handle(&self, delivery: &Delivery) -> Disposition {
        let envelope = &delivery.envelope;
        let result = match self.consumers.get(envelope.name.as_str()) {
            Some(consumer) => consumer.dispatch(envelope).await,
            None => Err(ConsumeError::UnknownMessage(envelope.name.clone())),
        };

        let err = match result {
            Ok(()) => {
                debug!(queue = %self.queue, id = %delivery.id, name = %envelope.name, "Delivery handled");
                return Disposition::Ack;
            }
            Err(e) => e,
        };

        match &self.dead_letter {
            Some(dlq) => {
                error!(
                    queue = %self.queue,
                    id = %delivery.id,
                    name = %envelope.name,
                    dlq = %dlq.queue(),
                    error = %err,
                    "Delivery failed, moving to dead letter queue"
                );
                dlq.send(envelope.clone()).await;
                Disposition::Ack
            }
            None => {
                error!(
                    queue = %self.queue,
                    id = %delivery.id,
                    name = %envelope.name,
                    error = %err,
                    "Delivery failed, leaving it unacknowledged"
                );
                Disposition::Retain
            }
        }
    }

    /// Subscribe, retrying every [`RECONNECT_DELAY`] while the broker is
    /// unreachable. `None` once `stop` flips to true or its sender is gone.
    async fn subscribe(&self, stop: &mut watch::Receiver<bool>) -> Option<Box<dyn Subscription>> {
        loop {
            if *stop.borrow() {
                return None;
            }
            match self.broker.subscribe(&self.queue).await {
                Ok(subscription) => return Some(subscription),
                Err(e) => warn!(queue = %self.queue, error = %e, "Subscribe failed, retrying"),
            }
            tokio::select! {
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// Consume until `stop` flips to true. Deliveries are handled one at a time.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let Some(mut subscription) = self.subscribe(&mut stop).await else {
            info!(queue = %self.queue, "Consumer stopped before subscribing");
            return;
        };
        info!(queue = %self.queue, messages = ?self.message_names(), "Consumer started");

        loop {
            if *stop.borrow() {
                break;
            }

            let next = tokio::select! {
                next = subscription.next() => next,
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let delivery = match next {
                Ok(Some(delivery)) => delivery,
                Ok(None) => continue,
                Err(e) => {
                    warn!(queue = %self.queue, error = %e, "Read failed, reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        _ = stop.changed() => continue,
                    }
                    if let Err(e) = subscription.reconnect().await {
                        error!(queue = %self.queue, error = %e, "Reconnect failed");
                    }
                    continue;
                }
            };

            if self.handle(&delivery).await == Disposition::Ack {
                if let Err(e) = subscription.ack(&delivery.id).await {
                    warn!(queue = %self.queue, id = %delivery.id, error = %e, "Ack failed");
                }
            }
        }

        info!(queue = %self.queue, "Consumer stopped");
    }
}
