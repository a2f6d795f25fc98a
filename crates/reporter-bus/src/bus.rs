//! Channel registry and lifecycle.

use crate::{Broker, ConsumingChannel, Envelope, ProducingChannel, RetryPolicy};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

/// How long flushers get to finish an in-flight publish after being stopped.
const FLUSHER_STOP_GRACE: Duration = Duration::from_secs(2);

/// Unsent envelopes grouped by queue, each group in send order.
pub type UnsentEnvelopes = BTreeMap<String, Vec<Envelope>>;

/// Owns every channel of the process and the tasks that drive them.
pub struct MessageBus {
    broker: Arc<dyn Broker>,
    retry: RetryPolicy,
    producers: BTreeMap<String, Arc<ProducingChannel>>,
    consumers: Vec<Arc<ConsumingChannel>>,
    stop_consumers: watch::Sender<bool>,
    stop_producers: watch::Sender<bool>,
    consumer_tasks: Vec<(String, JoinHandle<()>)>,
    producer_tasks: Vec<(String, JoinHandle<()>)>,
}

impl MessageBus {
    pub fn new(broker: Arc<dyn Broker>, retry: RetryPolicy) -> Self {
        Self {
            broker,
            retry,
            producers: BTreeMap::new(),
            consumers: Vec::new(),
            stop_consumers: watch::channel(false).0,
            stop_producers: watch::channel(false).0,
            consumer_tasks: Vec::new(),
            producer_tasks: Vec::new(),
        }
    }

    pub fn broker(&self) -> Arc<dyn Broker> {
        self.broker.clone()
    }

    /// Producing channel for `queue`, created on first use.
    pub fn producing_channel(&mut self, queue: &str) -> Arc<ProducingChannel> {
        self.producers
            .entry(queue.to_string())
            .or_insert_with(|| {
                Arc::new(ProducingChannel::new(
                    queue,
                    self.broker.clone(),
                    self.retry,
                ))
            })
            .clone()
    }

    /// A consuming channel for `queue`, to be filled and handed back via
    /// [`MessageBus::add_consuming_channel`].
    pub fn consuming_channel(&self, queue: &str) -> ConsumingChannel {
        ConsumingChannel::new(queue, self.broker.clone())
    }

    pub fn add_consuming_channel(&mut self, channel: ConsumingChannel) {
        self.consumers.push(Arc::new(channel));
    }

    pub fn producer_queues(&self) -> Vec<String> {
        self.producers.keys().cloned().collect()
    }

    pub fn is_running(&self) -> bool {
        !self.consumer_tasks.is_empty() || !self.producer_tasks.is_empty()
    }

    /// Spawn one flusher per producing channel and one loop per consuming channel.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Message bus already started");
            return;
        }
        self.stop_consumers.send_replace(false);
        self.stop_producers.send_replace(false);

        for (queue, producer) in &self.producers {
            let task = tokio::spawn(producer.clone().run(self.stop_producers.subscribe()));
            self.producer_tasks.push((queue.clone(), task));
        }

        for consumer in &self.consumers {
            let task = tokio::spawn(consumer.clone().run(self.stop_consumers.subscribe()));
            self.consumer_tasks.push((consumer.queue().to_string(), task));
        }

        info!(
            producers = self.producer_tasks.len(),
            consumers = self.consumer_tasks.len(),
            "Message bus started"
        );
    }

    /// Stop consuming, give producers the rest of `timeout` to drain, then stop them.
    ///
    /// Consumers that do not finish their current delivery in time are
    /// aborted; their delivery stays pending at the broker. Whatever the
    /// producers could not publish remains available to
    /// [`MessageBus::export_unsent`].
    pub async fn shutdown(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        info!(timeout_secs = timeout.as_secs(), "Message bus shutting down");

        self.stop_consumers.send_replace(true);
        for (queue, mut task) in self.consumer_tasks.drain(..) {
            if timeout_at(deadline, &mut task).await.is_err() {
                warn!(queue = %queue, "Consumer did not stop in time, aborting");
                task.abort();
            }
        }

        for producer in self.producers.values() {
            if !producer.wait_drained(deadline).await {
                warn!(
                    queue = %producer.queue(),
                    pending = producer.pending_count().await,
                    "Producer not drained before shutdown timeout"
                );
            }
        }

        self.stop_producers.send_replace(true);
        let grace = Instant::now() + FLUSHER_STOP_GRACE;
        for (queue, mut task) in self.producer_tasks.drain(..) {
            if timeout_at(grace, &mut task).await.is_err() {
                warn!(queue = %queue, "Producer did not stop in time, aborting");
                task.abort();
            }
        }

        info!("Message bus stopped");
    }

    /// Take every envelope not yet accepted by the broker, grouped by queue.
    /// Queues with nothing pending are left out.
    pub async fn export_unsent(&self) -> UnsentEnvelopes {
        let mut unsent = UnsentEnvelopes::new();
        for (queue, producer) in &self.producers {
            let envelopes = producer.export_unsent().await;
            if !envelopes.is_empty() {
                unsent.insert(queue.clone(), envelopes);
            }
        }
        unsent
    }

    /// Re-queue exported envelopes ahead of anything sent since. Unknown
    /// queues get a producing channel. Returns the number of envelopes imported.
    pub async fn import_unsent(&mut self, unsent: UnsentEnvelopes) -> usize {
        let mut imported = 0;
        for (queue, envelopes) in unsent {
            if !self.producers.contains_key(&queue) {
                info!(queue = %queue, "Creating producing channel for restored envelopes");
            }
            imported += envelopes.len();
            self.producing_channel(&queue).import_unsent(envelopes).await;
        }
        imported
    }
}
