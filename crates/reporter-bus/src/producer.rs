//! Producing channel: an ordered outbound buffer with a single flusher.
//!
//! `send` never blocks on the broker. The flusher publishes the head of the
//! buffer and removes it only after the broker accepted it, backing off
//! exponentially while the broker is unavailable.

use crate::{Broker, BusResult, Envelope, Message};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Backoff between failed publish attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_millis(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms.max(initial_ms)),
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        std::cmp::min(current * 2, self.max_delay)
    }
}

/// Buffered entry. The sequence number identifies it across concurrent
/// front insertions so the flusher pops exactly what it published.
#[derive(Debug)]
struct Pending {
    seq: u64,
    envelope: Envelope,
}

/// Outbound side of one queue.
pub struct ProducingChannel {
    queue: String,
    broker: Arc<dyn Broker>,
    retry: RetryPolicy,
    pending: Mutex<VecDeque<Pending>>,
    next_seq: AtomicU64,
    wake: Notify,
}

impl ProducingChannel {
    pub fn new(queue: impl Into<String>, broker: Arc<dyn Broker>, retry: RetryPolicy) -> Self {
        Self {
            queue: queue.into(),
            broker,
            retry,
            pending: Mutex::new(VecDeque::new()),
            next_seq: AtomicU64::new(0),
            wake: Notify::new(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Encode a typed message and buffer it.
    pub async fn produce<M: Message>(&self, message: &M) -> BusResult<()> {
        let envelope = Envelope::from_message(message)?;
        self.send(envelope).await;
        Ok(())
    }

    /// Buffer an envelope for publishing.
    pub async fn send(&self, envelope: Envelope) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let depth = {
            let mut pending = self.pending.lock().await;
            pending.push_back(Pending { seq, envelope });
            pending.len()
        };
        debug!(queue = %self.queue, depth, "Envelope buffered");
        self.wake.notify_one();
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Take every envelope the broker has not accepted yet, in send order.
    pub async fn export_unsent(&self) -> Vec<Envelope> {
        let drained: Vec<Envelope> = self
            .pending
            .lock()
            .await
            .drain(..)
            .map(|p| p.envelope)
            .collect();
        if !drained.is_empty() {
            info!(queue = %self.queue, count = drained.len(), "Exported unsent envelopes");
        }
        drained
    }

    /// Put previously exported envelopes back ahead of anything buffered since,
    /// keeping their relative order.
    pub async fn import_unsent(&self, envelopes: Vec<Envelope>) {
        if envelopes.is_empty() {
            return;
        }
        let count = envelopes.len();
        {
            let mut pending = self.pending.lock().await;
            for envelope in envelopes.into_iter().rev() {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                pending.push_front(Pending { seq, envelope });
            }
        }
        info!(queue = %self.queue, count, "Imported unsent envelopes");
        self.wake.notify_one();
    }

    /// Publish the head of the buffer.
    ///
    /// Returns `Ok(false)` when there was nothing to publish. On error the
    /// envelope stays at the head.
    pub async fn flush_once(&self) -> BusResult<bool> {
        let head = {
            let pending = self.pending.lock().await;
            match pending.front() {
                Some(p) => (p.seq, p.envelope.clone()),
                None => return Ok(false),
            }
        };
        let (seq, envelope) = head;

        self.broker.publish(&self.queue, &envelope).await?;

        let mut pending = self.pending.lock().await;
        if let Some(index) = pending.iter().position(|p| p.seq == seq) {
            pending.remove(index);
        }
        debug!(queue = %self.queue, name = %envelope.name, "Envelope published");
        Ok(true)
    }

    /// Flusher loop. Runs until `stop` flips to true or its sender is dropped.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut delay = self.retry.initial_delay;
        info!(queue = %self.queue, "Producer started");

        loop {
            if *stop.borrow() {
                break;
            }

            match self.flush_once().await {
                Ok(true) => {
                    delay = self.retry.initial_delay;
                }
                Ok(false) => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        changed = stop.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        queue = %self.queue,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Publish failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = stop.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                    delay = self.retry.next_delay(delay);
                }
            }
        }

        info!(queue = %self.queue, "Producer stopped");
    }

    /// Wait until the buffer is empty or `deadline` passes. Returns true if drained.
    pub async fn wait_drained(&self, deadline: Instant) -> bool {
        loop {
            if self.pending.lock().await.is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

impl std::fmt::Debug for ProducingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducingChannel")
            .field("queue", &self.queue)
            .field("retry", &self.retry)
            .finish()
    }
}
