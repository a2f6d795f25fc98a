//! In-process broker.
//!
//! Behaves like a Redis stream with one consumer group: published envelopes
//! queue up per name, deliveries stay pending until acknowledged, and a new
//! subscription hands out pending deliveries again before fresh ones. The
//! broker can be switched off to exercise the retry and durability paths.

use crate::{Broker, BusError, BusResult, Delivery, Envelope, Subscription};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Delivery>,
    unacked: Vec<Delivery>,
    /// Every envelope accepted on this queue, in order.
    published: Vec<Envelope>,
    acked: Vec<String>,
}

struct Inner {
    queues: Mutex<HashMap<String, QueueState>>,
    available: AtomicBool,
    next_id: AtomicU64,
    block_timeout: Duration,
}

/// Broker that keeps every queue in memory.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_block_timeout(Duration::from_millis(100))
    }

    /// How long `next` waits for a delivery before returning `None`.
    pub fn with_block_timeout(block_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                queues: Mutex::new(HashMap::new()),
                available: AtomicBool::new(true),
                next_id: AtomicU64::new(1),
                block_timeout,
            }),
        }
    }

    /// While unavailable every broker operation fails.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Enqueue an envelope regardless of availability.
    pub fn push(&self, queue: &str, envelope: Envelope) {
        let id = format!("{}-0", self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut queues = self.inner.queues.lock();
        let state = queues.entry(queue.to_string()).or_default();
        state.published.push(envelope.clone());
        state.ready.push_back(Delivery { id, envelope });
    }

    /// Every envelope accepted on `queue`, consumed or not.
    pub fn published(&self, queue: &str) -> Vec<Envelope> {
        self.inner
            .queues
            .lock()
            .get(queue)
            .map(|s| s.published.clone())
            .unwrap_or_default()
    }

    /// Envelopes published under `name` on `queue`.
    pub fn published_named(&self, queue: &str, name: &str) -> Vec<Envelope> {
        self.published(queue)
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }

    pub fn acked(&self, queue: &str) -> Vec<String> {
        self.inner
            .queues
            .lock()
            .get(queue)
            .map(|s| s.acked.clone())
            .unwrap_or_default()
    }

    pub fn ready_count(&self, queue: &str) -> usize {
        self.inner.queues.lock().get(queue).map_or(0, |s| s.ready.len())
    }

    pub fn unacked_count(&self, queue: &str) -> usize {
        self.inner.queues.lock().get(queue).map_or(0, |s| s.unacked.len())
    }

    fn check_available(&self) -> BusResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(BusError::Unavailable("memory broker switched off".to_string()))
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ping(&self) -> BusResult<()> {
        self.check_available()
    }

    async fn publish(&self, queue: &str, envelope: &Envelope) -> BusResult<()> {
        self.check_available()?;
        self.push(queue, envelope.clone());
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> BusResult<Box<dyn Subscription>> {
        self.check_available()?;
        {
            let mut queues = self.inner.queues.lock();
            let state = queues.entry(queue.to_string()).or_default();
            for delivery in state.unacked.drain(..).rev() {
                state.ready.push_front(delivery);
            }
        }
        Ok(Box::new(MemorySubscription {
            broker: self.clone(),
            queue: queue.to_string(),
        }))
    }
}

struct MemorySubscription {
    broker: MemoryBroker,
    queue: String,
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn next(&mut self) -> BusResult<Option<Delivery>> {
        let deadline = Instant::now() + self.broker.inner.block_timeout;
        loop {
            self.broker.check_available()?;
            {
                let mut queues = self.broker.inner.queues.lock();
                let state = queues.entry(self.queue.clone()).or_default();
                if let Some(delivery) = state.ready.pop_front() {
                    state.unacked.push(delivery.clone());
                    return Ok(Some(delivery));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn ack(&mut self, delivery_id: &str) -> BusResult<()> {
        self.broker.check_available()?;
        let mut queues = self.broker.inner.queues.lock();
        if let Some(state) = queues.get_mut(&self.queue) {
            state.unacked.retain(|d| d.id != delivery_id);
            state.acked.push(delivery_id.to_string());
        }
        Ok(())
    }
}
