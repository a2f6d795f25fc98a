//! Export, persist, load and replay of unsent envelopes.

use crate::OutboxResult;
use parking_lot::Mutex;
use reporter_bus::{Envelope, MessageBus, UnsentEnvelopes};
use reporter_database::{UnsentMessage, UnsentMessageStore, UnsentMessages};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Carries produced-but-unaccepted envelopes across a restart.
///
/// The store may be shared with other writers that only ever
/// [`append`](DurabilityBuffer::append). Rows this buffer replayed are
/// tracked per queue so that they, and only they, are removed again.
pub struct DurabilityBuffer {
    store: Arc<dyn UnsentMessageStore>,
    /// Rows replayed by [`DurabilityBuffer::restore`] and still in the
    /// store, counted from the front of each queue.
    uncommitted: Mutex<BTreeMap<String, usize>>,
}

impl DurabilityBuffer {
    pub fn new(store: Arc<dyn UnsentMessageStore>) -> Self {
        Self {
            store,
            uncommitted: Mutex::new(BTreeMap::new()),
        }
    }

    /// Drain every producing channel of the bus. Call after the bus stopped.
    pub async fn export(&self, bus: &MessageBus) -> UnsentEnvelopes {
        let unsent = bus.export_unsent().await;
        info!(
            queues = unsent.len(),
            count = count(&unsent),
            "Exported unsent envelopes"
        );
        unsent
    }

    /// Replace the persisted set with `unsent`. An empty set clears the store.
    pub async fn persist(&self, unsent: &UnsentEnvelopes) -> OutboxResult<usize> {
        let messages: UnsentMessages = unsent
            .iter()
            .map(|(queue, envelopes)| {
                let group = envelopes
                    .iter()
                    .map(|e| UnsentMessage {
                        name: e.name.clone(),
                        body: e.body.clone(),
                    })
                    .collect();
                (queue.clone(), group)
            })
            .collect();

        let written = self.store.save_unsent_messages(&messages).await?;
        info!(count = written, queues = messages.len(), "Persisted unsent envelopes");
        Ok(written)
    }

    /// Read the persisted set, grouped by queue in original order.
    pub async fn load(&self) -> OutboxResult<UnsentEnvelopes> {
        let messages = self.store.load_unsent_messages().await?;
        let unsent: UnsentEnvelopes = messages
            .into_iter()
            .map(|(queue, group)| {
                let envelopes = group
                    .into_iter()
                    .map(|m| Envelope::new(m.name, m.body))
                    .collect();
                (queue, envelopes)
            })
            .collect();
        info!(
            queues = unsent.len(),
            count = count(&unsent),
            "Loaded unsent envelopes"
        );
        Ok(unsent)
    }

    /// Hand loaded envelopes back to their producing channels, ahead of
    /// anything sent since. Call before the bus starts.
    pub async fn replay(&self, bus: &mut MessageBus, unsent: UnsentEnvelopes) -> usize {
        if bus.is_running() {
            warn!("Replaying into a running bus; restored envelopes may interleave with new traffic");
        }
        let replayed = bus.import_unsent(unsent).await;
        info!(count = replayed, "Replayed unsent envelopes");
        replayed
    }

    /// Shutdown half: export the stopped bus and store it behind whatever
    /// other writers appended since startup. Rows replayed at startup and
    /// not yet committed are dropped first, since the export holds them.
    pub async fn capture(&self, bus: &MessageBus) -> OutboxResult<usize> {
        let mut stored = self.load().await?;
        let exported = self.export(bus).await;
        let restored = self.uncommitted.lock().clone();
        strip_restored(&mut stored, &restored);
        if !stored.is_empty() {
            info!(count = count(&stored), "Keeping envelopes appended by other writers");
        }

        for (queue, envelopes) in exported {
            stored.entry(queue).or_default().extend(envelopes);
        }
        let written = self.persist(&stored).await?;
        self.uncommitted.lock().clear();
        Ok(written)
    }

    /// Startup half: load then replay. The rows stay in the store until
    /// [`DurabilityBuffer::commit_restore`], so a startup that fails before
    /// the bus runs loses nothing.
    pub async fn restore(&self, bus: &mut MessageBus) -> OutboxResult<usize> {
        let unsent = self.load().await?;
        let counts: BTreeMap<String, usize> = unsent
            .iter()
            .map(|(queue, envelopes)| (queue.clone(), envelopes.len()))
            .collect();
        let replayed = self.replay(bus, unsent).await;
        *self.uncommitted.lock() = counts;
        Ok(replayed)
    }

    /// Remove the rows [`DurabilityBuffer::restore`] replayed, keeping
    /// anything appended after them. Call once the bus is running.
    pub async fn commit_restore(&self) -> OutboxResult<usize> {
        let restored = self.uncommitted.lock().clone();
        if restored.is_empty() {
            return Ok(0);
        }

        let mut stored = self.load().await?;
        strip_restored(&mut stored, &restored);
        self.persist(&stored).await?;
        self.uncommitted.lock().clear();

        let removed = restored.values().sum();
        info!(removed, kept = count(&stored), "Committed restored envelopes");
        Ok(removed)
    }

    /// Add `unsent` behind whatever is already persisted, queue by queue.
    ///
    /// For short-lived processes that share the store with a running
    /// service.
    pub async fn append(&self, unsent: UnsentEnvelopes) -> OutboxResult<usize> {
        if count(&unsent) == 0 {
            return Ok(0);
        }
        let mut merged = self.load().await?;
        for (queue, envelopes) in unsent {
            merged.entry(queue).or_default().extend(envelopes);
        }
        self.persist(&merged).await
    }
}

/// Drop the first `n` envelopes of each queue named in `restored`.
fn strip_restored(stored: &mut UnsentEnvelopes, restored: &BTreeMap<String, usize>) {
    for (queue, &n) in restored {
        if let Some(envelopes) = stored.get_mut(queue) {
            envelopes.drain(..n.min(envelopes.len()));
            if envelopes.is_empty() {
                stored.remove(queue);
            }
        }
    }
}

fn count(unsent: &UnsentEnvelopes) -> usize {
    unsent.values().map(Vec::len).sum()
}
