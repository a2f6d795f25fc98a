//! Message bus plumbing for youtrack-reporter.
//!
//! Messages travel as named [`Envelope`]s over a [`Broker`]. A
//! [`ProducingChannel`] buffers outbound envelopes until the broker accepts
//! them; a [`ConsumingChannel`] hands inbound envelopes, one at a time, to
//! the [`Consumer`] registered for their name and acknowledges them once
//! handled. [`MessageBus`] owns the channels and their tasks.
//!
//! # Guarantees
//!
//! 1. **Ordered per channel**: a producing channel publishes in send order.
//! 2. **Held until accepted**: an envelope leaves a producing channel's
//!    buffer only after the broker accepted it, so an export at shutdown
//!    sees every envelope not yet delivered.
//! 3. **One in flight**: each consuming channel processes a single delivery
//!    at a time.
//! 4. **At least once**: a delivery is acknowledged only after it was handled
//!    or moved to the dead letter queue.
//!
//! ```text
//! broker --next--> ConsumingChannel --dispatch--> Consumer
//!    ^                   |  \__ failure __> ProducingChannel(dlq)
//!    |____ ack __________|
//!
//! Consumer --send--> ProducingChannel --publish--> broker
//! ```

mod broker;
mod bus;
mod consumer;
mod envelope;
mod error;
pub mod memory;
mod producer;
mod redis_broker;

pub use broker::{Broker, Delivery, Subscription};
pub use bus::{MessageBus, UnsentEnvelopes};
pub use consumer::{Consumer, ConsumingChannel, Disposition};
pub use envelope::{Envelope, Message};
pub use error::{BusError, BusResult, ConsumeError};
pub use memory::MemoryBroker;
pub use producer::{ProducingChannel, RetryPolicy};
pub use redis_broker::{RedisBroker, RedisBrokerConfig, RedisSubscription};
