//! Error types for the message bus.

use thiserror::Error;

/// Transport-level error.
#[derive(Error, Debug)]
pub enum BusError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Envelope body could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected broker reply
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Broker cannot be reached right now
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Two consumers registered for one message name on one channel
    #[error("Consumer already registered for message {0}")]
    DuplicateConsumer(String),
}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Why a delivery could not be handled.
///
/// Every variant routes the delivery to the dead letter queue when the
/// channel has one.
#[derive(Error, Debug)]
pub enum ConsumeError {
    /// Body did not decode into the message type or failed validation
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// No consumer registered for the envelope's name
    #[error("No consumer for message {0}")]
    UnknownMessage(String),

    /// The consumer raised
    #[error("Processing failed: {0}")]
    Failed(String),
}

impl ConsumeError {
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }
}
