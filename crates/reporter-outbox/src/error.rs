//! Outbox error types.

use thiserror::Error;

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Store error while saving or loading unsent messages
    #[error("Database error: {0}")]
    Database(#[from] reporter_database::DatabaseError),
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
