//! Coordinator error types.

use reporter_bus::ConsumeError;
use thiserror::Error;

/// Coordinator error type.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Store error
    #[error("Database error: {0}")]
    Database(#[from] reporter_database::DatabaseError),

    /// Message could not be queued
    #[error("Bus error: {0}")]
    Bus(#[from] reporter_bus::BusError),

    /// Caller supplied an unusable value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoordinatorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Database(e) if e.is_not_found())
    }
}

impl From<CoordinatorError> for ConsumeError {
    fn from(err: CoordinatorError) -> Self {
        ConsumeError::Failed(err.to_string())
    }
}

/// Result type alias using CoordinatorError.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
