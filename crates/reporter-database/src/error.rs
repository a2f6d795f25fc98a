//! Database error types.

use rusqlite::ffi;
use thiserror::Error;

/// Database error type.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Executor connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Insert collided with an existing record
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Translate a driver error raised by an insert into the domain error kinds.
///
/// Primary key and unique violations become [`DatabaseError::AlreadyExists`];
/// everything else stays a generic SQLite failure.
pub fn map_constraint_violation(err: rusqlite::Error, what: impl Into<String>) -> DatabaseError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            DatabaseError::AlreadyExists(what.into())
        }
        _ => DatabaseError::Sqlite(err),
    }
}

/// Result type alias using DatabaseError.
pub type DatabaseResult<T> = Result<T, DatabaseError>;
