//! Tracker error types.

use thiserror::Error;

/// Tracker error type.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// The tracker answered with something other than 200
    #[error("Response status code is {0} - not OK")]
    ResponseStatus(u16),

    /// No project with the configured name
    #[error("No project \"{0}\" found")]
    ProjectNotFound(String),

    /// Several projects share the configured name
    #[error("Too many projects named \"{0}\" found")]
    TooManyProjectsFound(String),

    /// The tracker answered 200 with an unexpected body
    #[error("Failed to parse tracker response: {0}")]
    ResponseParse(String),

    /// Transport failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Config URL is not an absolute http(s) URL
    #[error("Invalid tracker URL: {0}")]
    InvalidUrl(String),
}

/// Result type alias using TrackerError.
pub type TrackerResult<T> = Result<T, TrackerError>;
