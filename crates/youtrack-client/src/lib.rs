//! Issue tracker client for youtrack-reporter.
//!
//! [`TrackerClient`] is the seam the coordinators call through;
//! [`YouTrackClient`] implements it against the YouTrack REST API.
//! Every failure is a [`TrackerError`] whose message is safe to forward
//! to downstream consumers.

mod client;
mod error;
mod youtrack;

pub use client::{Issue, TrackerClient};
pub use error::{TrackerError, TrackerResult};
pub use youtrack::{YouTrackClient, YouTrackClientConfig};
