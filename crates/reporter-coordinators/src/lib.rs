//! Message-driven workflows of youtrack-reporter.
//!
//! Each coordinator owns one inbound message type and receives its
//! collaborators at construction:
//!
//! - [`VerificationCoordinator`]: `VerifyConfig` → credential check → `IntegrationResult`
//! - [`CrashIngestCoordinator`]: `UniqueCrashFound` → new issue + crash mapping
//! - [`DuplicateCoordinator`]: `DuplicateCrashFound` → duplicate counter rewrite
//!
//! Tracker failures never escape a coordinator; they become
//! `ReportUndelivered` or `IntegrationResult { error }` envelopes. Store
//! failures other than not-found escape as [`ConsumeError::Failed`](reporter_bus::ConsumeError)
//! and the channel parks the delivery in its dead letter queue.
//!
//! [`IntegrationService`] is the administrative side: config CRUD that
//! queues a `VerifyConfig` after every write.

mod contracts;
mod crash_ingest;
pub mod description;
mod duplicates;
mod error;
mod integration_service;
mod verification;
mod wiring;

#[cfg(test)]
mod tests;

pub use contracts::{
    DuplicateCrashFound, IntegrationResult, ReportUndelivered, UniqueCrashFound, VerifyConfig,
};
pub use crash_ingest::CrashIngestCoordinator;
pub use duplicates::DuplicateCoordinator;
pub use error::{CoordinatorError, CoordinatorResult};
pub use integration_service::{IntegrationService, IntegrationUpdate, NewIntegration};
pub use verification::VerificationCoordinator;
pub use wiring::{register_coordinators, ChannelTopology, Collaborators};
