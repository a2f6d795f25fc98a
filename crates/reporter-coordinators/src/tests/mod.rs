//! Workflow tests for the coordinators.
//!
//! - `harness.rs`      - FakeTracker, SQLite stores, MemoryBroker wiring
//! - `verification.rs` - VerifyConfig handling and the revision check
//! - `crash_ingest.rs` - UniqueCrashFound handling and redelivery
//! - `duplicates.rs`   - DuplicateCrashFound handling and ordering races
//! - `integrations.rs` - IntegrationService CRUD and VerifyConfig emission
//! - `pipeline.rs`     - Coordinators behind a running MessageBus

mod duplicates;
pub(crate) mod harness;
mod integrations;
