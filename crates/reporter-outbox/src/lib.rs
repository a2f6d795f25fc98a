//! Durability buffer for outbound envelopes.
//!
//! At startup the stored set is loaded and handed back to the producing
//! channels ahead of any new traffic, so per-queue order survives the
//! restart. The replayed rows stay in the store until the bus is running
//! and [`DurabilityBuffer::commit_restore`] removes them. At shutdown every
//! envelope a producing channel still holds is exported and added behind
//! whatever other writers (admin commands) appended in the meantime.

mod buffer;
mod error;

pub use buffer::DurabilityBuffer;
pub use error::{OutboxError, OutboxResult};
