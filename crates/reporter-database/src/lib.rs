//! SQLite storage for youtrack-reporter.
//!
//! This crate provides:
//! - Async SQLite executor with a dedicated thread
//! - Schema migrations
//! - Model types for integration configs, crash issues and unsent messages
//! - Query helpers that work on any `rusqlite::Connection`
//! - The [`ConfigStore`], [`IssueStore`] and [`UnsentMessageStore`] traits,
//!   implemented by [`AsyncDatabase`]
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let config = ConfigStore::get(&db, "c1").await?;
//! ```
//!
//! Only SQL runs inside `db.call()`. Everything else happens on the caller's task.

mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;
mod store;

pub use error::{map_constraint_violation, DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::*;
pub use store::{ConfigStore, IssueStore, UnsentMessageStore};
