//! Application wiring and lifecycle management.

mod admin;
mod init;
mod service;

pub use admin::run_admin;
pub use service::run_service;
