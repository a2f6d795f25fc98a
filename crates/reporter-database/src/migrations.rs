//! Database migrations.
//!
//! Migrations run in order and are tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_initial_schema(conn)?;
    }
    if current_version < 2 {
        migrate_v2_unsent_messages(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: integration configs and crash to issue mappings.
fn migrate_v1_initial_schema(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: initial schema");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS integration_configs (
            id TEXT PRIMARY KEY,
            update_rev TEXT NOT NULL,
            url TEXT NOT NULL,
            token TEXT NOT NULL,
            project TEXT NOT NULL,
            project_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS crash_issues (
            crash_id TEXT PRIMARY KEY,
            issue_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        ",
    )?;

    record_migration(conn, 1, "initial_schema")
}

/// V2: produced-but-unacknowledged messages captured at shutdown.
fn migrate_v2_unsent_messages(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: unsent messages");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS unsent_messages (
            queue TEXT NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            body TEXT NOT NULL,
            captured_at TEXT NOT NULL,
            PRIMARY KEY (queue, position)
        );
        ",
    )?;

    record_migration(conn, 2, "unsent_messages")
}
