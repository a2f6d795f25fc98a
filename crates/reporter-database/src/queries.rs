//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` as its first parameter so it can run
//! inside [`crate::AsyncDatabase::call`] or directly in tests.

use crate::{
    map_constraint_violation, CrashIssue, DatabaseError, DatabaseResult, IntegrationConfig,
    NewIntegrationConfig, PendingMessageRow,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::debug;

// ==========================================
// Integration configs
// ==========================================

const CONFIG_COLUMNS: &str =
    "id, update_rev, url, token, project, project_id, created_at, updated_at";

fn config_from_row(row: &Row<'_>) -> rusqlite::Result<IntegrationConfig> {
    Ok(IntegrationConfig {
        id: row.get(0)?,
        update_rev: row.get(1)?,
        url: row.get(2)?,
        token: row.get(3)?,
        project: row.get(4)?,
        project_id: row.get(5)?,
        created_at: parse_datetime(row.get::<_, String>(6)?),
        updated_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

/// Insert a new integration config with a freshly assigned id.
pub fn insert_config(
    conn: &Connection,
    config: &NewIntegrationConfig,
) -> DatabaseResult<IntegrationConfig> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO integration_configs (id, update_rev, url, token, project, project_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)",
        params![id, config.update_rev, config.url, config.token, config.project, now],
    )
    .map_err(|e| map_constraint_violation(e, format!("config {id}")))?;

    debug!(config_id = %id, "Inserted integration config");
    get_config(conn, &id)?
        .ok_or_else(|| DatabaseError::NotFound(format!("config {id} after insert")))
}

/// Get an integration config by id.
pub fn get_config(conn: &Connection, id: &str) -> DatabaseResult<Option<IntegrationConfig>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CONFIG_COLUMNS} FROM integration_configs WHERE id = ?1"
    ))?;

    match stmt.query_row(params![id], config_from_row) {
        Ok(config) => Ok(Some(config)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// List all integration configs, oldest first.
pub fn list_configs(conn: &Connection) -> DatabaseResult<Vec<IntegrationConfig>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CONFIG_COLUMNS} FROM integration_configs ORDER BY created_at ASC, id ASC"
    ))?;

    let configs = stmt
        .query_map([], config_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(configs)
}

/// Replace the mutable fields of a config, returning the prior and new versions.
pub fn update_config(
    conn: &Connection,
    config: &IntegrationConfig,
) -> DatabaseResult<(IntegrationConfig, IntegrationConfig)> {
    let tx = conn.unchecked_transaction()?;

    let old = get_config(&tx, &config.id)?
        .ok_or_else(|| DatabaseError::NotFound(format!("config {}", config.id)))?;

    let now = Utc::now().to_rfc3339();
    tx.execute(
        "UPDATE integration_configs
         SET update_rev = ?2, url = ?3, token = ?4, project = ?5, project_id = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            config.id,
            config.update_rev,
            config.url,
            config.token,
            config.project,
            config.project_id,
            now,
        ],
    )?;

    let new = get_config(&tx, &config.id)?
        .ok_or_else(|| DatabaseError::NotFound(format!("config {} after update", config.id)))?;
    tx.commit()?;

    debug!(config_id = %config.id, update_rev = %new.update_rev, "Updated integration config");
    Ok((old, new))
}

/// Store `project_id` only while the config is still at `update_rev`.
/// Returns false when the config is gone or has moved to another revision.
pub fn set_project_id(
    conn: &Connection,
    id: &str,
    update_rev: &str,
    project_id: Option<&str>,
) -> DatabaseResult<bool> {
    let now = Utc::now().to_rfc3339();
    let updated = conn.execute(
        "UPDATE integration_configs SET project_id = ?3, updated_at = ?4
         WHERE id = ?1 AND update_rev = ?2",
        params![id, update_rev, project_id, now],
    )?;
    Ok(updated > 0)
}

/// Delete a config. Returns false if it did not exist.
pub fn delete_config(conn: &Connection, id: &str) -> DatabaseResult<bool> {
    let deleted = conn.execute("DELETE FROM integration_configs WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

// ==========================================
// Crash issues
// ==========================================

/// Record the issue filed for a crash. Fails with `AlreadyExists` on a second insert.
pub fn insert_crash_issue(conn: &Connection, crash_id: &str, issue_id: &str) -> DatabaseResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO crash_issues (crash_id, issue_id, created_at) VALUES (?1, ?2, ?3)",
        params![crash_id, issue_id, now],
    )
    .map_err(|e| map_constraint_violation(e, format!("issue for crash {crash_id}")))?;
    Ok(())
}

/// Get the issue mapping for a crash.
pub fn get_crash_issue(conn: &Connection, crash_id: &str) -> DatabaseResult<Option<CrashIssue>> {
    let mut stmt = conn.prepare_cached(
        "SELECT crash_id, issue_id, created_at FROM crash_issues WHERE crash_id = ?1",
    )?;

    let result = stmt.query_row(params![crash_id], |row| {
        Ok(CrashIssue {
            crash_id: row.get(0)?,
            issue_id: row.get(1)?,
            created_at: parse_datetime(row.get::<_, String>(2)?),
        })
    });

    match result {
        Ok(issue) => Ok(Some(issue)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ==========================================
// Unsent messages
// ==========================================

/// Atomically replace every persisted unsent message with `rows`.
pub fn replace_unsent_messages(conn: &Connection, rows: &[PendingMessageRow]) -> DatabaseResult<usize> {
    let tx = conn.unchecked_transaction()?;
    let removed = tx.execute("DELETE FROM unsent_messages", [])?;

    let now = Utc::now().to_rfc3339();
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO unsent_messages (queue, position, name, body, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for row in rows {
            stmt.execute(params![row.queue, row.position, row.name, row.body, now])?;
        }
    }
    tx.commit()?;

    debug!(removed, inserted = rows.len(), "Replaced unsent messages");
    Ok(rows.len())
}

/// Load every persisted unsent message, grouped by queue and in position order.
pub fn load_unsent_messages(conn: &Connection) -> DatabaseResult<Vec<PendingMessageRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT queue, position, name, body FROM unsent_messages ORDER BY queue ASC, position ASC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(PendingMessageRow {
                queue: row.get(0)?,
                position: row.get(1)?,
                name: row.get(2)?,
                body: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ==========================================
// Helpers
// ==========================================

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
