//! Single-connection SQLite store behind an executor thread.
//!
//! All statements run on one thread owned by `tokio_rusqlite`, in FIFO
//! order. Callers park on the result instead of blocking a runtime worker.
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let issue = db.call(move |conn| queries::get_crash_issue(conn, &crash_id)).await?;
//! ```

use crate::{migrations, DatabaseError, DatabaseResult};
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
    PRAGMA temp_store = MEMORY;
    PRAGMA busy_timeout = 5000;
";

fn from_tokio_rusqlite(e: tokio_rusqlite::Error) -> DatabaseError {
    match e {
        tokio_rusqlite::Error::Rusqlite(e) => DatabaseError::Sqlite(e),
        tokio_rusqlite::Error::Close(_) => DatabaseError::Connection("Connection closed".to_string()),
        other => DatabaseError::Connection(other.to_string()),
    }
}

/// Handle to the reporter's SQLite file. Clones share one executor thread.
#[derive(Clone)]
pub struct AsyncDatabase {
    conn: Connection,
    path: String,
}

impl AsyncDatabase {
    /// Creates the file and its parent directory if needed, applies pragmas
    /// and runs pending migrations.
    pub async fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path_str = path.to_string_lossy().to_string();
        info!(path = %path_str, "Opening database");

        let conn = Connection::open(path_str.clone())
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        Self::initialize(conn, path_str).await
    }

    /// Private in-memory database, for tests.
    pub async fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        Self::initialize(conn, ":memory:".to_string()).await
    }

    async fn initialize(conn: Connection, path: String) -> DatabaseResult<Self> {
        let db = Self { conn, path };

        db.call_sqlite(|conn| conn.execute_batch(PRAGMAS)).await?;
        db.call(migrations::run_migrations).await?;

        info!(path = %db.path, "Database initialized");
        Ok(db)
    }

    /// Run `f` against the connection. It runs on the dedicated SQLite thread. Keep it to SQL and
    /// row mapping: anything slow inside it stalls every other query.
    pub async fn call<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> DatabaseResult<T> + Send + 'static,
        T: Send + 'static,
    {
        // The domain result rides inside tokio_rusqlite's Ok so that our
        // error kinds survive the trip across the executor thread.
        let outer_result = self
            .conn
            .call(move |conn| Ok(f(conn)))
            .await;

        match outer_result {
            Ok(inner) => inner,
            Err(e) => Err(from_tokio_rusqlite(e)),
        }
    }

    /// [`AsyncDatabase::call`] for closures that speak plain `rusqlite`.
    pub async fn call_sqlite<F, T>(&self, f: F) -> DatabaseResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| Ok(f(conn)?))
            .await
            .map_err(from_tokio_rusqlite)
    }

    /// Round-trip a trivial statement through the executor.
    pub async fn health_check(&self) -> DatabaseResult<()> {
        self.call_sqlite(|conn| conn.execute_batch("SELECT 1")).await?;
        debug!("Database health check passed");
        Ok(())
    }

    /// Drain queued statements and stop the executor thread. Other clones
    /// fail with `Connection` afterwards.
    pub async fn close(self) -> DatabaseResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to close database: {:?}", e)))?;
        info!(path = %self.path, "Database closed");
        Ok(())
    }
}
