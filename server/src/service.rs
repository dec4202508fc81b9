//! Database access from async handlers.
//!
//! There is no shared connection and no lock in this process: every call
//! opens its own connection on the blocking pool, and concurrent writers
//! are serialized by SQLite itself (WAL journal plus a busy timeout).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use portal_core::{QueryDescriptor, QueryError, SchemaRegistry};
use portal_sqlite::{Migration, QueryExecutor, SqliteError};
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use tracing::{error, info};

use crate::config::DatabaseConfig;
use crate::error::ApiError;

/// Opens one connection per call against a database file.
#[derive(Debug, Clone)]
pub struct QueryService {
    path: Arc<PathBuf>,
    busy_timeout: Duration,
    registry: &'static SchemaRegistry,
}

impl QueryService {
    pub fn new(
        path: impl Into<PathBuf>,
        busy_timeout: Duration,
        registry: &'static SchemaRegistry,
    ) -> Self {
        Self {
            path: Arc::new(path.into()),
            busy_timeout,
            registry,
        }
    }

    pub fn from_config(config: &DatabaseConfig, registry: &'static SchemaRegistry) -> Self {
        Self::new(
            config.path.clone(),
            Duration::from_millis(config.busy_timeout_ms),
            registry,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &'static SchemaRegistry {
        self.registry
    }

    /// Creates the database file if needed, switches it to the WAL journal
    /// and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError`] if the file cannot be opened or migrated.
    pub fn prepare(&self) -> Result<(), SqliteError> {
        let conn = Connection::open(self.path.as_path())?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        let mut migration = Migration::new(conn, self.registry)?;
        migration.up()?;
        info!(path = %self.path.display(), journal_mode = %mode, "Database ready");
        Ok(())
    }

    /// Opens a new connection to an existing database.
    ///
    /// # Errors
    ///
    /// Fails if the file does not exist or cannot be opened.
    pub fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open_with_flags(
            self.path.as_path(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    /// Runs `f` with a fresh connection on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unavailable`] if the database cannot be opened
    /// or the blocking task fails.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Connection) -> T + Send + 'static,
        T: Send + 'static,
    {
        let service = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = service.connect().map_err(|e| {
                error!(path = %service.path.display(), error = %e, "Failed to open database");
                ApiError::Unavailable(e.to_string())
            })?;
            Ok::<T, ApiError>(f(&conn))
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Blocking store task failed");
            ApiError::Unavailable(e.to_string())
        })?
    }

    /// Executes a descriptor and returns the `data` payload.
    pub async fn execute(&self, desc: QueryDescriptor) -> Result<Result<Value, QueryError>, ApiError> {
        let registry = self.registry;
        self.with_conn(move |conn| QueryExecutor::new(conn, registry).execute(&desc))
            .await
    }
}
