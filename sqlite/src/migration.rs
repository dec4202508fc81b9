//! Migration lifecycle operations for the portal tables.
//!
//! Provides [`Migration`] for creating, dropping, seeding, and refreshing
//! every table declared in a [`SchemaRegistry`]. All mutation operations use
//! transactions to ensure atomicity.
//!
//! # Example
//!
//! ```no_run
//! use portal_core::SchemaRegistry;
//! use portal_sqlite::Migration;
//! use rusqlite::Connection;
//!
//! let conn = Connection::open("portal.db").unwrap();
//! let mut migration = Migration::new(conn, SchemaRegistry::portal()).unwrap();
//!
//! // Create tables
//! migration.up().unwrap();
//!
//! // Seed from a directory of `<table>.json` files
//! migration.seed("seed/").unwrap();
//!
//! // Drop, recreate, and reseed
//! migration.refresh("seed/").unwrap();
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use portal_core::{Action, QueryDescriptor, SchemaRegistry, Values};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, SqliteError};
use crate::executor::QueryExecutor;
use crate::schema::{ensure_valid_registry, generate_drop_sql, generate_schema_sql};

/// Manages the lifecycle of the portal tables.
///
/// Provides operations to create tables ([`up`](Self::up)), drop them
/// ([`down`](Self::down)), seed rows from JSON files ([`seed`](Self::seed)),
/// and check the current state ([`status`](Self::status)).
pub struct Migration {
    conn: Connection,
    registry: &'static SchemaRegistry,
}

impl Migration {
    /// Creates a migration manager for the given connection and registry.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidRegistry`] if the registry contains
    /// identifiers that cannot be used in SQL.
    pub fn new(conn: Connection, registry: &'static SchemaRegistry) -> Result<Self> {
        ensure_valid_registry(registry)?;
        Ok(Self { conn, registry })
    }

    /// Creates all tables and indexes.
    ///
    /// Uses `CREATE TABLE IF NOT EXISTS` so it is safe to call multiple times.
    pub fn up(&mut self) -> Result<()> {
        let sql = generate_schema_sql(self.registry)?;
        let tx = self.conn.transaction()?;
        tx.execute_batch(&sql)
            .map_err(|e| SqliteError::MigrationError(format!("failed to create tables: {e}")))?;
        tx.commit()?;
        info!(tables = self.registry.tables().len(), "Migration up complete");
        Ok(())
    }

    /// Drops all tables in reverse declaration order.
    pub fn down(&mut self) -> Result<()> {
        let sql = generate_drop_sql(self.registry)?;
        let tx = self.conn.transaction()?;
        tx.execute_batch(&sql)
            .map_err(|e| SqliteError::MigrationError(format!("failed to drop tables: {e}")))?;
        tx.commit()?;
        info!("Migration down complete");
        Ok(())
    }

    /// Returns whether each table exists and how many rows it holds.
    pub fn status(&self) -> Result<MigrationStatus> {
        let mut tables = Vec::with_capacity(self.registry.tables().len());
        for table in self.registry.tables() {
            let exists = self.table_exists(table.name)?;
            let row_count = if exists { self.count_rows(table.name)? } else { 0 };
            tables.push(TableStatus {
                name: table.name.to_string(),
                exists,
                row_count,
            });
        }
        Ok(MigrationStatus {
            tables_exist: tables.iter().all(|t| t.exists),
            tables,
        })
    }

    /// Seeds tables from a directory of `<table>.json` files.
    ///
    /// Each file holds one row object or an array of row objects and is
    /// inserted through the same sanitizing path as the data API, so
    /// unknown fields are dropped. Files whose stem is not a registered
    /// table are skipped and reported. Everything is inserted in a single
    /// transaction, in registry order.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::IoError`] or [`SqliteError::JsonError`] if a
    /// file cannot be read or parsed, and [`SqliteError::QueryError`] if an
    /// insert fails.
    pub fn seed(&mut self, source_dir: impl AsRef<Path>) -> Result<SeedReport> {
        let mut files: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut report = SeedReport::default();

        for entry in std::fs::read_dir(source_dir.as_ref())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if self.registry.contains(stem) {
                files.insert(stem.to_string(), path);
            } else {
                debug!(file = %path.display(), "Skipping seed file for unknown table");
                report.skipped_files.push(path);
            }
        }

        let tx = self.conn.transaction()?;
        {
            let executor = QueryExecutor::new(&tx, self.registry);
            for table in self.registry.tables() {
                let Some(path) = files.get(table.name) else {
                    continue;
                };
                let file = std::fs::File::open(path)?;
                let values: Values = serde_json::from_reader(std::io::BufReader::new(file))?;
                let count = values.rows().len();
                if count == 0 {
                    continue;
                }

                let mut desc = QueryDescriptor::new(table.name, Action::Insert);
                desc.values = Some(values);
                desc.returning = Some(vec![table.columns[0].name.to_string()]);
                executor.execute(&desc)?;

                report.rows_inserted.insert(table.name.to_string(), count);
            }
        }
        tx.commit()?;

        info!(rows = report.total_rows(), "Seed complete");
        Ok(report)
    }

    /// Drops all tables, recreates them, and seeds from the given directory.
    pub fn refresh(&mut self, source_dir: impl AsRef<Path>) -> Result<SeedReport> {
        self.down()?;
        self.up()?;
        self.seed(source_dir)
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the migration and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1")?;
        let count: i64 = stmt.query_row([table], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn count_rows(&self, table: &str) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT COUNT(*) FROM \"{table}\""))?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Existence and size of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub name: String,
    pub exists: bool,
    pub row_count: usize,
}

/// Snapshot returned by [`Migration::status`].
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Whether every registered table exists.
    pub tables_exist: bool,
    /// Per-table status, in registry order.
    pub tables: Vec<TableStatus>,
}

impl MigrationStatus {
    /// Row count of `table`, or `0` if it is unknown or missing.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .map_or(0, |t| t.row_count)
    }
}

/// Report of a seed operation.
#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    /// Rows inserted per table.
    pub rows_inserted: BTreeMap<String, usize>,
    /// JSON files whose name does not match a registered table.
    pub skipped_files: Vec<PathBuf>,
}

impl SeedReport {
    pub fn total_rows(&self) -> usize {
        self.rows_inserted.values().sum()
    }
}
