//! SQLite store for the ISP portal data API.
//!
//! This crate executes [`QueryDescriptor`](portal_core::QueryDescriptor)s
//! against a SQLite database whose tables are generated from the
//! [`SchemaRegistry`](portal_core::SchemaRegistry). It also owns the
//! migration lifecycle and the account lookups the session gate relies on.
//!
//! # Architecture
//!
//! - **`schema`** - DDL generation from the registry
//! - **`migration`** - lifecycle operations (up/down/seed/refresh/status)
//! - **`convert`** - JSON ↔ SQLite value conversion driven by column types
//! - **`statement`** - query plan → parameterized SQL
//! - **`executor`** - runs plans and shapes rows into the response payload
//! - **`users`** - account reads and writes for the session gate
//!
//! # Quick start
//!
//! ```no_run
//! use portal_core::{Action, QueryDescriptor, SchemaRegistry};
//! use portal_sqlite::{Migration, QueryExecutor};
//! use rusqlite::Connection;
//!
//! let conn = Connection::open("portal.db").unwrap();
//! let mut migration = Migration::new(conn, SchemaRegistry::portal()).unwrap();
//! migration.up().unwrap();
//!
//! let conn = migration.into_connection();
//! let executor = QueryExecutor::new(&conn, SchemaRegistry::portal());
//! let plans = executor.execute(&QueryDescriptor::new("plans", Action::Select)).unwrap();
//! println!("{plans}");
//! ```

mod convert;
mod error;
mod executor;
mod migration;
mod schema;
mod statement;
mod users;

pub use error::{Result, SqliteError, store_error};
pub use executor::QueryExecutor;
pub use migration::{Migration, MigrationStatus, SeedReport, TableStatus};
pub use schema::{generate_drop_sql, generate_schema_sql};
pub use users::{Role, UserRecord, UserStore};
