//! Query descriptor execution against SQLite.
//!
//! [`QueryExecutor`] is the store half of the data API: it plans a
//! [`QueryDescriptor`] against the registry, runs the resulting statement,
//! and shapes the returned rows. Every failure comes back as a
//! [`QueryError`]; nothing from the store escapes as a panic.
//!
//! # Example
//!
//! ```no_run
//! use portal_core::{Action, QueryDescriptor, SchemaRegistry};
//! use portal_sqlite::QueryExecutor;
//! use rusqlite::Connection;
//!
//! let conn = Connection::open("portal.db").unwrap();
//! let executor = QueryExecutor::new(&conn, SchemaRegistry::portal());
//!
//! let envelope = executor.envelope(&QueryDescriptor::new("plans", Action::Select));
//! println!("{}", serde_json::to_string(&envelope).unwrap());
//! ```

use portal_core::{
    ColumnDef, Envelope, PlanKind, QueryDescriptor, QueryError, QueryPlan, SchemaRegistry,
};
use rusqlite::{Connection, params_from_iter};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::convert::from_sql_value;
use crate::error::store_error;
use crate::statement::{self, Statement};

/// Executes query descriptors on a borrowed connection.
///
/// Each action runs as a single statement. A multi-row insert or upsert
/// runs one statement per row inside a transaction (unless the connection
/// is already inside one), so a failing row leaves nothing behind.
pub struct QueryExecutor<'a> {
    conn: &'a Connection,
    registry: &'a SchemaRegistry,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor over `conn` that resolves tables in `registry`.
    pub fn new(conn: &'a Connection, registry: &'a SchemaRegistry) -> Self {
        Self { conn, registry }
    }

    /// Plans and runs a descriptor, returning the shaped `data` payload.
    ///
    /// # Errors
    ///
    /// Returns planning errors ([`QueryError::UnknownTable`],
    /// [`QueryError::MissingValues`], [`QueryError::MissingConflictTarget`])
    /// before touching the store, [`QueryError::NoRows`] when `single` finds
    /// nothing, and [`QueryError::Store`] for anything the store rejects.
    pub fn execute(&self, desc: &QueryDescriptor) -> Result<Value, QueryError> {
        let plan = QueryPlan::build(desc, self.registry)?;
        self.run(&plan)
    }

    /// Like [`execute`](Self::execute) but wraps the outcome in an [`Envelope`].
    pub fn envelope(&self, desc: &QueryDescriptor) -> Envelope {
        Envelope::from_result(self.execute(desc))
    }

    /// Runs an already-built plan.
    pub fn run(&self, plan: &QueryPlan) -> Result<Value, QueryError> {
        if plan.targets_whole_table() {
            warn!(
                table = plan.table.name,
                action = %plan.action(),
                "Write without filters targets every row"
            );
        }

        let rows = match &plan.kind {
            PlanKind::Select => self.query(&statement::select(plan), &plan.projection)?,
            PlanKind::Update { values } => {
                self.query(&statement::update(plan, values), &plan.projection)?
            }
            PlanKind::Delete => self.query(&statement::delete(plan), &plan.projection)?,
            PlanKind::Insert { rows } => self.query_each(
                rows.iter().map(|row| statement::insert(plan, row)),
                rows.len(),
                &plan.projection,
            )?,
            PlanKind::Upsert { rows, conflict } => self.query_each(
                rows.iter().map(|row| statement::upsert(plan, row, conflict)),
                rows.len(),
                &plan.projection,
            )?,
        };

        debug!(
            table = plan.table.name,
            action = %plan.action(),
            rows = rows.len(),
            "Executed query"
        );
        plan.shape.apply(rows)
    }

    /// Runs one statement and reads every returned row.
    fn query(&self, stmt: &Statement, projection: &[&ColumnDef]) -> Result<Vec<Value>, QueryError> {
        let mut prepared = self.conn.prepare(&stmt.sql).map_err(store_error)?;
        let rows = prepared
            .query_map(params_from_iter(stmt.params.iter()), |row| {
                let mut object = Map::with_capacity(projection.len());
                for (i, column) in projection.iter().enumerate() {
                    object.insert(column.name.to_string(), from_sql_value(column, row.get_ref(i)?));
                }
                Ok(Value::Object(object))
            })
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok(rows)
    }

    /// Runs a sequence of statements atomically and concatenates their rows.
    fn query_each(
        &self,
        statements: impl Iterator<Item = Statement>,
        count: usize,
        projection: &[&ColumnDef],
    ) -> Result<Vec<Value>, QueryError> {
        let tx = if count > 1 && self.conn.is_autocommit() {
            Some(self.conn.unchecked_transaction().map_err(store_error)?)
        } else {
            None
        };

        let mut rows = Vec::with_capacity(count);
        for stmt in statements {
            rows.extend(self.query(&stmt, projection)?);
        }

        if let Some(tx) = tx {
            tx.commit().map_err(store_error)?;
        }
        Ok(rows)
    }
}
