//! Translation of query plans into parameterized SQL.
//!
//! Identifiers are taken from the registry and quoted; every value from the
//! request is bound as a `?N` parameter. Each function here produces one
//! statement.

use std::fmt::Write;

use portal_core::{
    ColumnDef, FilterOp, PlannedFilter, PlannedOrder, PlannedRow, QueryPlan, TableSchema,
};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::convert::to_sql_value;
use crate::schema::quote_ident;

/// SQL text plus its bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Appends a placeholder and records its value.
    fn bind(&mut self, value: SqlValue) -> &mut Self {
        self.params.push(value);
        let _ = write!(self.sql, "?{}", self.params.len());
        self
    }

    fn push_projection(&mut self, projection: &[&ColumnDef]) {
        let cols: Vec<String> = projection.iter().map(|c| quote_ident(c.name)).collect();
        self.push(&cols.join(", "));
    }

    fn push_returning(&mut self, projection: &[&ColumnDef]) {
        self.push(" RETURNING ");
        self.push_projection(projection);
    }

    fn push_filters(&mut self, filters: &[PlannedFilter]) {
        for (i, filter) in filters.iter().enumerate() {
            self.push(if i == 0 { " WHERE " } else { " AND " });
            self.push_filter(filter);
        }
    }

    fn push_filter(&mut self, filter: &PlannedFilter) {
        let column = quote_ident(filter.column.name);
        match (filter.op, &filter.value) {
            (FilterOp::Eq, Value::Null) => {
                self.push(&column).push(" IS NULL");
            }
            (FilterOp::Eq, value) => {
                self.push(&column).push(" = ");
                self.bind(to_sql_value(filter.column, value));
            }
            (FilterOp::Gte, value) => {
                self.push(&column).push(" >= ");
                self.bind(to_sql_value(filter.column, value));
            }
            (FilterOp::Lt, value) => {
                self.push(&column).push(" < ");
                self.bind(to_sql_value(filter.column, value));
            }
            (FilterOp::In, value) => {
                let items: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    single => vec![single],
                };
                if items.is_empty() {
                    self.push("0");
                    return;
                }
                self.push(&column).push(" IN (");
                for (i, item) in items.into_iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.bind(to_sql_value(filter.column, item));
                }
                self.push(")");
            }
        }
    }

    fn push_order(&mut self, order: &[PlannedOrder]) {
        if order.is_empty() {
            return;
        }
        let keys: Vec<String> = order
            .iter()
            .map(|o| {
                format!(
                    "{} {}",
                    quote_ident(o.column.name),
                    if o.ascending { "ASC" } else { "DESC" }
                )
            })
            .collect();
        self.push(" ORDER BY ").push(&keys.join(", "));
    }

    fn push_insert_head(&mut self, table: &TableSchema, row: &PlannedRow) {
        self.push("INSERT INTO ").push(&quote_ident(table.name));
        if row.is_empty() {
            self.push(" DEFAULT VALUES");
            return;
        }
        let cols: Vec<String> = row.iter().map(|(c, _)| quote_ident(c.name)).collect();
        self.push(" (").push(&cols.join(", ")).push(") VALUES (");
        for (i, (column, value)) in row.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.bind(to_sql_value(column, value));
        }
        self.push(")");
    }
}

/// `SELECT … FROM … WHERE … ORDER BY … LIMIT …`
pub(crate) fn select(plan: &QueryPlan) -> Statement {
    let mut stmt = Statement::default();
    stmt.push("SELECT ");
    stmt.push_projection(&plan.projection);
    stmt.push(" FROM ").push(&quote_ident(plan.table.name));
    stmt.push_filters(&plan.filters);
    stmt.push_order(&plan.order);
    if let Some(limit) = plan.limit {
        stmt.push(" LIMIT ");
        stmt.bind(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }
    stmt
}

/// `INSERT INTO … VALUES … RETURNING …` for one row.
pub(crate) fn insert(plan: &QueryPlan, row: &PlannedRow) -> Statement {
    let mut stmt = Statement::default();
    stmt.push_insert_head(plan.table, row);
    stmt.push_returning(&plan.projection);
    stmt
}

/// `INSERT … ON CONFLICT (…) DO UPDATE SET c = excluded.c … RETURNING …`
///
/// Only the submitted non-conflict columns are overwritten. A row that only
/// carries conflict columns re-assigns the first of them so the existing row
/// is still returned.
pub(crate) fn upsert(plan: &QueryPlan, row: &PlannedRow, conflict: &[&ColumnDef]) -> Statement {
    let mut stmt = Statement::default();
    stmt.push_insert_head(plan.table, row);
    if !row.is_empty() {
        let target: Vec<String> = conflict.iter().map(|c| quote_ident(c.name)).collect();
        let mut assignments: Vec<String> = row
            .iter()
            .filter(|(c, _)| !conflict.iter().any(|k| k.name == c.name))
            .map(|(c, _)| format!("{0} = excluded.{0}", quote_ident(c.name)))
            .collect();
        if assignments.is_empty() {
            assignments.push(format!("{0} = excluded.{0}", target[0]));
        }
        stmt.push(" ON CONFLICT (")
            .push(&target.join(", "))
            .push(") DO UPDATE SET ")
            .push(&assignments.join(", "));
    }
    stmt.push_returning(&plan.projection);
    stmt
}

/// `UPDATE … SET … WHERE … RETURNING …`
pub(crate) fn update(plan: &QueryPlan, values: &PlannedRow) -> Statement {
    let mut stmt = Statement::default();
    stmt.push("UPDATE ")
        .push(&quote_ident(plan.table.name))
        .push(" SET ");
    for (i, (column, value)) in values.iter().enumerate() {
        if i > 0 {
            stmt.push(", ");
        }
        stmt.push(&quote_ident(column.name)).push(" = ");
        stmt.bind(to_sql_value(column, value));
    }
    stmt.push_filters(&plan.filters);
    stmt.push_returning(&plan.projection);
    stmt
}

/// `DELETE FROM … WHERE … RETURNING …`
pub(crate) fn delete(plan: &QueryPlan) -> Statement {
    let mut stmt = Statement::default();
    stmt.push("DELETE FROM ").push(&quote_ident(plan.table.name));
    stmt.push_filters(&plan.filters);
    stmt.push_returning(&plan.projection);
    stmt
}
