//! Store-independent planning of query descriptors.
//!
//! [`QueryPlan::build`] resolves a [`QueryDescriptor`] against a
//! [`SchemaRegistry`]: it rejects unknown tables, drops every column name the
//! table does not declare, resolves the upsert conflict target, and decides
//! the response row shape. The resulting plan only references registered
//! [`ColumnDef`]s, so a backend translating it to SQL never sees a name that
//! came straight from the request.
//!
//! # Sharp edge
//!
//! Update and delete plans with no filters target every row of the table.
//! Callers rely on this for bulk writes (e.g. re-ordering every plan), so it
//! is preserved as-is. Because unknown filter columns are dropped, a
//! descriptor whose only filter names a misspelled column also becomes a
//! whole-table write.

use serde_json::Value;

use crate::descriptor::{Action, FilterOp, QueryDescriptor, Row};
use crate::error::{QueryError, Result};
use crate::registry::{ColumnDef, SchemaRegistry, TableSchema};

/// How the executor must shape returned rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape {
    /// A JSON array of rows.
    Many,
    /// Exactly one row object; zero rows is [`QueryError::NoRows`].
    Single,
    /// One row object or `null`.
    MaybeSingle,
}

impl RowShape {
    fn from_flags(single: bool, maybe_single: bool) -> Self {
        if single {
            RowShape::Single
        } else if maybe_single {
            RowShape::MaybeSingle
        } else {
            RowShape::Many
        }
    }

    /// Shapes a list of rows; more than one row under a scalar shape yields
    /// the first.
    pub fn apply(self, rows: Vec<Value>) -> Result<Value> {
        match self {
            RowShape::Many => Ok(Value::Array(rows)),
            RowShape::Single => rows.into_iter().next().ok_or(QueryError::NoRows),
            RowShape::MaybeSingle => Ok(rows.into_iter().next().unwrap_or(Value::Null)),
        }
    }
}

/// A filter whose column has been resolved against the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedFilter {
    pub column: &'static ColumnDef,
    pub op: FilterOp,
    pub value: Value,
}

/// A sort key whose column has been resolved against the registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedOrder {
    pub column: &'static ColumnDef,
    pub ascending: bool,
}

/// A sanitized row: only registered columns, in submission order.
pub type PlannedRow = Vec<(&'static ColumnDef, Value)>;

/// Action-specific part of a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanKind {
    Select,
    Insert {
        rows: Vec<PlannedRow>,
    },
    Update {
        values: PlannedRow,
    },
    Delete,
    Upsert {
        rows: Vec<PlannedRow>,
        conflict: Vec<&'static ColumnDef>,
    },
}

/// A validated, sanitized descriptor ready for a storage backend.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub table: &'static TableSchema,
    pub kind: PlanKind,
    /// Projection for selects and `RETURNING` projection for mutations.
    /// Never empty: an absent or fully-unknown projection expands to every
    /// column.
    pub projection: Vec<&'static ColumnDef>,
    pub filters: Vec<PlannedFilter>,
    pub order: Vec<PlannedOrder>,
    pub limit: Option<u64>,
    pub shape: RowShape,
}

impl QueryPlan {
    /// Plans `desc` against `registry`.
    ///
    /// # Errors
    ///
    /// - [`QueryError::UnknownTable`] if the table is not registered.
    /// - [`QueryError::MissingValues`] for insert/update/upsert without
    ///   values, or an update whose values are all unknown columns.
    /// - [`QueryError::MissingConflictTarget`] for an upsert with no usable
    ///   conflict column.
    pub fn build(desc: &QueryDescriptor, registry: &SchemaRegistry) -> Result<Self> {
        let table = registry
            .get(&desc.table)
            .ok_or_else(|| QueryError::UnknownTable(desc.table.clone()))?;

        let kind = match desc.action {
            Action::Select => PlanKind::Select,
            Action::Delete => PlanKind::Delete,
            Action::Insert => PlanKind::Insert {
                rows: sanitize_rows(table, desc)?,
            },
            Action::Update => {
                let rows = sanitize_rows(table, desc)?;
                // An update applies one value set; extra rows are ignored.
                let values = rows.into_iter().next().unwrap_or_default();
                if values.is_empty() {
                    return Err(QueryError::MissingValues(Action::Update));
                }
                PlanKind::Update { values }
            }
            Action::Upsert => {
                let conflict = conflict_target(table, desc.on_conflict.as_deref())?;
                PlanKind::Upsert {
                    rows: sanitize_rows(table, desc)?,
                    conflict,
                }
            }
        };

        let requested = if desc.action.is_mutation() {
            desc.returning.as_deref()
        } else {
            desc.columns.as_deref()
        };

        Ok(Self {
            table,
            kind,
            projection: projection(table, requested),
            filters: filters(table, desc),
            order: desc
                .order
                .iter()
                .filter_map(|o| {
                    table.column(&o.column).map(|column| PlannedOrder {
                        column,
                        ascending: o.ascending,
                    })
                })
                .collect(),
            limit: desc.limit,
            shape: RowShape::from_flags(desc.single, desc.maybe_single),
        })
    }

    pub fn action(&self) -> Action {
        match self.kind {
            PlanKind::Select => Action::Select,
            PlanKind::Insert { .. } => Action::Insert,
            PlanKind::Update { .. } => Action::Update,
            PlanKind::Delete => Action::Delete,
            PlanKind::Upsert { .. } => Action::Upsert,
        }
    }

    /// Returns `true` for an update or delete that will touch every row.
    pub fn targets_whole_table(&self) -> bool {
        matches!(self.kind, PlanKind::Update { .. } | PlanKind::Delete) && self.filters.is_empty()
    }
}

/// Keeps only registered columns of a row, preserving submission order.
pub fn sanitize_row(table: &TableSchema, row: &Row) -> PlannedRow {
    row.iter()
        .filter_map(|(name, value)| table.column(name).map(|c| (c, value.clone())))
        .collect()
}

fn sanitize_rows(table: &TableSchema, desc: &QueryDescriptor) -> Result<Vec<PlannedRow>> {
    let values = desc
        .values
        .as_ref()
        .ok_or(QueryError::MissingValues(desc.action))?;
    Ok(values.rows().iter().map(|row| sanitize_row(table, row)).collect())
}

fn projection(table: &TableSchema, requested: Option<&[String]>) -> Vec<&'static ColumnDef> {
    let mut columns: Vec<&'static ColumnDef> = Vec::new();
    for name in requested.unwrap_or_default() {
        let name = name.trim();
        if name == "*" {
            return table.columns.iter().collect();
        }
        if let Some(column) = table.column(name) {
            if !columns.iter().any(|c| c.name == column.name) {
                columns.push(column);
            }
        }
    }
    if columns.is_empty() {
        table.columns.iter().collect()
    } else {
        columns
    }
}

fn filters(table: &TableSchema, desc: &QueryDescriptor) -> Vec<PlannedFilter> {
    desc.filters
        .iter()
        .filter_map(|f| {
            table.column(&f.column).map(|column| PlannedFilter {
                column,
                op: f.op,
                value: f.value.clone(),
            })
        })
        .collect()
}

/// Resolves the upsert conflict target.
///
/// An explicit `on_conflict` is a comma-separated column list and must name
/// only registered columns; a list with any unknown name is rejected as a
/// whole. The primary key is used only when `on_conflict` is absent.
fn conflict_target(
    table: &'static TableSchema,
    on_conflict: Option<&str>,
) -> Result<Vec<&'static ColumnDef>> {
    let missing = || QueryError::MissingConflictTarget(table.name.to_string());
    let Some(on_conflict) = on_conflict else {
        return table.primary_key().map(|pk| vec![pk]).ok_or_else(missing);
    };

    let mut columns: Vec<&'static ColumnDef> = Vec::new();
    for name in on_conflict.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let column = table.column(name).ok_or_else(missing)?;
        if !columns.iter().any(|c| c.name == column.name) {
            columns.push(column);
        }
    }
    if columns.is_empty() {
        return Err(missing());
    }
    Ok(columns)
}
