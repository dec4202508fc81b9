//! Wire format of a data API request.
//!
//! A [`QueryDescriptor`] describes exactly one CRUD operation against one
//! table. It is a plain value object: built per request (by hand, or by the
//! fluent client), sent as JSON, planned, executed, and dropped.
//!
//! ```
//! use portal_core::{Action, FilterOp, QueryDescriptor};
//!
//! let desc: QueryDescriptor = serde_json::from_str(r#"{
//!     "table": "plans",
//!     "action": "select",
//!     "filters": [{"op": "eq", "column": "type", "value": "residencial"}],
//!     "order": [{"column": "sort_order", "ascending": true}]
//! }"#).unwrap();
//!
//! assert_eq!(desc.action, Action::Select);
//! assert_eq!(desc.filters[0].op, FilterOp::Eq);
//! assert!(!desc.single && !desc.maybe_single);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object submitted as a row.
pub type Row = Map<String, Value>;

/// The operation a descriptor performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
    Upsert,
}

impl Action {
    /// Returns `true` for every action other than [`Action::Select`].
    pub fn is_mutation(self) -> bool {
        !matches!(self, Action::Select)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Select => "select",
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Upsert => "upsert",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a [`Filter`].
///
/// This is deliberately a narrow subset: filters combine with AND only, and
/// there is no grouping or negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// `column = value` (`IS NULL` when the value is `null`).
    Eq,
    /// `column IN (values…)`.
    In,
    /// `column >= value`.
    Gte,
    /// `column < value`.
    Lt,
}

/// One predicate; all filters of a descriptor are AND-combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub op: FilterOp,
    pub column: String,
    #[serde(default)]
    pub value: Value,
}

impl Filter {
    pub fn new(op: FilterOp, column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            op,
            column: column.into(),
            value: value.into(),
        }
    }
}

/// One sort key; the first entry is the primary key of the sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub column: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl Order {
    pub fn new(column: impl Into<String>, ascending: bool) -> Self {
        Self {
            column: column.into(),
            ascending,
        }
    }
}

/// Rows submitted with a write: a single object or an array of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values {
    Many(Vec<Row>),
    One(Row),
}

impl Values {
    /// Flattens into a list of rows.
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Values::Many(rows) => rows,
            Values::One(row) => vec![row],
        }
    }

    pub fn rows(&self) -> &[Row] {
        match self {
            Values::Many(rows) => rows,
            Values::One(row) => std::slice::from_ref(row),
        }
    }

    /// Returns `true` when the caller submitted an array rather than one object.
    pub fn is_many(&self) -> bool {
        matches!(self, Values::Many(_))
    }
}

impl From<Row> for Values {
    fn from(row: Row) -> Self {
        Values::One(row)
    }
}

impl From<Vec<Row>> for Values {
    fn from(rows: Vec<Row>) -> Self {
        Values::Many(rows)
    }
}

/// A serializable request for one CRUD operation against one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescriptor {
    /// Target table; must be registered.
    pub table: String,
    pub action: Action,
    /// Read projection; `None` selects every column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    /// Projection of rows returned by a mutation; `None` returns every column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returning: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Values>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order: Vec<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Demand exactly one row; zero rows is an error.
    #[serde(default)]
    pub single: bool,
    /// Accept zero or one row; zero rows yields `null`.
    #[serde(default)]
    pub maybe_single: bool,
    /// Comma-separated conflict target for upserts; defaults to the primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_conflict: Option<String>,
}

impl QueryDescriptor {
    /// A descriptor with no projection, filters, ordering, or values.
    pub fn new(table: impl Into<String>, action: Action) -> Self {
        Self {
            table: table.into(),
            action,
            ..Self::default()
        }
    }
}
