//! Fluent construction of query descriptors.
//!
//! A [`QueryBuilder`] starts as a read of every column. Calling one of the
//! write methods switches its action; after that, [`select`](QueryBuilder::select)
//! names the columns the write should return instead of starting a read:
//!
//! ```
//! use portal_client::PortalClient;
//! use portal_core::Action;
//! use serde_json::json;
//!
//! let client = PortalClient::new("http://127.0.0.1:8787");
//!
//! let read = client.from("plans").select("id, name");
//! assert_eq!(read.descriptor().action, Action::Select);
//! assert_eq!(read.descriptor().columns, Some(vec!["id".into(), "name".into()]));
//!
//! let write = client
//!     .from("plans")
//!     .insert(json!({"name": "Fibra 1G", "slug": "fibra-1g"}))
//!     .select("id");
//! assert_eq!(write.descriptor().action, Action::Insert);
//! assert_eq!(write.descriptor().returning, Some(vec!["id".into()]));
//! assert_eq!(write.descriptor().columns, None);
//! ```
//!
//! Builders are futures: `.await` sends the descriptor and yields the
//! [`Envelope`].

use std::future::{Future, IntoFuture};
use std::pin::Pin;

use portal_core::{Action, Envelope, Filter, FilterOp, Order, QueryDescriptor, QueryError, Values};
use serde::Serialize;
use serde_json::Value;

use crate::client::PortalClient;

/// Where the columns given to [`QueryBuilder::select`] go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectTarget {
    /// Read projection of a select.
    Projection,
    /// Rows handed back by a write.
    Returning,
}

impl SelectTarget {
    fn for_action(action: Action) -> Self {
        if action.is_mutation() {
            SelectTarget::Returning
        } else {
            SelectTarget::Projection
        }
    }
}

/// Parses a comma-separated column list. `*` (or nothing) means every column.
fn parse_columns(columns: &str) -> Option<Vec<String>> {
    let names: Vec<String> = columns
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect();
    if names.is_empty() || names.iter().any(|name| name == "*") {
        None
    } else {
        Some(names)
    }
}

/// A query under construction against one table.
#[must_use = "a query builder does nothing until it is awaited or executed"]
#[derive(Debug, Clone)]
pub struct QueryBuilder<'a> {
    client: &'a PortalClient,
    desc: QueryDescriptor,
    /// Set when the builder was given something it cannot send.
    invalid: Option<String>,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(client: &'a PortalClient, table: String) -> Self {
        Self {
            client,
            desc: QueryDescriptor::new(table, Action::Select),
            invalid: None,
        }
    }

    /// Sets the read projection, or the returning projection once a write
    /// action has been chosen.
    pub fn select(self, columns: &str) -> Self {
        let columns = parse_columns(columns);
        match SelectTarget::for_action(self.desc.action) {
            SelectTarget::Projection => self.set_projection(columns),
            SelectTarget::Returning => self.set_returning(columns),
        }
    }

    fn set_projection(mut self, columns: Option<Vec<String>>) -> Self {
        self.desc.columns = columns;
        self
    }

    fn set_returning(mut self, columns: Option<Vec<String>>) -> Self {
        self.desc.returning = columns;
        self
    }

    /// Inserts one row (a JSON object or struct) or many (an array).
    pub fn insert(self, values: impl Serialize) -> Self {
        self.write(Action::Insert, values)
    }

    /// Updates the rows matched by the filters. Without filters every row
    /// of the table is updated.
    pub fn update(self, values: impl Serialize) -> Self {
        self.write(Action::Update, values)
    }

    /// Inserts, or overwrites the submitted fields of the row that
    /// conflicts on [`on_conflict`](Self::on_conflict) (primary key by
    /// default).
    pub fn upsert(self, values: impl Serialize) -> Self {
        self.write(Action::Upsert, values)
    }

    /// Deletes the rows matched by the filters. Without filters every row
    /// of the table is deleted.
    pub fn delete(mut self) -> Self {
        self.switch_action(Action::Delete);
        self
    }

    fn write(mut self, action: Action, values: impl Serialize) -> Self {
        self.switch_action(action);
        match serde_json::to_value(values).and_then(serde_json::from_value::<Values>) {
            Ok(values) => self.desc.values = Some(values),
            Err(_) => {
                self.invalid = Some(format!(
                    "{action} values must be an object or an array of objects"
                ));
            }
        }
        self
    }

    /// A projection chosen before the write becomes the returning projection.
    fn switch_action(&mut self, action: Action) {
        if !self.desc.action.is_mutation() {
            if let Some(columns) = self.desc.columns.take() {
                self.desc.returning.get_or_insert(columns);
            }
        }
        self.desc.action = action;
    }

    /// Comma-separated conflict columns for [`upsert`](Self::upsert).
    pub fn on_conflict(mut self, columns: &str) -> Self {
        self.desc.on_conflict = Some(columns.to_string());
        self
    }

    fn filter(mut self, op: FilterOp, column: &str, value: Value) -> Self {
        self.desc.filters.push(Filter::new(op, column, value));
        self
    }

    /// `column = value`; a `null` value matches `IS NULL`.
    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(FilterOp::Eq, column, value.into())
    }

    /// `column IN (values…)`; an empty list matches nothing.
    pub fn in_<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.filter(FilterOp::In, column, Value::Array(values))
    }

    /// `column >= value`
    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(FilterOp::Gte, column, value.into())
    }

    /// `column < value`
    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(FilterOp::Lt, column, value.into())
    }

    /// Adds a sort key; keys apply in the order they are added.
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.desc.order.push(Order::new(column, ascending));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.desc.limit = Some(limit);
        self
    }

    /// Expects exactly one row; zero rows is an error.
    pub fn single(mut self) -> Self {
        self.desc.single = true;
        self
    }

    /// Expects zero or one row; zero rows yields `null` data.
    pub fn maybe_single(mut self) -> Self {
        self.desc.maybe_single = true;
        self
    }

    /// The descriptor that will be sent.
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.desc
    }

    pub fn into_descriptor(self) -> QueryDescriptor {
        self.desc
    }

    /// Sends the query. Equivalent to awaiting the builder.
    pub async fn execute(self) -> Envelope {
        if let Some(message) = self.invalid {
            return Envelope::err(&QueryError::Malformed(message));
        }
        self.client.execute(&self.desc).await
    }
}

impl<'a> IntoFuture for QueryBuilder<'a> {
    type Output = Envelope;
    type IntoFuture = Pin<Box<dyn Future<Output = Envelope> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.execute())
    }
}
