//! Core types for the ISP portal data API.
//!
//! The portal front end performs filtered and ordered CRUD against a fixed
//! set of tables through one generic endpoint. This crate defines the
//! store-independent half of that boundary:
//!
//! - [`SchemaRegistry`] - the static table → typed column catalog.
//! - [`QueryDescriptor`] - the serializable request (`table`, `action`,
//!   projection, filters, ordering, limit, row shape, conflict target).
//! - [`QueryPlan`] - a descriptor validated and sanitized against the
//!   registry; unknown tables are rejected, unknown columns dropped.
//! - [`Envelope`] - the `{ data, error }` response shape.
//! - [`QueryError`] - the complete error taxonomy.
//!
//! Storage backends (see `portal-sqlite`) only ever consume a
//! [`QueryPlan`], never a raw descriptor.
//!
//! # Example
//!
//! ```
//! use portal_core::*;
//! use serde_json::json;
//!
//! let desc: QueryDescriptor = serde_json::from_value(json!({
//!     "table": "plans",
//!     "action": "insert",
//!     "values": {"name": "Fibra 600", "slug": "fibra-600", "role": "admin"}
//! })).unwrap();
//!
//! let plan = QueryPlan::build(&desc, SchemaRegistry::portal()).unwrap();
//! let PlanKind::Insert { rows } = &plan.kind else { unreachable!() };
//! // `role` is not a column of `plans`, so it never reaches the store.
//! assert_eq!(rows[0].len(), 2);
//! ```

mod descriptor;
mod envelope;
mod error;
mod plan;
mod registry;
mod validate;

pub use descriptor::{Action, Filter, FilterOp, Order, QueryDescriptor, Row, Values};
pub use envelope::{Envelope, ErrorBody};
pub use error::{ErrorKind, NO_ROWS_MESSAGE, QueryError, Result};
pub use plan::{
    PlanKind, PlannedFilter, PlannedOrder, PlannedRow, QueryPlan, RowShape, sanitize_row,
};
pub use registry::{ColumnDef, ColumnType, SchemaRegistry, TableSchema};
pub use validate::{RegistryError, is_valid_identifier, validate_registry};
