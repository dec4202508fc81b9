//! Static table catalog for the portal data API.
//!
//! Every table the API can touch is declared here with an ordered list of
//! typed columns. The registry is the only catalog in the system: requests
//! naming a table that is not registered are rejected, and column names
//! that a table does not declare are dropped before anything reaches the
//! store.
//!
//! # Examples
//!
//! ```
//! use portal_core::{ColumnType, SchemaRegistry};
//!
//! let registry = SchemaRegistry::portal();
//! let plans = registry.get("plans").unwrap();
//! assert_eq!(plans.primary_key().unwrap().name, "id");
//! assert_eq!(plans.column("price").unwrap().ty, ColumnType::Real);
//! assert!(registry.get("pg_catalog").is_none());
//! ```

use serde::Serialize;

/// Storage type of a registered column.
///
/// Drives both the SQL column declaration and the conversion between JSON
/// request values and stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// Double precision float.
    Real,
    /// Stored as `0`/`1`, surfaced as JSON `true`/`false`.
    Boolean,
    /// Arbitrary JSON, stored as serialized text.
    Json,
    /// ISO-8601 timestamp text.
    Timestamp,
}

impl ColumnType {
    /// SQL type name used in `CREATE TABLE`.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text | ColumnType::Json | ColumnType::Timestamp => "TEXT",
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

/// A single column declaration.
///
/// Built with the `const` constructors so whole tables can live in
/// `static` items:
///
/// ```
/// use portal_core::ColumnDef;
///
/// const SLUG: ColumnDef = ColumnDef::text("slug").not_null().unique();
/// assert!(SLUG.unique);
/// assert!(!SLUG.nullable);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: &'static str,
    /// Storage type.
    pub ty: ColumnType,
    /// Whether this column is the table's primary key.
    pub primary_key: bool,
    /// Whether `NULL` is accepted.
    pub nullable: bool,
    /// Whether values must be unique across rows.
    pub unique: bool,
    /// SQL default expression, emitted verbatim into DDL.
    pub default: Option<&'static str>,
}

impl ColumnDef {
    /// Creates a nullable column of the given type.
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            primary_key: false,
            nullable: true,
            unique: false,
            default: None,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub const fn real(name: &'static str) -> Self {
        Self::new(name, ColumnType::Real)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    pub const fn json(name: &'static str) -> Self {
        Self::new(name, ColumnType::Json)
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self::new(name, ColumnType::Timestamp)
    }

    /// Integer primary key assigned by the store on insert.
    pub const fn id() -> Self {
        Self::integer("id").primary_key()
    }

    /// Marks the column as primary key (implies `NOT NULL`).
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the SQL default expression (e.g. `"0"` or `"(datetime('now'))"`).
    pub const fn default_sql(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }
}

/// A registered table: name, ordered columns, and composite unique groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    /// Table name as used on the wire and in SQL.
    pub name: &'static str,
    /// Columns in declaration order; this is also the default projection order.
    pub columns: &'static [ColumnDef],
    /// Column groups that must be unique together (usable as upsert targets).
    pub unique_together: &'static [&'static [&'static str]],
}

impl TableSchema {
    /// Declares a table with no composite unique groups.
    pub const fn new(name: &'static str, columns: &'static [ColumnDef]) -> Self {
        Self {
            name,
            columns,
            unique_together: &[],
        }
    }

    pub const fn with_unique_together(
        mut self,
        groups: &'static [&'static [&'static str]],
    ) -> Self {
        self.unique_together = groups;
        self
    }

    /// Looks up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Returns the primary key column, if the table declares one.
    pub fn primary_key(&self) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}

/// Ordered, immutable set of [`TableSchema`]s.
///
/// Construct one explicitly with [`SchemaRegistry::new`] (tests do this with
/// their own `static` tables) or use [`SchemaRegistry::portal`] for the
/// tables the portal ships with.
#[derive(Debug, Clone, Copy)]
pub struct SchemaRegistry {
    tables: &'static [TableSchema],
}

impl SchemaRegistry {
    pub const fn new(tables: &'static [TableSchema]) -> Self {
        Self { tables }
    }

    /// The built-in catalog of portal tables.
    pub fn portal() -> &'static SchemaRegistry {
        &PORTAL_REGISTRY
    }

    /// Looks up a table by exact name.
    pub fn get(&self, table: &str) -> Option<&'static TableSchema> {
        self.tables.iter().find(|t| t.name == table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.get(table).is_some()
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> &'static [TableSchema] {
        self.tables
    }
}

const CREATED_AT: ColumnDef = ColumnDef::timestamp("created_at")
    .not_null()
    .default_sql("(strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))");
const UPDATED_AT: ColumnDef = ColumnDef::timestamp("updated_at")
    .not_null()
    .default_sql("(strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))");

static USERS: [ColumnDef; 6] = [
    ColumnDef::id(),
    ColumnDef::text("email").not_null().unique(),
    ColumnDef::text("full_name"),
    ColumnDef::text("role").not_null().default_sql("'client'"),
    ColumnDef::boolean("is_active").not_null().default_sql("1"),
    CREATED_AT,
];

static PLANS: [ColumnDef; 13] = [
    ColumnDef::id(),
    ColumnDef::text("name").not_null(),
    ColumnDef::text("slug").not_null().unique(),
    ColumnDef::text("type").not_null().default_sql("'residencial'"),
    ColumnDef::integer("speed_mbps"),
    ColumnDef::real("price"),
    ColumnDef::text("description"),
    ColumnDef::json("features"),
    ColumnDef::boolean("is_featured").not_null().default_sql("0"),
    ColumnDef::boolean("is_active").not_null().default_sql("1"),
    ColumnDef::integer("sort_order").not_null().default_sql("0"),
    CREATED_AT,
    UPDATED_AT,
];

// No primary key: rows are addressed by (plan_id, feature).
static PLAN_FEATURES: [ColumnDef; 4] = [
    ColumnDef::integer("plan_id").not_null(),
    ColumnDef::text("feature").not_null(),
    ColumnDef::text("icon"),
    ColumnDef::integer("sort_order").not_null().default_sql("0"),
];

static BLOG_POSTS: [ColumnDef; 12] = [
    ColumnDef::id(),
    ColumnDef::text("slug").not_null().unique(),
    ColumnDef::text("title").not_null(),
    ColumnDef::text("excerpt"),
    ColumnDef::text("content"),
    ColumnDef::text("cover_image"),
    ColumnDef::text("author"),
    ColumnDef::json("tags"),
    ColumnDef::boolean("published").not_null().default_sql("0"),
    ColumnDef::timestamp("published_at"),
    CREATED_AT,
    UPDATED_AT,
];

static POPUPS: [ColumnDef; 11] = [
    ColumnDef::id(),
    ColumnDef::text("title").not_null(),
    ColumnDef::text("content"),
    ColumnDef::text("image_url"),
    ColumnDef::text("cta_label"),
    ColumnDef::text("cta_url"),
    ColumnDef::boolean("is_active").not_null().default_sql("0"),
    ColumnDef::timestamp("starts_at"),
    ColumnDef::timestamp("ends_at"),
    ColumnDef::integer("display_delay_seconds").not_null().default_sql("0"),
    CREATED_AT,
];

static CLIENTS: [ColumnDef; 10] = [
    ColumnDef::id(),
    ColumnDef::integer("user_id"),
    ColumnDef::text("full_name").not_null(),
    ColumnDef::text("document_id").unique(),
    ColumnDef::text("email"),
    ColumnDef::text("phone"),
    ColumnDef::text("address"),
    ColumnDef::integer("plan_id"),
    ColumnDef::text("status").not_null().default_sql("'active'"),
    CREATED_AT,
];

static INVOICES: [ColumnDef; 8] = [
    ColumnDef::id(),
    ColumnDef::integer("client_id").not_null(),
    ColumnDef::text("period").not_null(),
    ColumnDef::real("amount").not_null(),
    ColumnDef::timestamp("due_date"),
    ColumnDef::text("status").not_null().default_sql("'pending'"),
    ColumnDef::timestamp("paid_at"),
    CREATED_AT,
];

static WORK_ORDERS: [ColumnDef; 9] = [
    ColumnDef::id(),
    ColumnDef::integer("client_id").not_null(),
    ColumnDef::text("kind").not_null(),
    ColumnDef::text("description"),
    ColumnDef::text("status").not_null().default_sql("'open'"),
    ColumnDef::timestamp("scheduled_for"),
    ColumnDef::text("technician"),
    CREATED_AT,
    UPDATED_AT,
];

static SITE_SETTINGS: [ColumnDef; 3] = [
    ColumnDef::text("key").primary_key(),
    ColumnDef::json("value"),
    UPDATED_AT,
];

static PORTAL_TABLES: [TableSchema; 9] = [
    TableSchema::new("users", &USERS),
    TableSchema::new("plans", &PLANS),
    TableSchema::new("plan_features", &PLAN_FEATURES)
        .with_unique_together(&[&["plan_id", "feature"]]),
    TableSchema::new("blog_posts", &BLOG_POSTS),
    TableSchema::new("popups", &POPUPS),
    TableSchema::new("clients", &CLIENTS),
    TableSchema::new("invoices", &INVOICES),
    TableSchema::new("work_orders", &WORK_ORDERS),
    TableSchema::new("site_settings", &SITE_SETTINGS),
];

static PORTAL_REGISTRY: SchemaRegistry = SchemaRegistry::new(&PORTAL_TABLES);
