//! SQL schema generation from the table registry.
//!
//! Generates `CREATE TABLE` and `CREATE INDEX` statements for every table
//! in a [`SchemaRegistry`], plus the matching `DROP` statements. All
//! identifiers come from the registry (validated to be plain lowercase
//! identifiers) and are double-quoted on output.
//!
//! # Table structure
//!
//! One SQL table per registered table, with:
//!
//! - column types from [`ColumnType::sql_type`](portal_core::ColumnType::sql_type)
//! - `PRIMARY KEY`, `NOT NULL`, `UNIQUE` and `DEFAULT` from the column flags
//! - a table-level `UNIQUE (…)` per composite unique group, so those groups
//!   can serve as upsert conflict targets
//! - a lookup index on each registered column ending in `_id`

use portal_core::{ColumnDef, SchemaRegistry, TableSchema, validate_registry};

use crate::error::{Result, SqliteError};

/// Quotes an identifier for interpolation into SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Checks that every identifier in the registry is safe to interpolate.
pub(crate) fn ensure_valid_registry(registry: &SchemaRegistry) -> Result<()> {
    let errors = validate_registry(registry);
    if errors.is_empty() {
        return Ok(());
    }
    let joined = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    Err(SqliteError::InvalidRegistry(joined))
}

fn column_sql(column: &ColumnDef) -> String {
    let mut sql = format!("{} {}", quote_ident(column.name), column.ty.sql_type());
    if column.primary_key {
        sql.push_str(" PRIMARY KEY");
    }
    if !column.nullable && !column.primary_key {
        sql.push_str(" NOT NULL");
    }
    if column.unique && !column.primary_key {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(default);
    }
    sql
}

fn table_sql(table: &TableSchema) -> String {
    let mut parts: Vec<String> = table.columns.iter().map(column_sql).collect();
    for group in table.unique_together {
        let cols: Vec<String> = group.iter().map(|c| quote_ident(c)).collect();
        parts.push(format!("UNIQUE ({})", cols.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);\n",
        quote_ident(table.name),
        parts.join(",\n    ")
    )
}

fn index_sql(table: &TableSchema) -> String {
    table
        .columns
        .iter()
        .filter(|c| c.name.ends_with("_id") && !c.primary_key && !c.unique)
        .map(|c| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}({});\n",
                quote_ident(&format!("idx_{}_{}", table.name, c.name)),
                quote_ident(table.name),
                quote_ident(c.name)
            )
        })
        .collect()
}

/// Generates the complete SQL schema for every table in the registry.
///
/// # Errors
///
/// Returns [`SqliteError::InvalidRegistry`] if any identifier in the
/// registry fails validation.
pub fn generate_schema_sql(registry: &SchemaRegistry) -> Result<String> {
    ensure_valid_registry(registry)?;

    let mut sql = String::new();
    for table in registry.tables() {
        sql.push_str(&table_sql(table));
    }
    for table in registry.tables() {
        sql.push_str(&index_sql(table));
    }
    Ok(sql)
}

/// Generates SQL to drop every registered table, in reverse declaration order.
///
/// # Errors
///
/// Returns [`SqliteError::InvalidRegistry`] if the registry is invalid.
pub fn generate_drop_sql(registry: &SchemaRegistry) -> Result<String> {
    ensure_valid_registry(registry)?;

    Ok(registry
        .tables()
        .iter()
        .rev()
        .map(|t| format!("DROP TABLE IF EXISTS {};\n", quote_ident(t.name)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_core::{ColumnDef, TableSchema};

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plans"), "\"plans\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_generate_schema_sql_contains_tables() {
        let sql = generate_schema_sql(SchemaRegistry::portal()).unwrap();
        for table in SchemaRegistry::portal().tables() {
            assert!(
                sql.contains(&format!("CREATE TABLE IF NOT EXISTS \"{}\"", table.name)),
                "missing {}",
                table.name
            );
        }
    }

    #[test]
    fn test_generate_schema_sql_column_constraints() {
        let sql = generate_schema_sql(SchemaRegistry::portal()).unwrap();
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY"));
        assert!(sql.contains("\"slug\" TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("\"sort_order\" INTEGER NOT NULL DEFAULT 0"));
        assert!(sql.contains("UNIQUE (\"plan_id\", \"feature\")"));
    }

    #[test]
    fn test_generate_schema_sql_contains_indexes() {
        let sql = generate_schema_sql(SchemaRegistry::portal()).unwrap();
        assert!(sql.contains("\"idx_invoices_client_id\""));
        assert!(sql.contains("\"idx_work_orders_client_id\""));
        assert!(sql.contains("\"idx_clients_user_id\""));
    }

    #[test]
    fn test_generate_drop_sql_reverse_order() {
        let sql = generate_drop_sql(SchemaRegistry::portal()).unwrap();
        let users = sql.find("DROP TABLE IF EXISTS \"users\"").unwrap();
        let settings = sql.find("DROP TABLE IF EXISTS \"site_settings\"").unwrap();
        assert!(settings < users);
    }

    static BAD_COLUMNS: [ColumnDef; 1] = [ColumnDef::text("x\"; DROP TABLE users; --")];
    static BAD_TABLES: [TableSchema; 1] = [TableSchema::new("bad", &BAD_COLUMNS)];

    #[test]
    fn test_invalid_registry_is_rejected() {
        let registry = SchemaRegistry::new(&BAD_TABLES);
        assert!(matches!(
            generate_schema_sql(&registry),
            Err(SqliteError::InvalidRegistry(_))
        ));
        assert!(generate_drop_sql(&registry).is_err());
    }

    #[test]
    fn test_schema_sql_executes() {
        let sql = generate_schema_sql(SchemaRegistry::portal()).unwrap();
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&sql).unwrap();
        conn.execute_batch(&sql).unwrap();

        conn.execute("INSERT INTO plans (name, slug) VALUES ('A', 'a')", [])
            .unwrap();
        let (kind, sort, active): (String, i64, i64) = conn
            .query_row(
                "SELECT type, sort_order, is_active FROM plans WHERE slug = 'a'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(kind, "residencial");
        assert_eq!(sort, 0);
        assert_eq!(active, 1);

        assert!(
            conn.execute("INSERT INTO plans (name, slug) VALUES ('B', 'a')", [])
                .is_err()
        );
    }
}
