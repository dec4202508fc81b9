//! Registry validation.
//!
//! Table and column names from the registry are interpolated into SQL as
//! quoted identifiers, so they must be plain lowercase identifiers. This
//! module checks that invariant along with the structural rules the query
//! planner relies on (unique names, at most one primary key, composite
//! unique groups that reference real columns).
//!
//! # Examples
//!
//! ```
//! use portal_core::*;
//!
//! assert!(validate_registry(SchemaRegistry::portal()).is_empty());
//!
//! static BAD_COLUMNS: [ColumnDef; 1] = [ColumnDef::text("drop;--")];
//! static BAD_TABLES: [TableSchema; 1] = [TableSchema::new("t", &BAD_COLUMNS)];
//! static BAD: SchemaRegistry = SchemaRegistry::new(&BAD_TABLES);
//! assert!(!validate_registry(&BAD).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::{SchemaRegistry, TableSchema};

/// Structural problems found in a [`SchemaRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Table name is not a plain lowercase identifier.
    #[error("invalid table name: {0}")]
    InvalidTableName(String),
    /// Column name is not a plain lowercase identifier.
    #[error("invalid column name: {0}.{1}")]
    InvalidColumnName(String, String),
    /// Two tables share a name.
    #[error("duplicate table: {0}")]
    DuplicateTable(String),
    /// Two columns in one table share a name.
    #[error("duplicate column: {0}.{1}")]
    DuplicateColumn(String, String),
    /// A table declares more than one primary key column.
    #[error("table {0} declares more than one primary key")]
    MultiplePrimaryKeys(String),
    /// A table declares no columns.
    #[error("table {0} has no columns")]
    EmptyTable(String),
    /// A composite unique group names a column the table does not have.
    #[error("unique group on {0} references unknown column {1}")]
    UnknownUniqueColumn(String, String),
}

/// Returns `true` if `name` matches `[a-z_][a-z0-9_]*`.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Validates every table in the registry.
///
/// Returns all problems found; an empty vector means the registry is safe
/// to hand to the planner and the DDL generator.
pub fn validate_registry(registry: &SchemaRegistry) -> Vec<RegistryError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for table in registry.tables() {
        if !seen.insert(table.name) {
            errors.push(RegistryError::DuplicateTable(table.name.to_string()));
        }
        validate_table(table, &mut errors);
    }

    errors
}

fn validate_table(table: &TableSchema, errors: &mut Vec<RegistryError>) {
    if !is_valid_identifier(table.name) {
        errors.push(RegistryError::InvalidTableName(table.name.to_string()));
    }
    if table.columns.is_empty() {
        errors.push(RegistryError::EmptyTable(table.name.to_string()));
    }

    let mut seen = HashSet::new();
    for column in table.columns {
        if !is_valid_identifier(column.name) {
            errors.push(RegistryError::InvalidColumnName(
                table.name.to_string(),
                column.name.to_string(),
            ));
        }
        if !seen.insert(column.name) {
            errors.push(RegistryError::DuplicateColumn(
                table.name.to_string(),
                column.name.to_string(),
            ));
        }
    }

    if table.columns.iter().filter(|c| c.primary_key).count() > 1 {
        errors.push(RegistryError::MultiplePrimaryKeys(table.name.to_string()));
    }

    for group in table.unique_together {
        for column in group.iter() {
            if !table.has_column(column) {
                errors.push(RegistryError::UnknownUniqueColumn(
                    table.name.to_string(),
                    column.to_string(),
                ));
            }
        }
    }
}
