//! Conversion between JSON request values and SQLite values.
//!
//! Conversion is driven by the registered [`ColumnType`] of the column a
//! value is bound to or read from:
//!
//! - `Boolean` columns store `0`/`1` and read back as JSON booleans
//! - `Json` columns store serialized JSON text and read back parsed
//! - every other column binds the JSON value by its own JSON type
//!
//! Reading is lenient about what SQLite actually stored (type affinity can
//! leave text in an integer column); it never fails, so a row is always
//! representable in the response.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use portal_core::{ColumnDef, ColumnType};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};

/// Converts a JSON request value into the SQLite value bound for `column`.
pub(crate) fn to_sql_value(column: &ColumnDef, value: &Value) -> SqlValue {
    match (column.ty, value) {
        (_, Value::Null) => SqlValue::Null,
        (ColumnType::Json, other) => SqlValue::Text(other.to_string()),
        (_, Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        (ColumnType::Boolean, Value::String(s)) => match s.as_str() {
            "true" | "t" | "1" => SqlValue::Integer(1),
            "false" | "f" | "0" => SqlValue::Integer(0),
            _ => SqlValue::Text(s.clone()),
        },
        (_, Value::Number(n)) => number_to_sql(n),
        (_, Value::String(s)) => SqlValue::Text(s.clone()),
        (_, other @ (Value::Array(_) | Value::Object(_))) => SqlValue::Text(other.to_string()),
    }
}

fn number_to_sql(n: &Number) -> SqlValue {
    if let Some(i) = n.as_i64() {
        SqlValue::Integer(i)
    } else {
        SqlValue::Real(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// Converts a stored SQLite value read from `column` into JSON.
pub(crate) fn from_sql_value(column: &ColumnDef, value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match column.ty {
            ColumnType::Boolean => Value::Bool(i != 0),
            _ => Value::from(i),
        },
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            match column.ty {
                ColumnType::Json => serde_json::from_str(&text).unwrap_or(Value::String(text)),
                _ => Value::String(text),
            }
        }
        ValueRef::Blob(bytes) => Value::String(BASE64.encode(bytes)),
    }
}
