//! Error types for SQLite store operations.
//!
//! Provides a unified error type covering database access, value
//! conversion, migration, seeding, and user lookups.

use portal_core::QueryError;
use thiserror::Error;

/// Errors that can occur during SQLite store operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Stored value could not be converted to the expected Rust type.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// Migration lifecycle operation failure.
    #[error("migration error: {0}")]
    MigrationError(String),

    /// The table registry contains identifiers that cannot be used in SQL.
    #[error("invalid registry: {0}")]
    InvalidRegistry(String),

    /// A query run on behalf of a store operation failed.
    #[error("query error: {0}")]
    QueryError(#[from] QueryError),

    /// Seed file could not be read.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Seed file is not valid JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Requested user was not found.
    #[error("user not found: {0}")]
    UserNotFound(String),
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;

/// Converts a store failure into the envelope-level [`QueryError`].
///
/// The SQLite extended result code is carried as the error code so callers
/// can tell constraint kinds apart (e.g. `2067` for a unique violation).
pub fn store_error(err: rusqlite::Error) -> QueryError {
    let code = match &err {
        rusqlite::Error::SqliteFailure(e, _) => Some(e.extended_code.to_string()),
        _ => None,
    };
    QueryError::Store {
        message: err.to_string(),
        code,
    }
}
