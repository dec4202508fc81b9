//! Error taxonomy for data API requests.
//!
//! Every failure a query can produce maps onto one [`QueryError`] variant,
//! and every variant renders into the envelope's `error` object via
//! [`QueryError::to_body`]. The [`ErrorKind`] classification lets the HTTP
//! layer choose a status code without matching on individual variants.

use thiserror::Error;

use crate::descriptor::Action;
use crate::envelope::ErrorBody;

/// Message used when `single` was requested and nothing matched.
pub const NO_ROWS_MESSAGE: &str = "No rows returned";

/// Broad class of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is unusable (unknown table, malformed body).
    InvalidRequest,
    /// The request is well-formed but the table cannot serve it as asked.
    Configuration,
    /// `single` was demanded and zero rows matched.
    NotFound,
    /// The relational store rejected or failed the statement.
    Store,
}

/// Errors produced while planning or executing a query descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The descriptor names a table that is not in the registry.
    #[error("Invalid table: {0}")]
    UnknownTable(String),

    /// The request body could not be parsed as a descriptor.
    #[error("Invalid request: {0}")]
    Malformed(String),

    /// A write action arrived without anything to write.
    #[error("{0} requires values")]
    MissingValues(Action),

    /// Upsert named a conflict column the table does not have, or had
    /// neither `onConflict` nor a primary key to fall back on.
    #[error("No conflict column available for upsert on table {0}")]
    MissingConflictTarget(String),

    /// `single` was requested and zero rows matched.
    #[error("No rows returned")]
    NoRows,

    /// Failure reported by the underlying store.
    #[error("{message}")]
    Store {
        message: String,
        code: Option<String>,
    },
}

impl QueryError {
    /// Creates a store error without a code.
    pub fn store(message: impl Into<String>) -> Self {
        QueryError::Store {
            message: message.into(),
            code: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::UnknownTable(_) | QueryError::Malformed(_) | QueryError::MissingValues(_) => {
                ErrorKind::InvalidRequest
            }
            QueryError::MissingConflictTarget(_) => ErrorKind::Configuration,
            QueryError::NoRows => ErrorKind::NotFound,
            QueryError::Store { .. } => ErrorKind::Store,
        }
    }

    /// Renders the error as the envelope's `error` object.
    pub fn to_body(&self) -> ErrorBody {
        let code = match self {
            QueryError::Store { code, .. } => code.clone(),
            _ => None,
        };
        ErrorBody {
            message: self.to_string(),
            code,
        }
    }
}

/// Convenience alias for results with [`QueryError`].
pub type Result<T> = std::result::Result<T, QueryError>;
