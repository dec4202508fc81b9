//! The `{ data, error }` response shape.
//!
//! Every data API call answers with an [`Envelope`]. On success `error` is
//! `null`; on failure `data` is `null` and `error` carries a message plus
//! the store's code when one exists.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;

/// The `error` half of an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }
}

/// Result envelope returned by every data access call.
///
/// ```
/// use portal_core::{Envelope, QueryError};
/// use serde_json::json;
///
/// let ok = Envelope::ok(json!([{"id": 1}]));
/// assert!(ok.error.is_none());
///
/// let err = Envelope::<serde_json::Value>::err(&QueryError::NoRows);
/// assert_eq!(
///     serde_json::to_value(&err).unwrap(),
///     json!({"data": null, "error": {"message": "No rows returned"}})
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// A success that carries no row (e.g. `maybeSingle` with no match).
    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
        }
    }

    pub fn err(error: &QueryError) -> Self {
        Self::from_error(error.to_body())
    }

    pub fn from_error(error: ErrorBody) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Splits the envelope into a `Result`, treating a present `error` as failure.
    pub fn into_result(self) -> Result<Option<T>, ErrorBody> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

impl Envelope<Value> {
    /// Builds an envelope from an executor result.
    ///
    /// A JSON `null` payload is stored as an absent `data` so that the wire
    /// form is the same either way.
    pub fn from_result(result: Result<Value, QueryError>) -> Self {
        match result {
            Ok(Value::Null) => Self::empty(),
            Ok(data) => Self::ok(data),
            Err(error) => Self::err(&error),
        }
    }

    /// Deserializes `data` into a concrete type.
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> Result<Option<T>, ErrorBody> {
        match self.into_result()? {
            Some(data) => serde_json::from_value(data)
                .map(Some)
                .map_err(|e| ErrorBody::new(format!("Failed to decode response data: {e}"))),
            None => Ok(None),
        }
    }
}
