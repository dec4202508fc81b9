//! Error types for the HTTP surface.
//!
//! Each concern has its own enum ([`ConfigError`], [`AuthError`],
//! [`UploadError`]); [`ApiError`] is what handlers return and decides the
//! HTTP status. Every error response carries the same `{ data, error }`
//! envelope as a successful one.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use portal_core::{Envelope, ErrorBody, ErrorKind, QueryError};
use thiserror::Error;

/// Errors loading or validating [`ServerConfig`](crate::ServerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A value is present but unusable (e.g. a short session secret).
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Reasons a request fails the session gate.
///
/// The variants are logged but never returned to the caller; every one of
/// them becomes the same `401 Unauthorized` response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("session cookie missing")]
    MissingCookie,

    #[error("session token malformed")]
    Malformed,

    #[error("session signature mismatch")]
    BadSignature,

    #[error("session expired")]
    Expired,

    #[error("account {0} not found")]
    UnknownUser(i64),

    #[error("account {0} is inactive")]
    Inactive(i64),

    #[error("account {0} is not an administrator")]
    NotAdmin(i64),
}

/// Errors from the upload endpoint and its storage backend.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("missing form field: {0}")]
    MissingField(&'static str),

    #[error("file type not allowed: {0}")]
    DisallowedExtension(String),

    #[error("invalid upload path")]
    InvalidPath,

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("file too large (limit {0} bytes)")]
    TooLarge(usize),

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors starting the server.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] portal_sqlite::SqliteError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Error returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    /// A query failed; the status depends on [`QueryError::kind`].
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    /// The store could not be reached at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Query(err) => match err.kind() {
                ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
                ErrorKind::Configuration | ErrorKind::NotFound | ErrorKind::Store => {
                    StatusCode::OK
                }
            },
            ApiError::Upload(err) => match err {
                UploadError::MissingField(_)
                | UploadError::DisallowedExtension(_)
                | UploadError::InvalidPath
                | UploadError::Multipart(_) => StatusCode::BAD_REQUEST,
                UploadError::AlreadyExists(_) => StatusCode::CONFLICT,
                UploadError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
                UploadError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Unauthorized(_) => ErrorBody::new("Unauthorized"),
            ApiError::Query(err) => err.to_body(),
            ApiError::Upload(UploadError::IoError(_)) => ErrorBody::new("Upload failed"),
            ApiError::Upload(err) => ErrorBody::new(err.to_string()),
            ApiError::Unavailable(_) => ErrorBody::new("Internal server error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope: Envelope = Envelope::from_error(self.body());
        (self.status(), Json(envelope)).into_response()
    }
}
