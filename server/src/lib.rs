//! HTTP surface for the ISP portal data API.
//!
//! This crate exposes the query executor from `portal-sqlite` behind a
//! session-gated JSON endpoint, plus a filesystem-backed upload endpoint.
//!
//! # Modules
//!
//! - [`config`] - YAML server configuration with environment overrides
//! - [`auth`] - signed session tokens and the per-request account check
//! - [`service`] - per-request database connections for async handlers
//! - [`upload`] - upload storage and path sanitization
//! - [`http`] - routes, handlers and [`serve`]
//! - [`error`] - error types and their HTTP status mapping
//!
//! # Example
//!
//! ```no_run
//! use portal_server::{ServerConfig, serve};
//!
//! # async fn run() -> Result<(), portal_server::ServeError> {
//! let mut config = ServerConfig::load("portal.yml")?;
//! config.apply_env();
//! serve(config).await
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod service;
pub mod upload;

pub use auth::{AuthGate, SessionClaims, SessionSigner};
pub use config::ServerConfig;
pub use error::{ApiError, AuthError, ConfigError, ServeError, UploadError};
pub use http::{AppState, router, serve, serve_with};
pub use service::QueryService;
pub use upload::{FsUploadStore, StoredObject, UploadRequest, UploadStore};
