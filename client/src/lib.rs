//! Fluent async client for the ISP portal data API.
//!
//! ```no_run
//! use portal_client::PortalClient;
//! use serde_json::json;
//!
//! # async fn run() {
//! let client = PortalClient::new("http://127.0.0.1:8787")
//!     .with_session("portal_session", "signed-token");
//!
//! // Reads resolve to the `{ data, error }` envelope.
//! let featured = client
//!     .from("plans")
//!     .select("name, price")
//!     .eq("is_featured", true)
//!     .order("sort_order", true)
//!     .await;
//!
//! // After a write, `select` names the returned columns.
//! let created = client
//!     .from("popups")
//!     .insert(json!({"title": "Black Friday"}))
//!     .select("id")
//!     .single()
//!     .await;
//! # let _ = (featured, created);
//! # }
//! ```

mod builder;
mod client;

pub use builder::QueryBuilder;
pub use client::{PortalClient, REQUEST_FAILED, UploadedFile};
pub use portal_core::{Envelope, ErrorBody, QueryDescriptor};
