//! HTTP transport for the data API.

use portal_core::{Envelope, ErrorBody, QueryDescriptor};
use reqwest::header::COOKIE;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::builder::QueryBuilder;

/// Message in the envelope when the server could not be reached or its
/// answer could not be read.
pub const REQUEST_FAILED: &str = "Request failed";

/// `data` of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// `<bucket>/<path>` as stored by the server.
    pub path: String,
}

/// A handle to one portal server.
///
/// Cheap to clone; clones share the underlying connection pool. There is
/// no process-wide instance; create one where it is needed and pass it on.
///
/// ```no_run
/// use portal_client::PortalClient;
///
/// # async fn run() {
/// let client = PortalClient::new("http://127.0.0.1:8787")
///     .with_session("portal_session", "token-from-login");
///
/// let plans = client
///     .from("plans")
///     .select("id, name, price")
///     .eq("type", "residencial")
///     .order("sort_order", true)
///     .await;
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
    cookie: Option<String>,
}

impl PortalClient {
    /// Creates a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(base_url, reqwest::Client::new())
    }

    /// Creates a client that sends requests through `http`.
    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            cookie: None,
        }
    }

    /// Attaches a session cookie to every request.
    pub fn with_session(mut self, cookie_name: &str, token: &str) -> Self {
        self.cookie = Some(format!("{cookie_name}={token}"));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Starts a query against `table`. Defaults to selecting every column.
    pub fn from(&self, table: impl Into<String>) -> QueryBuilder<'_> {
        QueryBuilder::new(self, table.into())
    }

    /// Sends a descriptor to `POST /api/db`.
    ///
    /// Never fails: server-side errors arrive in the envelope as sent, and
    /// transport failures become [`REQUEST_FAILED`].
    pub async fn execute(&self, desc: &QueryDescriptor) -> Envelope {
        debug!(table = %desc.table, action = %desc.action, "Sending query");
        let request = self.post("/api/db").json(desc);
        self.send(request).await
    }

    /// Uploads `bytes` to `<bucket>/<path>` through `POST /api/upload`.
    ///
    /// With `upsert` unset an existing file is not replaced.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        upsert: bool,
    ) -> Envelope<UploadedFile> {
        let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path).to_string();
        let form = Form::new()
            .text("bucket", bucket.to_string())
            .text("path", path.to_string())
            .text("upsert", if upsert { "true" } else { "false" })
            .part("file", Part::bytes(bytes).file_name(file_name));
        let request = self.post("/api/upload").multipart(form);
        self.send(request).await
    }

    fn post(&self, route: &str) -> reqwest::RequestBuilder {
        let request = self.http.post(format!("{}{route}", self.base_url));
        match &self.cookie {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Envelope<T> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Request did not reach the server");
                return request_failed();
            }
        };
        let status = response.status();
        match response.json::<Envelope<T>>().await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%status, error = %e, "Unreadable response body");
                request_failed()
            }
        }
    }
}

fn request_failed<T>() -> Envelope<T> {
    Envelope::from_error(ErrorBody::new(REQUEST_FAILED))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_server_yields_request_failed() {
        let client = PortalClient::new("not a url");
        let envelope = client.from("plans").select("*").await;
        assert_eq!(envelope.data, None);
        assert_eq!(envelope.error.unwrap().message, REQUEST_FAILED);
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = PortalClient::new("http://portal.isp.example/");
        assert_eq!(client.base_url(), "http://portal.isp.example");
    }
}
