//! HTTP routes.
//!
//! | Route              | Auth  | Body                          |
//! |--------------------|-------|-------------------------------|
//! | `POST /api/db`     | admin | query descriptor (JSON)       |
//! | `POST /api/upload` | admin | multipart `file`, `bucket`, `path`, `upsert` |
//! | `GET /api/health`  | none  |                               |
//!
//! Every response body is an envelope `{ "data": ..., "error": ... }`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use portal_core::{Envelope, QueryDescriptor, QueryError, SchemaRegistry};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::auth::AuthGate;
use crate::config::ServerConfig;
use crate::error::{ApiError, ServeError, UploadError};
use crate::service::QueryService;
use crate::upload::{FsUploadStore, StoredObject, UploadRequest, UploadStore};

/// Multipart overhead allowed on top of the configured file size.
const MULTIPART_SLACK_BYTES: usize = 64 * 1024;

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: QueryService,
    pub gate: AuthGate,
    pub uploads: Arc<dyn UploadStore>,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Builds the state from a validated configuration. The database is
    /// not touched until a request arrives; see [`QueryService::prepare`].
    pub fn new(config: &ServerConfig) -> Result<Self, ServeError> {
        Ok(Self {
            service: QueryService::from_config(&config.database, SchemaRegistry::portal()),
            gate: AuthGate::new(&config.session)?,
            uploads: Arc::new(FsUploadStore::from_config(&config.uploads)),
            max_upload_bytes: config.uploads.max_bytes,
        })
    }
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes.saturating_add(MULTIPART_SLACK_BYTES);
    Router::new()
        .route("/api/db", post(db))
        .route(
            "/api/upload",
            post(upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/health", get(health))
        .with_state(state)
}

/// Opens the database, applies the schema, and serves until Ctrl-C.
pub async fn serve(config: ServerConfig) -> Result<(), ServeError> {
    config.validate()?;

    let state = AppState::new(&config)?;
    state.service.prepare()?;

    let listener = TcpListener::bind(&config.listen.address).await?;
    info!(uploads = %config.uploads.root.display(), "Upload root configured");
    serve_with(listener, state, shutdown_signal()).await?;
    Ok(())
}

/// Serves `state` on an already bound listener until `shutdown` resolves.
pub async fn serve_with(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    info!(address = %listener.local_addr()?, "Portal server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Portal server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Verifies the session cookie and re-checks the account in the store.
async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<i64, ApiError> {
    let claims = state.gate.session(headers).inspect_err(|e| {
        warn!(reason = %e, "Rejected session");
    })?;
    let gate = state.gate.clone();
    let user = state
        .service
        .with_conn(move |conn| gate.check_account(&claims, conn))
        .await?
        .inspect_err(|e| warn!(reason = %e, "Rejected session"))?;
    Ok(user.id)
}

async fn db(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Envelope>, ApiError> {
    let user_id = authorize(&state, &headers).await?;

    let desc: QueryDescriptor =
        serde_json::from_slice(&body).map_err(|e| QueryError::Malformed(e.to_string()))?;
    let table = desc.table.clone();
    let action = desc.action;

    match state.service.execute(desc).await? {
        Ok(data) => {
            info!(user_id, table = %table, action = %action, "Query succeeded");
            Ok(Json(Envelope::from_result(Ok(data))))
        }
        Err(err) => {
            warn!(user_id, table = %table, action = %action, error = %err, "Query failed");
            Err(err.into())
        }
    }
}

async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Envelope<StoredObject>>, ApiError> {
    let user_id = authorize(&state, &headers).await?;
    let limit = state.max_upload_bytes;
    let multipart_error = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge(limit)
        } else {
            UploadError::Multipart(e.body_text())
        }
    };

    let mut file: Option<Bytes> = None;
    let mut bucket: Option<String> = None;
    let mut path: Option<String> = None;
    let mut upsert = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => file = Some(field.bytes().await.map_err(multipart_error)?),
            Some("bucket") => bucket = Some(field.text().await.map_err(multipart_error)?),
            Some("path") => path = Some(field.text().await.map_err(multipart_error)?),
            Some("upsert") => {
                upsert = field.text().await.map_err(multipart_error)?.trim() == "true";
            }
            _ => {}
        }
    }

    let file = file.ok_or(UploadError::MissingField("file"))?;
    let bucket = bucket.ok_or(UploadError::MissingField("bucket"))?;
    let path = path.ok_or(UploadError::MissingField("path"))?;

    let store = Arc::clone(&state.uploads);
    let stored = tokio::task::spawn_blocking(move || {
        store.store(UploadRequest {
            bucket: &bucket,
            path: &path,
            bytes: &file,
            upsert,
        })
    })
    .await
    .map_err(|e| ApiError::Unavailable(e.to_string()))?
    .inspect_err(|e| warn!(user_id, error = %e, "Upload rejected"))?;

    info!(user_id, path = %stored.path, "Upload stored");
    Ok(Json(Envelope::ok(stored)))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
