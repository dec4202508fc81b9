//! Client against a live server on a loopback port.

use portal_client::{PortalClient, REQUEST_FAILED};
use portal_server::{AppState, ServerConfig, serve_with};
use portal_sqlite::{Role, UserStore};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

const SECRET: &str = "client-integration-secret-0123456789";

/// Starts a server with one admin account; returns an authenticated client.
async fn start() -> (PortalClient, String, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServerConfig::default();
    config.session.secret = SECRET.to_string();
    config.uploads.root = dir.path().join("uploads");

    config.database.path = dir.path().join("portal.db");

    let state = AppState::new(&config).unwrap();
    state.service.prepare().unwrap();
    let admin = UserStore::new(&state.service.connect().unwrap())
        .create_user("ops@isp.example", None, Role::Admin)
        .unwrap();

    let token = state.gate.signer().issue(&admin).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(serve_with(listener, state, std::future::pending()));

    let client = PortalClient::new(&base_url).with_session(&config.session.cookie_name, &token);
    (client, base_url, dir)
}

fn names(data: &Value) -> Vec<&str> {
    data.as_array()
        .unwrap()
        .iter()
        .map(|row| row["name"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_plans_scenario_through_the_client() {
    let (client, _, _dir) = start().await;

    let inserted = client
        .from("plans")
        .insert(json!([
            {"name": "Fibra 600", "slug": "fibra-600", "type": "residencial", "sort_order": 3},
            {"name": "Empresa 1G", "slug": "empresa-1g", "type": "empresarial", "sort_order": 1},
            {"name": "Fibra 100", "slug": "fibra-100", "type": "residencial", "sort_order": 1},
            {"name": "Empresa 500", "slug": "empresa-500", "type": "empresarial", "sort_order": 2},
            {"name": "Fibra 300", "slug": "fibra-300", "type": "residencial", "sort_order": 2}
        ]))
        .select("id")
        .await;
    assert!(inserted.is_ok(), "{:?}", inserted.error);
    let ids = inserted.data.unwrap();
    assert_eq!(ids.as_array().unwrap().len(), 5);
    assert_eq!(ids[0].as_object().unwrap().len(), 1);
    assert!(ids[0]["id"].is_i64());

    let residential = client
        .from("plans")
        .select("name, sort_order")
        .eq("type", "residencial")
        .order("sort_order", true)
        .await;
    assert_eq!(residential.error, None);
    assert_eq!(
        names(residential.data.as_ref().unwrap()),
        vec!["Fibra 100", "Fibra 300", "Fibra 600"]
    );
}

#[tokio::test]
async fn test_upsert_and_single_through_the_client() {
    let (client, _, _dir) = start().await;

    client
        .from("plans")
        .insert(json!({"name": "Fibra 300", "slug": "fibra-300", "price": 99.9, "description": "Streaming"}))
        .await;

    let updated = client
        .from("plans")
        .upsert(json!({"slug": "fibra-300", "name": "Fibra 300", "price": 89.9}))
        .on_conflict("slug")
        .select("price, description")
        .single()
        .await;
    assert_eq!(
        updated.data,
        Some(json!({"price": 89.9, "description": "Streaming"}))
    );

    let missing = client.from("plans").eq("slug", "nope").single().await;
    assert_eq!(missing.error.unwrap().message, "No rows returned");

    let maybe = client.from("plans").eq("slug", "nope").maybe_single().await;
    assert!(maybe.is_ok());
    assert_eq!(maybe.data, None);
}

#[tokio::test]
async fn test_server_errors_arrive_in_the_envelope() {
    let (client, base_url, _dir) = start().await;

    let unknown = client.from("secrets").await;
    assert_eq!(unknown.error.unwrap().message, "Invalid table: secrets");

    let anonymous = PortalClient::new(base_url).from("plans").await;
    assert_eq!(anonymous.error.unwrap().message, "Unauthorized");
}

#[tokio::test]
async fn test_unreachable_server_is_request_failed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let envelope = PortalClient::new(format!("http://{address}"))
        .from("plans")
        .await;
    assert_eq!(envelope.error.unwrap().message, REQUEST_FAILED);
}

#[tokio::test]
async fn test_upload_through_the_client() {
    let (client, _, dir) = start().await;

    let stored = client
        .upload("../media", "../banners/home.png", b"png".to_vec(), false)
        .await;
    assert_eq!(stored.data.unwrap().path, "media/banners/home.png");
    assert!(dir.path().join("uploads/media/banners/home.png").is_file());

    let again = client
        .upload("media", "banners/home.png", b"png".to_vec(), false)
        .await;
    assert!(again.error.unwrap().message.contains("already exists"));
}
