//! Integration tests for the inbound-email webhook and thread endpoints.
//!
//! Each test spins up an Axum server on a random port and exercises the
//! real HTTP contract with reqwest.

use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;

use order_desk::attachments::AttachmentStore;
use order_desk::mail::token::reply_address;
use order_desk::recorder::Recorder;
use order_desk::routes::{AppState, app_routes};
use order_desk::store::{LibSqlStore, Order, Store};

struct TestServer {
    port: u16,
    store: Arc<LibSqlStore>,
    _tmp: tempfile::TempDir,
}

/// Start a server on a random port backed by an in-memory store.
async fn start_server() -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
    let attachments = Arc::new(AttachmentStore::new(tmp.path()));
    let recorder = Arc::new(Recorder::new(
        Arc::clone(&store) as Arc<dyn Store>,
        attachments,
        "parse.example.com".into(),
        None,
    ));

    let app = app_routes(AppState {
        recorder,
        store: Arc::clone(&store) as Arc<dyn Store>,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    TestServer {
        port,
        store,
        _tmp: tmp,
    }
}

/// Seed an order and its first outbound message via the API. Returns the order.
async fn seed_thread(server: &TestServer) -> Order {
    let order = Order::new("Dana Coach", "dana@example.com");
    server.store.insert_order(&order).await.unwrap();

    let client = reqwest::Client::new();
    let resp = client
        .post(format!(
            "http://127.0.0.1:{}/api/orders/{}/communications",
            server.port, order.id
        ))
        .json(&serde_json::json!({
            "subject": "Your Lincoln Elementary order",
            "body": "Here is the proof for your review.",
            "admin_id": "admin-1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    order
}

#[tokio::test]
async fn health_endpoint() {
    let server = start_server().await;
    let resp = reqwest::get(format!("http://127.0.0.1:{}/health", server.port))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn inbound_reply_end_to_end() {
    let server = start_server().await;
    let order = seed_thread(&server).await;
    let to = reply_address(order.id, "parse.example.com");

    let client = reqwest::Client::new();
    let resp = client
        .post(format!(
            "http://127.0.0.1:{}/webhooks/inbound-email",
            server.port
        ))
        .form(&[
            ("to", to.as_str()),
            ("from", "dana@example.com"),
            ("subject", "Re: Order"),
            (
                "text",
                "Thanks!\n\nOn Tue, Feb 6, 2024 at 9:00 AM Spirit Shop <s@x.com> wrote:\n> original",
            ),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Reply received");
    assert!(body["communicationId"].is_string());

    // Exactly one inbound row, quote-stripped.
    let thread = server.store.list_communications(order.id).await.unwrap();
    assert_eq!(thread.len(), 2);
    let inbound: Vec<_> = thread
        .iter()
        .filter(|c| c.sender_email == "dana@example.com")
        .collect();
    assert_eq!(inbound.len(), 1);
    assert_eq!(inbound[0].body, "Thanks!");
}

#[tokio::test]
async fn webhook_acknowledges_unknown_token_with_200() {
    let server = start_server().await;
    seed_thread(&server).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!(
            "http://127.0.0.1:{}/webhooks/inbound-email",
            server.port
        ))
        .form(&[
            ("to", "order-ffffffff@parse.example.com"),
            ("from", "stranger@example.com"),
            ("text", "hello?"),
        ])
        .send()
        .await
        .unwrap();

    // Business failure, but never a non-200 — the provider would retry.
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "No matching communication");
    assert!(body.get("communicationId").is_none());
}

#[tokio::test]
async fn webhook_acknowledges_missing_to_with_200() {
    let server = start_server().await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!(
            "http://127.0.0.1:{}/webhooks/inbound-email",
            server.port
        ))
        .form(&[("from", "someone@example.com"), ("text", "no recipient")])
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Missing recipient address");
}

#[tokio::test]
async fn webhook_acknowledges_non_order_address_with_200() {
    let server = start_server().await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!(
            "http://127.0.0.1:{}/webhooks/inbound-email",
            server.port
        ))
        .form(&[("to", "info@shop.example.com"), ("text", "hi")])
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Not an order reply address");
}

#[tokio::test]
async fn list_communications_returns_thread() {
    let server = start_server().await;
    let order = seed_thread(&server).await;

    let resp = reqwest::get(format!(
        "http://127.0.0.1:{}/api/orders/{}/communications",
        server.port, order.id
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);

    let thread: Value = resp.json().await.unwrap();
    let thread = thread.as_array().unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0]["direction"], "outbound");
    assert_eq!(thread[0]["subject"], "Your Lincoln Elementary order");
}

#[tokio::test]
async fn list_communications_unknown_order_is_404() {
    let server = start_server().await;

    let resp = reqwest::get(format!(
        "http://127.0.0.1:{}/api/orders/{}/communications",
        server.port,
        uuid::Uuid::new_v4()
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn mark_read_and_unread_count() {
    let server = start_server().await;
    let order = seed_thread(&server).await;
    let to = reply_address(order.id, "parse.example.com");
    let client = reqwest::Client::new();

    // Record one inbound reply.
    client
        .post(format!(
            "http://127.0.0.1:{}/webhooks/inbound-email",
            server.port
        ))
        .form(&[("to", to.as_str()), ("from", "dana@example.com"), ("text", "ok!")])
        .send()
        .await
        .unwrap();

    let resp = reqwest::get(format!(
        "http://127.0.0.1:{}/api/communications/unread-count",
        server.port
    ))
    .await
    .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["unread"], 1);

    let thread = server.store.list_communications(order.id).await.unwrap();
    let inbound = thread.iter().find(|c| !c.read_by_admin).unwrap();

    let resp = client
        .post(format!(
            "http://127.0.0.1:{}/api/communications/{}/read",
            server.port, inbound.id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = reqwest::get(format!(
        "http://127.0.0.1:{}/api/communications/unread-count",
        server.port
    ))
    .await
    .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["unread"], 0);
}

#[tokio::test]
async fn send_message_to_unknown_order_is_404() {
    let server = start_server().await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!(
            "http://127.0.0.1:{}/api/orders/{}/communications",
            server.port,
            uuid::Uuid::new_v4()
        ))
        .json(&serde_json::json!({"subject": "s", "body": "b"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
