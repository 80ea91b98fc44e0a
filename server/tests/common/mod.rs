//! Shared helpers: a real server on an ephemeral port, plus HTTP and WebSocket clients.

#![allow(dead_code)]

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use syncphoto_server::config::{RealtimeConfig, StorageConfig};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsWrite = SplitSink<WsStream, Message>;
pub type WsRead = SplitStream<WsStream>;

pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
}

pub struct TestUser {
    pub id: String,
    pub code: String,
    pub token: String,
}

/// Start the server on a random port with a throwaway data directory.
pub async fn start_test_server() -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = syncphoto_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = syncphoto_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let storage = StorageConfig {
        bucket: "test-bucket".to_string(),
        access_key: "test-access".to_string(),
        secret_key: "test-secret".to_string(),
        ..StorageConfig::default()
    };
    let state = syncphoto_server::state::AppState::new(
        db,
        jwt_secret,
        RealtimeConfig::default(),
        &storage,
    );

    let app = syncphoto_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
    }
}

pub async fn create_user(server: &TestServer) -> TestUser {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/users", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200, "User creation failed");

    let body: Value = resp.json().await.unwrap();
    TestUser {
        id: body["id"].as_str().unwrap().to_string(),
        code: body["code"].as_str().unwrap().to_string(),
        token: body["token"].as_str().unwrap().to_string(),
    }
}

/// POST /api/v1/pairs as `user`, returning (status, body).
pub async fn create_pair(server: &TestServer, user: &TestUser, partner_code: &str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/pairs", server.base_url))
        .bearer_auth(&user.token)
        .json(&json!({ "partner_code": partner_code }))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    (status, body)
}

/// Create two users and pair them. Returns (a, b, pair_id).
pub async fn paired_users(server: &TestServer) -> (TestUser, TestUser, String) {
    let a = create_user(server).await;
    let b = create_user(server).await;
    let (status, body) = create_pair(server, &a, &b.code).await;
    assert_eq!(status, 200, "Pairing failed: {body}");
    let pair_id = body["id"].as_str().unwrap().to_string();
    (a, b, pair_id)
}

pub async fn connect_ws(server: &TestServer, token: &str) -> (WsWrite, WsRead) {
    let url = format!("ws://{}/ws?token={}", server.addr, token);
    let (stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("WebSocket connect failed");
    stream.split()
}

pub async fn send_json(write: &mut WsWrite, value: Value) {
    send_text(write, &value.to_string()).await;
}

pub async fn send_text(write: &mut WsWrite, text: &str) {
    write
        .send(Message::Text(text.to_string().into()))
        .await
        .expect("WebSocket send failed");
}

/// Next JSON text frame, skipping control frames. Panics after two seconds.
pub async fn next_json(read: &mut WsRead) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("Timed out waiting for a message")
            .expect("Stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected frame: {other:?}"),
        }
    }
}

/// Assert no text frame arrives for a short while.
pub async fn expect_silence(read: &mut WsRead) {
    loop {
        match tokio::time::timeout(Duration::from_millis(300), read.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(other) => panic!("Expected silence, got {other:?}"),
        }
    }
}

/// Wait until the server closes this stream (close frame or end of stream).
pub async fn expect_closed(read: &mut WsRead) {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("Timed out waiting for close")
        {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(_)) => continue,
        }
    }
}
