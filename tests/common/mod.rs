//! Shared test harness: spins up a real camd server on an ephemeral port
//! with the simulated media controller, and drives it over a real
//! WebSocket connection.
//
// Not every test binary uses every helper.
#![allow(dead_code)]

use camd::config::Config;
use camd::media::SimulatedMediaController;
use camd::security::{HmacSecurityProvider, Role, SecurityProvider as _};
use camd::AppContext;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub const TEST_SECRET: &str = "camd-test-secret";

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub url: String,
    pub ctx: Arc<AppContext>,
    pub media: Arc<SimulatedMediaController>,
}

/// Start a server whose media controller becomes ready almost immediately.
pub async fn start_server() -> TestServer {
    start_server_with(Config::default(), Some(Duration::from_millis(5))).await
}

/// Start a server whose media controller never becomes ready.
pub async fn start_server_not_ready() -> TestServer {
    start_server_with(Config::default(), None).await
}

pub async fn start_server_with(mut config: Config, ready_after: Option<Duration>) -> TestServer {
    config.security.jwt_secret_key = TEST_SECRET.to_owned();

    let media = SimulatedMediaController::new();
    if let Some(delay) = ready_after {
        media.start(delay);
    }
    let security = Arc::new(HmacSecurityProvider::new(TEST_SECRET.as_bytes().to_vec()));
    let ctx = AppContext::new(config, media.clone(), security);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_ctx = ctx.clone();
    tokio::spawn(async move {
        camd::serve_with_listener(server_ctx, listener).await.ok();
    });

    let server = TestServer {
        url: format!("ws://{addr}/ws"),
        ctx,
        media,
    };
    if ready_after.is_some() {
        server.wait_ready().await;
    }
    server
}

impl TestServer {
    pub async fn wait_ready(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !self.ctx.readiness.is_ready() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "media controller never became ready"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub fn token(&self, user: &str, role: Role) -> String {
        HmacSecurityProvider::new(TEST_SECRET.as_bytes().to_vec())
            .generate_token(user, role, 24)
            .unwrap()
    }
}

pub async fn connect(server: &TestServer) -> WsClient {
    let (ws, _) = connect_async(&server.url).await.expect("ws connect failed");
    ws
}

/// Send one request and read frames until its response arrives, skipping
/// any interleaved notifications.
pub async fn rpc(ws: &mut WsClient, method: &str, params: Value, id: Value) -> Value {
    send_raw(
        ws,
        json!({ "jsonrpc": "2.0", "id": id.clone(), "method": method, "params": params }),
    )
    .await;
    recv_response(ws, &id).await
}

pub async fn send_raw(ws: &mut WsClient, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Read frames until a response with the given id arrives.
pub async fn recv_response(ws: &mut WsClient, id: &Value) -> Value {
    loop {
        let frame = recv_frame(ws).await.expect("connection closed mid-call");
        if frame.get("id") == Some(id) {
            return frame;
        }
    }
}

/// Read the next JSON text frame, or `None` on close.
pub async fn recv_frame(ws: &mut WsClient) -> Option<Value> {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")?
        {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Read frames until a notification for `topic` arrives.
pub async fn recv_notification(ws: &mut WsClient, topic: &str) -> Value {
    loop {
        let frame = recv_frame(ws).await.expect("connection closed");
        if frame.get("id").is_none() && frame["method"] == topic {
            return frame;
        }
    }
}

/// Authenticate the connection with a freshly minted token for `role`.
pub async fn authenticate_as(ws: &mut WsClient, server: &TestServer, role: Role) -> Value {
    let token = server.token("test-user", role);
    let resp = rpc(
        ws,
        "authenticate",
        json!({ "auth_token": token }),
        json!(9000),
    )
    .await;
    assert!(
        resp.get("result").is_some(),
        "authentication failed: {resp}"
    );
    resp["result"].clone()
}
