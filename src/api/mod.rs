//! WebSocket JSON-RPC server.
//!
//! Owns the listener, the upgrade handshake, and the two tasks behind every
//! connection: a reader that decodes frames and spawns dispatcher work, and
//! a writer that drains the per-connection send queue, runs the ping/pong
//! liveness clock, and is the only code that ever touches the socket's
//! write half. The same port answers plain `GET /health` requests with a
//! JSON liveness document so clients can probe the daemon without a
//! WebSocket library.

pub mod auth;
pub mod codec;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handlers;
pub mod methods;
pub mod rate_limit;
pub mod readiness;

use crate::api::connection::{ClientConnection, Outbound};
use crate::AppContext;
use anyhow::Result;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message, WebSocketConfig};
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

/// Bound on the per-connection send queue. Responses always fit (they are
/// bounded by the rate limiter); notifications beyond this evict the oldest.
const SEND_QUEUE_CAPACITY: usize = 64;

// ─── Server ──────────────────────────────────────────────────────────────────

/// Bind the configured address and serve until the context's shutdown token
/// is cancelled.
pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let addr = ctx.config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    serve_with_listener(ctx, listener).await
}

/// Serve on a pre-bound listener (ephemeral-port testing runs through this).
pub async fn serve_with_listener(ctx: Arc<AppContext>, listener: TcpListener) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, path = %ctx.config.server.websocket_path, "API server listening");

    // The controller's event channel drives both fan-out and the readiness
    // gate. A controller that is already ready (restart case) is honored
    // immediately rather than waiting for a fresh startup event.
    tokio::spawn(events::run_event_pump(
        ctx.events.clone(),
        ctx.readiness.clone(),
        ctx.media.events(),
        ctx.shutdown.clone(),
    ));
    if ctx.media.is_ready() {
        ctx.readiness.set_ready();
    }

    // Every socket task is tracked so shutdown can wait for writer drains.
    let connections = TaskTracker::new();

    loop {
        tokio::select! {
            biased;

            _ = ctx.shutdown.cancelled() => {
                info!("shutdown signalled — draining connections");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                connections.spawn(async move {
                    if let Err(e) = handle_socket(ctx, stream, peer).await {
                        debug!(peer = %peer, err = %e, "connection ended with error");
                    }
                });
            }
        }
    }

    drain_all(&ctx, &connections).await;
    info!("API server stopped");
    Ok(())
}

/// Close every live connection "going away" and wait out the writer drains,
/// bounded by `shutdown_timeout`. Idempotent — already-closed connections
/// are skipped by their own closed flag.
async fn drain_all(ctx: &Arc<AppContext>, connections: &TaskTracker) {
    for conn in ctx.registry.all() {
        close_connection(ctx, &conn, "going away");
    }
    connections.close();
    if timeout(ctx.config.server.shutdown_timeout, connections.wait())
        .await
        .is_err()
    {
        warn!("shutdown timeout elapsed with connections still draining");
    }
}

/// Tear one connection down. Idempotent: the first caller flips the closed
/// flag, removes the registry entry and all subscriptions, and cancels the
/// connection token — which moves the writer into its drain-and-close path.
/// Registry removal and socket teardown are driven as one step, so no send
/// can be attempted on a connection that has left the registry.
fn close_connection(ctx: &Arc<AppContext>, conn: &Arc<ClientConnection>, reason: &'static str) {
    if !conn.mark_closed() {
        return;
    }
    conn.set_close_reason(reason);
    ctx.registry.remove(conn.id);
    ctx.events.remove_client(conn.id);
    conn.cancel.cancel();
    debug!(client_id = conn.id, reason, "connection closed");
}

// ─── Per-socket handling ─────────────────────────────────────────────────────

async fn handle_socket(
    ctx: Arc<AppContext>,
    stream: TcpStream,
    peer: std::net::SocketAddr,
) -> Result<()> {
    // The WebSocket port doubles as a plain HTTP health endpoint. Peek for
    // "GET /health " (trailing space avoids matching "/health-check") and
    // short-circuit before the WS handshake. The peek shares the handshake
    // budget so a silent socket cannot park here forever.
    let mut peek_buf = [0u8; 12];
    let n = timeout(ctx.config.server.read_timeout, stream.peek(&mut peek_buf))
        .await
        .map(|r| r.unwrap_or(0))
        .unwrap_or(0);
    if n >= 12 && &peek_buf[..12] == b"GET /health " {
        return respond_health(stream, &ctx).await;
    }

    // Admission before the handshake: over-limit upgrades are refused with
    // a plain 503 instead of a WebSocket close.
    if ctx.registry.at_capacity() {
        warn!(peer = %peer, "connection limit reached — refusing upgrade");
        return respond_503(stream).await;
    }

    let ws_config = WebSocketConfig {
        max_message_size: Some(ctx.config.server.max_message_size),
        max_frame_size: Some(ctx.config.server.max_message_size),
        write_buffer_size: ctx.config.server.write_buffer_size,
        ..Default::default()
    };

    let expected_path = ctx.config.server.websocket_path.clone();
    let check_request = move |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
        // Any origin is accepted (the daemon fronts LAN camera rigs); the
        // path must match the configured endpoint.
        if req.uri().path() != expected_path {
            let mut not_found = ErrorResponse::new(Some("not found".into()));
            *not_found.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::NOT_FOUND;
            return Err(not_found);
        }
        Ok(resp)
    };

    // `read_timeout` bounds the upgrade handshake; a client that connects
    // and never completes the handshake does not hold a socket open.
    let ws = timeout(
        ctx.config.server.read_timeout,
        accept_hdr_async_with_config(stream, check_request, Some(ws_config)),
    )
    .await??;

    let Some(conn) = ctx
        .registry
        .admit(peer, &ctx.shutdown, SEND_QUEUE_CAPACITY)
    else {
        // Raced to capacity between the pre-check and admission.
        return Ok(());
    };
    info!(client_id = conn.id, peer = %peer, "client connected");

    let (sink, stream) = ws.split();
    let writer = tokio::spawn(write_loop(ctx.clone(), conn.clone(), sink));

    read_loop(&ctx, &conn, stream).await;

    // Reader is done (close frame, socket error, or cancellation): tear the
    // connection down and let the writer drain.
    close_connection(&ctx, &conn, "going away");
    let _ = writer.await;
    info!(client_id = conn.id, "client disconnected");
    Ok(())
}

async fn read_loop(
    ctx: &Arc<AppContext>,
    conn: &Arc<ClientConnection>,
    mut stream: SplitStream<WebSocketStream<TcpStream>>,
) {
    loop {
        tokio::select! {
            _ = conn.cancel.cancelled() => break,

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    // Each request runs on its own task; responses may
                    // complete out of order and that is fine — clients
                    // correlate by id.
                    tokio::spawn(dispatch::handle_frame(
                        ctx.clone(),
                        conn.clone(),
                        text,
                    ));
                }
                Some(Ok(Message::Binary(_))) => {
                    conn.push_response(
                        codec::RpcResponse::error(
                            Value::Null,
                            error::RpcError::invalid_request(
                                "binary frames are not part of this protocol",
                            ),
                        )
                        .encode(),
                    );
                }
                Some(Ok(Message::Ping(data))) => {
                    conn.push_pong(data.to_vec());
                }
                Some(Ok(Message::Pong(_))) => conn.touch_pong(),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    trace!(client_id = conn.id, err = %e, "websocket read error");
                    break;
                }
            }
        }
    }
}

async fn write_loop(
    ctx: Arc<AppContext>,
    conn: Arc<ClientConnection>,
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
) {
    let write_timeout = ctx.config.server.write_timeout;
    let pong_wait = ctx.config.server.pong_wait;
    let mut ping = tokio::time::interval(ctx.config.server.ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so the first ping goes out
    // one full interval after connect.
    ping.tick().await;

    loop {
        tokio::select! {
            _ = conn.cancel.cancelled() => break,

            _ = conn.writer_wake() => {
                if drain_queue(&mut sink, &conn, write_timeout).await.is_err() {
                    close_connection(&ctx, &conn, "going away");
                    break;
                }
            }

            _ = ping.tick() => {
                if conn.pong_age() > pong_wait {
                    info!(client_id = conn.id, "no pong within pong_wait — closing idle connection");
                    close_connection(&ctx, &conn, "idle");
                    break;
                }
                if let Some(cap) = ctx.config.server.auto_close_after {
                    if conn.uptime() > cap {
                        info!(client_id = conn.id, "connection lifetime cap reached");
                        close_connection(&ctx, &conn, "going away");
                        break;
                    }
                }
                if timeout(write_timeout, sink.send(Message::Ping(Vec::new())))
                    .await
                    .map(|r| r.is_err())
                    .unwrap_or(true)
                {
                    close_connection(&ctx, &conn, "going away");
                    break;
                }
            }
        }
    }

    // Final drain: flush whatever is still queued, bounded by the cleanup
    // budget, then say goodbye on the wire and drop the socket.
    let cleanup = ctx.config.server.client_cleanup_timeout;
    let _ = timeout(cleanup, async {
        let _ = drain_queue(&mut sink, &conn, write_timeout).await;
    })
    .await;

    let reason = conn.close_reason().unwrap_or("going away");
    let code = if reason == "idle" {
        CloseCode::Normal
    } else {
        CloseCode::Away
    };
    let _ = timeout(
        write_timeout,
        sink.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }))),
    )
    .await;
    let _ = sink.close().await;
}

/// Write every queued frame, in enqueue order.
async fn drain_queue(
    sink: &mut SplitSink<WebSocketStream<TcpStream>, Message>,
    conn: &Arc<ClientConnection>,
    write_timeout: std::time::Duration,
) -> std::result::Result<(), ()> {
    while let Some(frame) = conn.pop_outbound() {
        let message = match frame {
            Outbound::Response(text) | Outbound::Notification(text) => Message::Text(text),
            Outbound::Pong(data) => Message::Pong(data),
        };
        match timeout(write_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                trace!(client_id = conn.id, err = %e, "websocket write error");
                return Err(());
            }
            Err(_) => {
                warn!(client_id = conn.id, "write timed out — dropping connection");
                return Err(());
            }
        }
    }
    Ok(())
}

// ─── Plain HTTP answers on the shared port ───────────────────────────────────

async fn respond_health(mut stream: TcpStream, ctx: &Arc<AppContext>) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Consume the request head; the body is irrelevant.
    let mut req_buf = [0u8; 256];
    let _ = stream.read(&mut req_buf).await;

    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": ctx.started_at.elapsed().as_secs(),
        "ready": ctx.readiness.is_ready(),
        "active_connections": ctx.registry.len(),
    })
    .to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

async fn respond_503(mut stream: TcpStream) -> Result<()> {
    use tokio::io::AsyncWriteExt;
    let body = r#"{"error":"connection limit reached"}"#;
    let response = format!(
        "HTTP/1.1 503 Service Unavailable\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}
