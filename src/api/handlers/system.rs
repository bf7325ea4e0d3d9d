//! Core and system methods: `ping`, `authenticate`, `logout`, the
//! Progressive Readiness poll, and the admin-facing introspection calls.

use super::{ok, parse_params, NoParams};
use crate::api::connection::{AuthState, ClientConnection};
use crate::api::error::RpcError;
use crate::AppContext;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub async fn ping(
    params: Value,
    _client: Arc<ClientConnection>,
    _ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    Ok(json!("pong"))
}

// ─── Authentication ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuthenticateParams {
    auth_token: String,
}

/// The only transition from `Unauthenticated` to `Authenticated`. Failure
/// leaves the connection anonymous and open.
pub async fn authenticate(
    params: Value,
    client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: AuthenticateParams = parse_params(params)?;

    let claims = ctx
        .security
        .validate_token(&p.auth_token)
        .map_err(|e| RpcError::auth_required(e.to_string()))?;

    let session_id = uuid::Uuid::new_v4().to_string();
    client.set_authenticated(AuthState {
        authenticated: true,
        user_id: Some(claims.sub.clone()),
        role: Some(claims.role),
        auth_method: Some("jwt"),
        expires_at: Some(claims.exp),
        session_id: Some(session_id.clone()),
    });
    info!(
        client_id = client.id,
        user_id = %claims.sub,
        role = %claims.role,
        "client authenticated"
    );

    Ok(json!({
        "role": claims.role,
        "permissions": ctx.security.permissions(claims.role),
        "expires_at": claims.exp,
        "session_id": session_id,
    }))
}

pub async fn logout(
    params: Value,
    client: Arc<ClientConnection>,
    _ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    client.clear_auth();
    debug!(client_id = client.id, "client logged out");
    Ok(json!({ "logged_out": true }))
}

// ─── Status & introspection ──────────────────────────────────────────────────

/// Always answerable, from t=0: this is the poll clients use to wait out
/// Progressive Readiness without being blocked.
pub async fn get_system_status(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;

    if !ctx.readiness.is_ready() {
        return Ok(json!({
            "status": "starting",
            "message": "service is initializing; camera discovery has not completed",
            "available_cameras": [],
            "discovery_active": false,
        }));
    }

    let status = ctx.media.system_status().await?;
    ok(status)
}

pub async fn get_status(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    Ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": ctx.started_at.elapsed().as_secs(),
        "components": {
            "websocket_server": "running",
            "media_controller": if ctx.readiness.is_ready() { "ready" } else { "starting" },
        },
        "active_connections": ctx.registry.len(),
    }))
}

pub async fn get_server_info(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    Ok(json!({
        "name": "camd",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "1.0",
        "methods": ctx.methods.names(),
        "limits": {
            "max_connections": ctx.config.server.max_connections,
            "max_message_size": ctx.config.server.max_message_size,
        },
        "websocket_path": ctx.config.server.websocket_path,
    }))
}

pub async fn get_metrics(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    let mut snapshot = ctx.metrics.snapshot();
    snapshot["uptime_secs"] = json!(ctx.started_at.elapsed().as_secs());
    Ok(snapshot)
}
