//! External stream discovery and management.

use super::{ok, parse_params, NoParams};
use crate::api::connection::ClientConnection;
use crate::api::error::RpcError;
use crate::AppContext;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub async fn discover_external_streams(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    let discovered = ctx.media.discover_external_streams().await?;
    let total = discovered.len();
    Ok(json!({ "streams": discovered, "total": total }))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AddStreamParams {
    stream_url: String,
    stream_name: String,
}

pub async fn add_external_stream(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: AddStreamParams = parse_params(params)?;
    if !p.stream_url.starts_with("rtsp://") && !p.stream_url.starts_with("http://")
        && !p.stream_url.starts_with("https://")
    {
        return Err(RpcError::invalid_params(
            "field 'stream_url' must be an rtsp://, http://, or https:// URL",
        ));
    }
    if p.stream_name.is_empty() {
        return Err(RpcError::invalid_params("field 'stream_name' must not be empty"));
    }
    let added = ctx
        .media
        .add_external_stream(p.stream_url, p.stream_name)
        .await?;
    info!(url = %added.stream_url, name = %added.stream_name, "external stream added");
    ok(added)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoveStreamParams {
    stream_url: String,
}

pub async fn remove_external_stream(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: RemoveStreamParams = parse_params(params)?;
    ctx.media.remove_external_stream(&p.stream_url).await?;
    info!(url = %p.stream_url, "external stream removed");
    Ok(json!({ "removed": true, "stream_url": p.stream_url }))
}

pub async fn get_external_streams(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    let streams = ctx.media.external_streams().await?;
    let total = streams.len();
    Ok(json!({ "streams": streams, "total": total }))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DiscoveryIntervalParams {
    /// Seconds between discovery scans; 0 disables periodic scanning.
    scan_interval: u64,
}

pub async fn set_discovery_interval(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: DiscoveryIntervalParams = parse_params(params)?;
    let applied = ctx.media.set_discovery_interval(p.scan_interval).await?;
    info!(interval_secs = applied, "discovery interval updated");
    Ok(json!({ "scan_interval": applied }))
}

pub async fn get_discovery_interval(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    Ok(json!({ "scan_interval": ctx.media.discovery_interval().await? }))
}
