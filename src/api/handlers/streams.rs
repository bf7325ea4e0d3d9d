//! Streaming path methods.

use super::{ok, parse_params, validate_device, NoParams};
use crate::api::connection::ClientConnection;
use crate::api::error::RpcError;
use crate::AppContext;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceParams {
    device: String,
}

pub async fn get_streams(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    let streams = ctx.media.streams().await?;
    let total = streams.len();
    Ok(json!({ "streams": streams, "total": total }))
}

pub async fn get_stream_url(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: DeviceParams = parse_params(params)?;
    validate_device(&p.device)?;
    let urls = ctx.media.stream_url(&p.device).await?;
    Ok(json!({ "device": p.device, "streams": urls }))
}

pub async fn get_stream_status(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: DeviceParams = parse_params(params)?;
    validate_device(&p.device)?;
    ok(ctx.media.stream_status(&p.device).await?)
}

pub async fn start_streaming(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: DeviceParams = parse_params(params)?;
    validate_device(&p.device)?;
    let status = ctx.media.start_streaming(&p.device).await?;
    info!(device = %p.device, "streaming started");
    ok(status)
}

pub async fn stop_streaming(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: DeviceParams = parse_params(params)?;
    validate_device(&p.device)?;
    let status = ctx.media.stop_streaming(&p.device).await?;
    info!(device = %p.device, "streaming stopped");
    ok(status)
}
