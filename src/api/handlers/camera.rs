//! Camera query methods.

use super::{ok, parse_params, validate_device, NoParams};
use crate::api::connection::ClientConnection;
use crate::api::error::RpcError;
use crate::media::CameraStatus;
use crate::AppContext;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceParams {
    device: String,
}

pub async fn get_camera_list(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    let cameras = ctx.media.camera_list().await?;
    let total = cameras.len();
    let connected = cameras
        .iter()
        .filter(|c| c.status == CameraStatus::Connected)
        .count();
    Ok(json!({
        "cameras": cameras,
        "total": total,
        "connected": connected,
    }))
}

pub async fn get_camera_status(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: DeviceParams = parse_params(params)?;
    validate_device(&p.device)?;
    ok(ctx.media.camera_status(&p.device).await?)
}

pub async fn get_camera_capabilities(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: DeviceParams = parse_params(params)?;
    validate_device(&p.device)?;
    ok(ctx.media.camera_capabilities(&p.device).await?)
}
