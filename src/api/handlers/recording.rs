//! Recording control and catalogue methods.
//!
//! `start_recording` returns as soon as the controller has accepted the
//! job — the recording's wall clock is owned by the controller, not by the
//! dispatcher's round-trip budget.

use super::{ok, parse_params, validate_device, PageParams};
use crate::api::connection::ClientConnection;
use crate::api::error::RpcError;
use crate::AppContext;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StartRecordingParams {
    device: String,
    /// Planned recording length in seconds; unbounded when absent.
    duration: Option<u64>,
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceParams {
    device: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilenameParams {
    filename: String,
}

const SUPPORTED_FORMATS: [&str; 3] = ["fmp4", "mp4", "mkv"];

pub async fn start_recording(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: StartRecordingParams = parse_params(params)?;
    validate_device(&p.device)?;
    if let Some(format) = &p.format {
        if !SUPPORTED_FORMATS.contains(&format.as_str()) {
            return Err(RpcError::invalid_params(format!(
                "field 'format' must be one of {SUPPORTED_FORMATS:?}, got '{format}'"
            )));
        }
    }
    if p.duration == Some(0) {
        return Err(RpcError::invalid_params(
            "field 'duration' must be a positive number of seconds",
        ));
    }

    let started = ctx
        .media
        .start_recording(&p.device, p.duration, p.format)
        .await?;
    info!(device = %started.device, filename = %started.filename, "recording started");
    ok(started)
}

pub async fn stop_recording(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: DeviceParams = parse_params(params)?;
    validate_device(&p.device)?;
    let stopped = ctx.media.stop_recording(&p.device).await?;
    info!(device = %stopped.device, filename = %stopped.filename, "recording stopped");
    ok(stopped)
}

pub async fn list_recordings(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: PageParams = parse_params(params)?;
    ok(ctx.media.list_recordings(p.limit(), p.offset()).await?)
}

pub async fn get_recording_info(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: FilenameParams = parse_params(params)?;
    ok(ctx.media.recording_info(&p.filename).await?)
}

pub async fn delete_recording(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: FilenameParams = parse_params(params)?;
    ctx.media.delete_recording(&p.filename).await?;
    info!(filename = %p.filename, "recording deleted");
    Ok(json!({ "deleted": true, "filename": p.filename }))
}
