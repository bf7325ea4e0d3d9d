//! Snapshot capture and catalogue methods.

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
struct TakeSnapshotParams {
    device: String,
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilenameParams {
    filename: String,
}

pub async fn take_snapshot(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: TakeSnapshotParams = parse_params(params)?;
    validate_device(&p.device)?;
    if let Some(filename) = &p.filename {
        if filename.is_empty() || filename.contains('/') || filename.contains("..") {
            return Err(RpcError::invalid_params(
                "field 'filename' must be a bare file name without path separators",
            ));
        }
    }
    let snap = ctx.media.take_snapshot(&p.device, p.filename).await?;
    info!(device = %snap.device, filename = %snap.filename, "snapshot taken");
    ok(snap)
}

pub async fn list_snapshots(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: PageParams = parse_params(params)?;
    ok(ctx.media.list_snapshots(p.limit(), p.offset()).await?)
}

pub async fn get_snapshot_info(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: FilenameParams = parse_params(params)?;
    ok(ctx.media.snapshot_info(&p.filename).await?)
}

pub async fn delete_snapshot(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: FilenameParams = parse_params(params)?;
    ctx.media.delete_snapshot(&p.filename).await?;
    info!(filename = %p.filename, "snapshot deleted");
    Ok(json!({ "deleted": true, "filename": p.filename }))
}
