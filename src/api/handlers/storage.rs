//! Storage and retention methods.

use super::{ok, parse_params, NoParams};
use crate::api::connection::ClientConnection;
use crate::api::error::RpcError;
use crate::media::RetentionPolicy;
use crate::AppContext;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub async fn get_storage_info(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    ok(ctx.media.storage_info().await?)
}

pub async fn get_retention_policy(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    ok(ctx.media.retention_policy().await?)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetRetentionPolicyParams {
    policy_type: String,
    max_age_days: Option<u32>,
    max_usage_percent: Option<f64>,
    enabled: bool,
}

pub async fn set_retention_policy(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: SetRetentionPolicyParams = parse_params(params)?;
    match p.policy_type.as_str() {
        "age" if p.max_age_days.is_none() => {
            return Err(RpcError::invalid_params(
                "field 'max_age_days' is required for an age policy",
            ));
        }
        "size" if p.max_usage_percent.is_none() => {
            return Err(RpcError::invalid_params(
                "field 'max_usage_percent' is required for a size policy",
            ));
        }
        "age" | "size" | "manual" => {}
        other => {
            return Err(RpcError::invalid_params(format!(
                "field 'policy_type' must be one of age, size, manual — got '{other}'"
            )));
        }
    }

    let applied = ctx
        .media
        .set_retention_policy(RetentionPolicy {
            policy_type: p.policy_type,
            max_age_days: p.max_age_days.unwrap_or(0),
            max_usage_percent: p.max_usage_percent.unwrap_or(0.0),
            enabled: p.enabled,
        })
        .await?;
    info!(policy = %applied.policy_type, enabled = applied.enabled, "retention policy updated");
    ok(applied)
}

pub async fn cleanup_old_files(
    params: Value,
    _client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    let result = ctx.media.cleanup_old_files().await?;
    info!(
        deleted = result.deleted_count,
        freed = result.freed_bytes,
        "storage cleanup completed"
    );
    ok(result)
}
