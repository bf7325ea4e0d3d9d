//! Event subscription methods.
//!
//! Topic validation is all-or-nothing: one unrecognized topic fails the
//! whole call with a typed invalid-params error and the subscription index
//! is left exactly as it was.

use super::{parse_params, NoParams};
use crate::api::connection::ClientConnection;
use crate::api::error::RpcError;
use crate::api::events::Topic;
use crate::AppContext;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Resolve every requested name against the closed topic set before any
/// state changes.
fn resolve_topics(names: &[String]) -> Result<Vec<Topic>, RpcError> {
    names
        .iter()
        .map(|name| {
            Topic::parse(name).ok_or_else(|| {
                RpcError::invalid_params(format!("field 'topics' contains unknown topic '{name}'"))
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SubscribeParams {
    topics: Vec<String>,
}

pub async fn subscribe_events(
    params: Value,
    client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: SubscribeParams = parse_params(params)?;
    if p.topics.is_empty() {
        return Err(RpcError::invalid_params("field 'topics' must not be empty"));
    }
    let topics = resolve_topics(&p.topics)?;
    ctx.events.subscribe(client.id, &topics);
    Ok(json!({ "subscribed": true, "topics": p.topics }))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnsubscribeParams {
    /// Absent means: remove every subscription this client holds.
    topics: Option<Vec<String>>,
}

pub async fn unsubscribe_events(
    params: Value,
    client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    let p: UnsubscribeParams = parse_params(params)?;
    match p.topics {
        Some(names) => {
            let topics = resolve_topics(&names)?;
            ctx.events.unsubscribe(client.id, Some(&topics));
        }
        None => ctx.events.unsubscribe(client.id, None),
    }
    Ok(json!({ "unsubscribed": true }))
}

pub async fn get_subscription_stats(
    params: Value,
    client: Arc<ClientConnection>,
    ctx: Arc<AppContext>,
) -> Result<Value, RpcError> {
    parse_params::<NoParams>(params)?;
    Ok(ctx.events.stats(client.id))
}
