//! Request dispatcher.
//!
//! One call per inbound text frame, spawned on its own task by the reader.
//! The gate order is fixed: decode, protocol check, method lookup,
//! readiness, rate limit, authentication, permission, then the handler.
//! Handler failures of any kind — typed errors, timeouts, panics — become
//! error frames on the connection that stays open; nothing here can take
//! the process down.

use crate::api::auth::{check_authenticated, check_permission};
use crate::api::codec::{self, RpcRequest, RpcResponse};
use crate::api::connection::ClientConnection;
use crate::api::error::{ErrorCode, RpcError};
use crate::metrics::ApiMetrics;
use crate::AppContext;
use futures_util::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, trace, warn};

/// Handle one inbound frame end to end: dispatch, then enqueue the response
/// on the connection's send queue (suppressed for notifications).
pub async fn handle_frame(ctx: Arc<AppContext>, client: Arc<ClientConnection>, text: String) {
    let received = Instant::now();
    ApiMetrics::inc(&ctx.metrics.requests_total);

    let req = match codec::decode(&text, ctx.config.server.max_message_size) {
        Ok(req) => req,
        Err(err) => {
            // The frame never parsed, so there is no id to echo; per
            // JSON-RPC 2.0 the error response carries id null.
            ApiMetrics::inc(&ctx.metrics.errors_total);
            client.push_response(RpcResponse::error(Value::Null, err).encode());
            return;
        }
    };

    let id = req.id.clone();
    let suppress = req.is_notification();
    let method = req.method.clone();

    let result = dispatch(&ctx, &client, req, received).await;

    match result {
        Outcome::Reply(Ok(value)) => {
            if !suppress {
                client.push_response(
                    RpcResponse::result(id.unwrap_or(Value::Null), value).encode(),
                );
            }
        }
        Outcome::Reply(Err(err)) => {
            ApiMetrics::inc(&ctx.metrics.errors_total);
            trace!(method = %method, code = err.code, "request failed");
            if !suppress {
                client.push_response(
                    RpcResponse::error(id.unwrap_or(Value::Null), err).encode(),
                );
            }
        }
        Outcome::Abandoned => {
            // Connection is closing; in-flight work is cancelled and no
            // response may be sent.
            trace!(method = %method, client_id = client.id, "request abandoned on close");
        }
    }
}

enum Outcome {
    Reply(Result<Value, RpcError>),
    Abandoned,
}

async fn dispatch(
    ctx: &Arc<AppContext>,
    client: &Arc<ClientConnection>,
    req: RpcRequest,
    received: Instant,
) -> Outcome {
    if req.jsonrpc != "2.0" {
        return Outcome::Reply(Err(RpcError::invalid_request(format!(
            "unsupported jsonrpc version '{}'",
            req.jsonrpc
        ))));
    }

    let Some(descriptor) = ctx.methods.get(&req.method) else {
        return Outcome::Reply(Err(RpcError::method_not_found(&req.method)));
    };

    // Progressive Readiness: guarded methods are filtered, not queued.
    if descriptor.ready_required && !ctx.readiness.is_ready() {
        return Outcome::Reply(Err(RpcError::service_initializing()));
    }

    if let Err(hit) = client.limiter.check(descriptor.name) {
        ApiMetrics::inc(&ctx.metrics.rate_limit_hits);
        return Outcome::Reply(Err(RpcError::rate_limited(&hit.bucket, hit.retry_after)));
    }

    if descriptor.auth_required {
        let auth = match check_authenticated(client) {
            Ok(auth) => auth,
            Err(err) => return Outcome::Reply(Err(err)),
        };
        if let Err(err) = check_permission(descriptor.name, &auth, descriptor.required_role) {
            return Outcome::Reply(Err(err));
        }
    }

    // Handlers always see an object — an absent params field is `{}`.
    let params = req.params.unwrap_or_else(|| Value::Object(Default::default()));

    let invocation = AssertUnwindSafe(descriptor.invoke(
        params,
        Arc::clone(client),
        Arc::clone(ctx),
    ))
    .catch_unwind();

    let result = tokio::select! {
        // Close cancels all in-flight handlers for this connection.
        _ = client.cancel.cancelled() => return Outcome::Abandoned,
        outcome = tokio::time::timeout(descriptor.timeout, invocation) => match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => {
                ApiMetrics::inc(&ctx.metrics.incidents_total);
                error!(
                    method = descriptor.name,
                    client_id = client.id,
                    panic = panic_message(&panic),
                    "handler panicked; incident isolated"
                );
                Err(RpcError::new(
                    ErrorCode::InternalError,
                    "handler_panic",
                    "the request handler failed unexpectedly",
                    "retry; contact the administrator if the problem persists",
                ))
            }
            Err(_elapsed) => {
                warn!(method = descriptor.name, "method exceeded its round-trip budget");
                Err(RpcError::new(
                    ErrorCode::InternalError,
                    "timeout",
                    format!(
                        "method '{}' exceeded its {} ms budget",
                        descriptor.name,
                        descriptor.timeout.as_millis()
                    ),
                    "retry; the media backend may be under load",
                ))
            }
        }
    };

    ctx.metrics
        .observe_method_ms(descriptor.name, received.elapsed().as_millis() as u64);

    Outcome::Reply(result)
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
