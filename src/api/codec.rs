//! Wire codec: one JSON-RPC 2.0 frame per WebSocket text message.
//!
//! Decoding enforces the frame-size and nesting-depth limits before any
//! request state is touched; a frame the codec rejects never reaches the
//! dispatcher.

use crate::api::error::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum JSON nesting depth accepted on the wire.
pub const MAX_JSON_DEPTH: usize = 32;

// ─── Frames ──────────────────────────────────────────────────────────────────

/// Inbound request frame.
///
/// `id: None` means the field was absent — a notification, to which no
/// response frame may be emitted. An explicit `"id": null` decodes as
/// `Some(Value::Null)` and is echoed back as `null`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Notifications carry no `id` and receive no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Outbound response frame. Exactly one of `result` / `error` is present.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Server → client notification frame: `method` is the topic, no `id`.
pub fn encode_notification(topic: &str, params: &Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": topic,
        "params": params,
    })
    .to_string()
}

// ─── Decode ──────────────────────────────────────────────────────────────────

/// Decode one text frame into a request.
///
/// Rejects oversized frames, frames nested deeper than [`MAX_JSON_DEPTH`],
/// malformed JSON, and non-object `params` — all with `-32600` / `-32602`
/// before the dispatcher sees the frame.
pub fn decode(text: &str, max_size: usize) -> Result<RpcRequest, RpcError> {
    if text.len() > max_size {
        return Err(RpcError::invalid_request(format!(
            "frame of {} bytes exceeds the {} byte limit",
            text.len(),
            max_size
        )));
    }
    if json_depth(text) > MAX_JSON_DEPTH {
        return Err(RpcError::invalid_request(format!(
            "JSON nested deeper than {MAX_JSON_DEPTH} levels"
        )));
    }

    let req: RpcRequest = serde_json::from_str(text)
        .map_err(|e| RpcError::invalid_request(format!("malformed JSON-RPC frame: {e}")))?;

    // Params are keyword-style: always an object when present.
    if let Some(params) = &req.params {
        if !params.is_object() {
            return Err(RpcError::invalid_params(
                "params must be an object of keyword arguments",
            ));
        }
    }

    Ok(req)
}

/// Structural nesting depth of a JSON document, counted without parsing.
///
/// Scans brackets outside string literals; good enough to bound recursion
/// before handing the text to serde_json.
fn json_depth(text: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for b in text.bytes() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' | b'[' if !in_string => {
                depth += 1;
                max = max.max(depth);
            }
            b'}' | b']' if !in_string => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MAX: usize = 1024 * 1024;

    #[test]
    fn decodes_request_with_id() {
        let req = decode(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#, MAX).unwrap();
        assert_eq!(req.method, "ping");
        assert_eq!(req.id, Some(json!(1)));
        assert!(!req.is_notification());
    }

    #[test]
    fn absent_id_is_a_notification_but_null_id_is_not() {
        let req = decode(r#"{"jsonrpc":"2.0","method":"ping"}"#, MAX).unwrap();
        assert!(req.is_notification());

        let req = decode(r#"{"jsonrpc":"2.0","method":"ping","id":null}"#, MAX).unwrap();
        assert!(!req.is_notification());
        assert_eq!(req.id, Some(Value::Null));
    }

    #[test]
    fn malformed_json_is_invalid_request() {
        let err = decode("{not json", MAX).unwrap_err();
        assert_eq!(err.code, -32600);
    }

    #[test]
    fn positional_params_are_rejected() {
        let err = decode(r#"{"jsonrpc":"2.0","method":"ping","params":[1,2],"id":1}"#, MAX)
            .unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let big = format!(
            r#"{{"jsonrpc":"2.0","method":"ping","id":1,"params":{{"pad":"{}"}}}}"#,
            "x".repeat(2048)
        );
        let err = decode(&big, 1024).unwrap_err();
        assert_eq!(err.code, -32600);
    }

    #[test]
    fn deep_nesting_is_rejected_before_parse() {
        let mut text = String::from(r#"{"jsonrpc":"2.0","method":"ping","params":"#);
        text.push_str(&"{\"a\":".repeat(MAX_JSON_DEPTH + 2));
        text.push('1');
        text.push_str(&"}".repeat(MAX_JSON_DEPTH + 2));
        text.push('}');
        let err = decode(&text, MAX).unwrap_err();
        assert_eq!(err.code, -32600);
    }

    #[test]
    fn depth_scanner_ignores_brackets_inside_strings() {
        assert_eq!(json_depth(r#"{"a":"{[{["}"#), 1);
        assert_eq!(json_depth(r#"{"a":"\"{"}"#), 1);
        assert_eq!(json_depth(r#"{"a":[{"b":1}]}"#), 3);
    }

    #[test]
    fn response_frames_carry_exactly_one_of_result_and_error() {
        let ok = RpcResponse::result(json!(1), json!("pong")).encode();
        let v: Value = serde_json::from_str(&ok).unwrap();
        assert!(v.get("result").is_some());
        assert!(v.get("error").is_none());

        let err = RpcResponse::error(json!(1), RpcError::method_not_found("x")).encode();
        let v: Value = serde_json::from_str(&err).unwrap();
        assert!(v.get("result").is_none());
        assert_eq!(v["error"]["code"], -32601);
        assert!(v["error"]["data"]["reason"].is_string());
    }

    #[test]
    fn notification_frames_have_no_id() {
        let frame = encode_notification("system.health", &json!({"ok": true}));
        let v: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["method"], "system.health");
        assert!(v.get("id").is_none());
    }
}
