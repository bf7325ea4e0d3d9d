//! End-to-end protocol tests: a real server on a free port, a real
//! WebSocket client, and the literal frames from the API contract.

mod common;

use camd::security::Role;
use common::*;
use futures_util::SinkExt;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn ping_works_without_auth() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    let resp = rpc(&mut ws, "ping", json!({}), json!(1)).await;
    assert_eq!(resp["jsonrpc"], "2.0");
    assert_eq!(resp["id"], 1);
    assert_eq!(resp["result"], "pong");
    assert!(resp.get("error").is_none());
}

#[tokio::test]
async fn request_ids_are_echoed_verbatim() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    for id in [json!(1), json!("a"), json!(Value::Null), json!(9e15)] {
        let resp = rpc(&mut ws, "ping", json!({}), id.clone()).await;
        assert_eq!(resp["id"], id);
    }
}

#[tokio::test]
async fn responses_carry_exactly_one_of_result_and_error() {
    let server = start_server().await;
    let mut ws = connect(&server).await;

    let ok = rpc(&mut ws, "ping", json!({}), json!(1)).await;
    assert!(ok.get("result").is_some() && ok.get("error").is_none());

    let err = rpc(&mut ws, "no_such", json!({}), json!(2)).await;
    assert!(err.get("result").is_none() && err.get("error").is_some());
}

#[tokio::test]
async fn notifications_get_no_response() {
    let server = start_server().await;
    let mut ws = connect(&server).await;

    // No id: even an erroring method must stay silent.
    send_raw(&mut ws, json!({ "jsonrpc": "2.0", "method": "no_such" })).await;
    send_raw(&mut ws, json!({ "jsonrpc": "2.0", "method": "ping" })).await;

    // A follow-up request with an id is the only response we may see.
    let resp = rpc(&mut ws, "ping", json!({}), json!(77)).await;
    assert_eq!(resp["id"], 77);
}

#[tokio::test]
async fn unknown_method_is_32601() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    let resp = rpc(&mut ws, "no_such", json!({}), json!(3)).await;
    assert_eq!(resp["error"]["code"], -32601);
    assert!(resp["error"]["data"]["details"]
        .as_str()
        .unwrap()
        .contains("no_such"));
}

#[tokio::test]
async fn malformed_json_is_32600_and_connection_survives() {
    let server = start_server().await;
    let mut ws = connect(&server).await;

    ws.send(Message::Text("{this is not json".into()))
        .await
        .unwrap();
    let resp = recv_frame(&mut ws).await.unwrap();
    assert_eq!(resp["error"]["code"], -32600);
    assert_eq!(resp["id"], Value::Null);

    // Still usable afterwards.
    let resp = rpc(&mut ws, "ping", json!({}), json!(4)).await;
    assert_eq!(resp["result"], "pong");
}

#[tokio::test]
async fn wrong_jsonrpc_version_is_rejected() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    send_raw(
        &mut ws,
        json!({ "jsonrpc": "1.0", "method": "ping", "id": 5 }),
    )
    .await;
    let resp = recv_response(&mut ws, &json!(5)).await;
    assert_eq!(resp["error"]["code"], -32600);
}

// ─── Progressive Readiness ───────────────────────────────────────────────────

#[tokio::test]
async fn guarded_method_before_readiness_gets_the_initializing_envelope() {
    let server = start_server_not_ready().await;
    let mut ws = connect(&server).await;

    // Auth works from t=0 — authenticate is unguarded.
    authenticate_as(&mut ws, &server, Role::Operator).await;

    let resp = rpc(
        &mut ws,
        "start_recording",
        json!({ "device": "camera0" }),
        json!("a"),
    )
    .await;
    assert_eq!(resp["id"], "a");
    assert_eq!(resp["error"]["code"], -32006);
    assert_eq!(resp["error"]["message"], "MediaMTX service unavailable");
    assert_eq!(resp["error"]["data"]["reason"], "service_initializing");
    assert!(resp["error"]["data"]["details"]
        .as_str()
        .unwrap()
        .contains("initializing"));
}

#[tokio::test]
async fn system_status_answers_before_and_after_readiness() {
    let server = start_server_not_ready().await;
    let mut ws = connect(&server).await;

    let resp = rpc(&mut ws, "get_system_status", json!({}), json!(1)).await;
    let result = &resp["result"];
    assert_eq!(result["status"], "starting");
    assert_eq!(result["available_cameras"], json!([]));
    assert_eq!(result["discovery_active"], false);

    // Flip readiness and poll again.
    server.media.start(std::time::Duration::from_millis(5));
    server.wait_ready().await;
    let resp = rpc(&mut ws, "get_system_status", json!({}), json!(2)).await;
    assert_eq!(resp["result"]["status"], "healthy");
    assert_eq!(
        resp["result"]["available_cameras"],
        json!(["camera0", "camera1"])
    );
}

// ─── Authentication & permissions ────────────────────────────────────────────

#[tokio::test]
async fn auth_required_method_fails_anonymous() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    let resp = rpc(&mut ws, "get_camera_list", json!({}), json!(1)).await;
    assert_eq!(resp["error"]["code"], -32001);
}

#[tokio::test]
async fn authenticate_returns_the_session_envelope() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    let result = authenticate_as(&mut ws, &server, Role::Operator).await;
    assert_eq!(result["role"], "operator");
    assert_eq!(result["permissions"], json!(["view", "control"]));
    assert!(result["expires_at"].as_i64().unwrap() > chrono_now());
    assert!(result["session_id"].is_string());
}

#[tokio::test]
async fn bad_token_leaves_connection_anonymous() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    let resp = rpc(
        &mut ws,
        "authenticate",
        json!({ "auth_token": "not.a.token" }),
        json!(1),
    )
    .await;
    assert_eq!(resp["error"]["code"], -32001);

    let resp = rpc(&mut ws, "get_camera_list", json!({}), json!(2)).await;
    assert_eq!(resp["error"]["code"], -32001);
}

#[tokio::test]
async fn viewer_cannot_start_recording() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Viewer).await;
    let resp = rpc(
        &mut ws,
        "start_recording",
        json!({ "device": "camera0" }),
        json!(1),
    )
    .await;
    assert_eq!(resp["error"]["code"], -32003);
}

#[tokio::test]
async fn admin_satisfies_operator_methods() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Admin).await;
    let resp = rpc(
        &mut ws,
        "take_snapshot",
        json!({ "device": "camera0" }),
        json!(1),
    )
    .await;
    assert_eq!(resp["result"]["status"], "success");
}

#[tokio::test]
async fn logout_demotes_to_anonymous() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Viewer).await;

    let resp = rpc(&mut ws, "logout", json!({}), json!(1)).await;
    assert_eq!(resp["result"]["logged_out"], true);

    let resp = rpc(&mut ws, "get_camera_list", json!({}), json!(2)).await;
    assert_eq!(resp["error"]["code"], -32001);
}

#[tokio::test]
async fn expired_token_is_rejected_at_authenticate() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    let expired = {
        use camd::security::{HmacSecurityProvider, SecurityProvider as _};
        HmacSecurityProvider::new(TEST_SECRET.as_bytes().to_vec())
            .generate_token("late-user", Role::Admin, 0)
            .unwrap()
    };
    let resp = rpc(
        &mut ws,
        "authenticate",
        json!({ "auth_token": expired }),
        json!(1),
    )
    .await;
    assert_eq!(resp["error"]["code"], -32001);
}

// ─── Params validation ───────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_device_id_is_32602() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Viewer).await;
    let resp = rpc(
        &mut ws,
        "get_camera_status",
        json!({ "device": "/dev/video0" }),
        json!(1),
    )
    .await;
    assert_eq!(resp["error"]["code"], -32602);
    assert!(resp["error"]["data"]["details"]
        .as_str()
        .unwrap()
        .contains("device"));
}

#[tokio::test]
async fn unknown_params_fields_are_rejected() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Operator).await;
    let resp = rpc(
        &mut ws,
        "start_recording",
        json!({ "device": "camera0", "bogus": true }),
        json!(1),
    )
    .await;
    assert_eq!(resp["error"]["code"], -32602);
}

#[tokio::test]
async fn missing_required_field_names_it() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Operator).await;
    let resp = rpc(&mut ws, "start_recording", json!({}), json!(1)).await;
    assert_eq!(resp["error"]["code"], -32602);
    assert!(resp["error"]["data"]["details"]
        .as_str()
        .unwrap()
        .contains("device"));
}

// ─── Domain round-trips through the controller ───────────────────────────────

#[tokio::test]
async fn camera_list_shape() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Viewer).await;
    let resp = rpc(&mut ws, "get_camera_list", json!({}), json!(1)).await;
    let result = &resp["result"];
    assert_eq!(result["total"], 2);
    assert_eq!(result["connected"], 2);
    let camera = &result["cameras"][0];
    assert_eq!(camera["device"], "camera0");
    assert_eq!(camera["status"], "CONNECTED");
    assert!(camera["streams"]["rtsp"].as_str().unwrap().starts_with("rtsp://"));
    assert!(camera["streams"]["hls"].as_str().unwrap().contains("m3u8"));
}

#[tokio::test]
async fn recording_round_trip() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Operator).await;

    let started = rpc(
        &mut ws,
        "start_recording",
        json!({ "device": "camera0", "format": "mp4" }),
        json!(1),
    )
    .await;
    assert_eq!(started["result"]["status"], "RECORDING");
    assert_eq!(started["result"]["format"], "mp4");
    let filename = started["result"]["filename"].as_str().unwrap().to_owned();

    // Starting again while recording is a typed refusal.
    let again = rpc(
        &mut ws,
        "start_recording",
        json!({ "device": "camera0" }),
        json!(2),
    )
    .await;
    assert_eq!(again["error"]["code"], -1006);

    let stopped = rpc(
        &mut ws,
        "stop_recording",
        json!({ "device": "camera0" }),
        json!(3),
    )
    .await;
    assert_eq!(stopped["result"]["status"], "STOPPED");
    assert_eq!(stopped["result"]["filename"], filename.as_str());
    assert!(stopped["result"]["file_size"].as_u64().unwrap() > 0);

    let listed = rpc(&mut ws, "list_recordings", json!({}), json!(4)).await;
    assert_eq!(listed["result"]["total"], 1);

    let deleted = rpc(
        &mut ws,
        "delete_recording",
        json!({ "filename": filename }),
        json!(5),
    )
    .await;
    assert_eq!(deleted["result"]["deleted"], true);
}

#[tokio::test]
async fn unknown_camera_is_a_typed_error() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Viewer).await;
    let resp = rpc(
        &mut ws,
        "get_camera_status",
        json!({ "device": "camera7" }),
        json!(1),
    )
    .await;
    assert_eq!(resp["error"]["code"], -32004);
}

#[tokio::test]
async fn storage_and_retention_flow() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Admin).await;

    let info = rpc(&mut ws, "get_storage_info", json!({}), json!(1)).await;
    assert_eq!(info["result"]["threshold_status"], "normal");
    assert!(info["result"]["total_space"].as_u64().unwrap() > 0);

    let set = rpc(
        &mut ws,
        "set_retention_policy",
        json!({ "policy_type": "age", "max_age_days": 7, "enabled": true }),
        json!(2),
    )
    .await;
    assert_eq!(set["result"]["max_age_days"], 7);

    let cleanup = rpc(&mut ws, "cleanup_old_files", json!({}), json!(3)).await;
    assert_eq!(cleanup["result"]["deleted_count"], 0);
}

#[tokio::test]
async fn rate_limit_names_the_bucket_and_retry_after() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Operator).await;

    // The hardware bucket allows a burst of 10; the 20th call inside one
    // second must be refused.
    let mut limited = None;
    for i in 0..20 {
        let resp = rpc(
            &mut ws,
            "take_snapshot",
            json!({ "device": "camera0" }),
            json!(i),
        )
        .await;
        if resp["error"]["code"] == -32002 {
            limited = Some(resp);
            break;
        }
    }
    let resp = limited.expect("hardware bucket never tripped");
    assert!(resp["error"]["data"]["details"]
        .as_str()
        .unwrap()
        .contains("take_snapshot"));
    assert!(resp["error"]["data"]["suggestion"]
        .as_str()
        .unwrap()
        .contains("retry after"));
}

// ─── Admin introspection ─────────────────────────────────────────────────────

#[tokio::test]
async fn metrics_require_admin_and_count_requests() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Operator).await;
    let denied = rpc(&mut ws, "get_metrics", json!({}), json!(1)).await;
    assert_eq!(denied["error"]["code"], -32003);

    let mut admin_ws = connect(&server).await;
    authenticate_as(&mut admin_ws, &server, Role::Admin).await;
    let resp = rpc(&mut admin_ws, "get_metrics", json!({}), json!(2)).await;
    let result = &resp["result"];
    assert!(result["requests_total"].as_u64().unwrap() >= 2);
    assert!(result["active_connections"].as_u64().unwrap() >= 2);
    assert!(result["response_times"].is_object());
}

#[tokio::test]
async fn server_info_lists_the_method_surface() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    authenticate_as(&mut ws, &server, Role::Admin).await;
    let resp = rpc(&mut ws, "get_server_info", json!({}), json!(1)).await;
    let methods = resp["result"]["methods"].as_array().unwrap();
    assert_eq!(methods.len(), 37);
    assert!(methods.iter().any(|m| m == "start_recording"));
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn max_connections_refuses_the_overflow_upgrade() {
    let mut config = camd::config::Config::default();
    config.server.max_connections = 1;
    let server = start_server_with(config, Some(std::time::Duration::from_millis(5))).await;

    let mut first = connect(&server).await;
    // A completed round trip guarantees the server has admitted us.
    let resp = rpc(&mut first, "ping", json!({}), json!(1)).await;
    assert_eq!(resp["result"], "pong");
    assert_eq!(server.ctx.registry.len(), 1);

    let second = tokio_tungstenite::connect_async(&server.url).await;
    assert!(second.is_err(), "second upgrade should be refused with 503");
    assert_eq!(server.ctx.registry.len(), 1);
}

#[tokio::test]
async fn shutdown_closes_connections_and_is_idempotent() {
    let server = start_server().await;
    let mut ws = connect(&server).await;
    let resp = rpc(&mut ws, "ping", json!({}), json!(1)).await;
    assert_eq!(resp["result"], "pong");

    server.ctx.begin_shutdown();
    server.ctx.begin_shutdown();

    // The server says goodbye; the stream ends.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while server.ctx.registry.len() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "registry never drained");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}

fn chrono_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
