//! Write-once method registry.
//!
//! Built exactly once during server construction and wrapped in an `Arc`;
//! lookups afterwards are plain `HashMap` reads with no lock. A descriptor
//! carries everything the dispatcher needs to gate a call — auth, role,
//! readiness, timeout — so policy lives in this table, not in the handlers.

use crate::api::connection::ClientConnection;
use crate::api::error::RpcError;
use crate::security::Role;
use crate::AppContext;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub type HandlerFuture = BoxFuture<'static, Result<Value, RpcError>>;
pub type Handler =
    Arc<dyn Fn(Value, Arc<ClientConnection>, Arc<AppContext>) -> HandlerFuture + Send + Sync>;

/// Round-trip budget for calls that touch camera hardware.
const HARDWARE_TIMEOUT: Duration = Duration::from_secs(2);
/// Round-trip budget for everything else.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const API_VERSION: &str = "1.0";

/// Immutable after registration.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: &'static str,
    pub required_role: Role,
    pub auth_required: bool,
    pub ready_required: bool,
    pub timeout: Duration,
    pub version: &'static str,
    handler: Handler,
}

impl MethodDescriptor {
    pub fn invoke(
        &self,
        params: Value,
        client: Arc<ClientConnection>,
        ctx: Arc<AppContext>,
    ) -> HandlerFuture {
        (self.handler)(params, client, ctx)
    }
}

pub struct MethodRegistry {
    methods: HashMap<&'static str, MethodDescriptor>,
}

fn method<F, Fut>(
    name: &'static str,
    required_role: Role,
    auth_required: bool,
    ready_required: bool,
    timeout: Duration,
    f: F,
) -> MethodDescriptor
where
    F: Fn(Value, Arc<ClientConnection>, Arc<AppContext>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    MethodDescriptor {
        name,
        required_role,
        auth_required,
        ready_required,
        timeout,
        version: API_VERSION,
        handler: Arc::new(move |params, client, ctx| f(params, client, ctx).boxed()),
    }
}

impl MethodRegistry {
    /// The full method table. Registration happens here and only here.
    pub fn builtin() -> Self {
        use crate::api::handlers::{
            camera, external, recording, snapshot, storage, streams, subscription, system,
        };
        use Role::{Admin, Operator, Viewer};

        let table = [
            // ── Unguarded core ──────────────────────────────────────────────
            method("ping", Viewer, false, false, DEFAULT_TIMEOUT, system::ping),
            method("authenticate", Viewer, false, false, DEFAULT_TIMEOUT, system::authenticate),
            method("get_system_status", Viewer, false, false, DEFAULT_TIMEOUT, system::get_system_status),
            // ── System ──────────────────────────────────────────────────────
            method("logout", Viewer, true, false, DEFAULT_TIMEOUT, system::logout),
            method("get_status", Admin, true, false, DEFAULT_TIMEOUT, system::get_status),
            method("get_server_info", Admin, true, false, DEFAULT_TIMEOUT, system::get_server_info),
            method("get_metrics", Admin, true, false, DEFAULT_TIMEOUT, system::get_metrics),
            // ── Cameras ─────────────────────────────────────────────────────
            method("get_camera_list", Viewer, true, true, DEFAULT_TIMEOUT, camera::get_camera_list),
            method("get_camera_status", Viewer, true, true, DEFAULT_TIMEOUT, camera::get_camera_status),
            method("get_camera_capabilities", Viewer, true, true, DEFAULT_TIMEOUT, camera::get_camera_capabilities),
            // ── Recordings ──────────────────────────────────────────────────
            method("start_recording", Operator, true, true, HARDWARE_TIMEOUT, recording::start_recording),
            method("stop_recording", Operator, true, true, HARDWARE_TIMEOUT, recording::stop_recording),
            method("list_recordings", Viewer, true, true, DEFAULT_TIMEOUT, recording::list_recordings),
            method("get_recording_info", Viewer, true, true, DEFAULT_TIMEOUT, recording::get_recording_info),
            method("delete_recording", Operator, true, true, DEFAULT_TIMEOUT, recording::delete_recording),
            // ── Snapshots ───────────────────────────────────────────────────
            method("take_snapshot", Operator, true, true, HARDWARE_TIMEOUT, snapshot::take_snapshot),
            method("list_snapshots", Viewer, true, true, DEFAULT_TIMEOUT, snapshot::list_snapshots),
            method("get_snapshot_info", Viewer, true, true, DEFAULT_TIMEOUT, snapshot::get_snapshot_info),
            method("delete_snapshot", Operator, true, true, DEFAULT_TIMEOUT, snapshot::delete_snapshot),
            // ── Storage ─────────────────────────────────────────────────────
            method("get_storage_info", Viewer, true, true, DEFAULT_TIMEOUT, storage::get_storage_info),
            method("get_retention_policy", Viewer, true, true, DEFAULT_TIMEOUT, storage::get_retention_policy),
            method("set_retention_policy", Admin, true, true, DEFAULT_TIMEOUT, storage::set_retention_policy),
            method("cleanup_old_files", Admin, true, true, DEFAULT_TIMEOUT, storage::cleanup_old_files),
            // ── Streaming ───────────────────────────────────────────────────
            method("get_streams", Viewer, true, true, DEFAULT_TIMEOUT, streams::get_streams),
            method("get_stream_url", Viewer, true, true, DEFAULT_TIMEOUT, streams::get_stream_url),
            method("get_stream_status", Viewer, true, true, DEFAULT_TIMEOUT, streams::get_stream_status),
            method("start_streaming", Operator, true, true, HARDWARE_TIMEOUT, streams::start_streaming),
            method("stop_streaming", Operator, true, true, HARDWARE_TIMEOUT, streams::stop_streaming),
            // ── External streams ────────────────────────────────────────────
            method("discover_external_streams", Operator, true, true, DEFAULT_TIMEOUT, external::discover_external_streams),
            method("add_external_stream", Operator, true, true, DEFAULT_TIMEOUT, external::add_external_stream),
            method("remove_external_stream", Operator, true, true, DEFAULT_TIMEOUT, external::remove_external_stream),
            method("get_external_streams", Viewer, true, true, DEFAULT_TIMEOUT, external::get_external_streams),
            method("set_discovery_interval", Admin, true, true, DEFAULT_TIMEOUT, external::set_discovery_interval),
            method("get_discovery_interval", Viewer, true, true, DEFAULT_TIMEOUT, external::get_discovery_interval),
            // ── Event subscriptions ─────────────────────────────────────────
            method("subscribe_events", Viewer, true, false, DEFAULT_TIMEOUT, subscription::subscribe_events),
            method("unsubscribe_events", Viewer, true, false, DEFAULT_TIMEOUT, subscription::unsubscribe_events),
            method("get_subscription_stats", Viewer, true, false, DEFAULT_TIMEOUT, subscription::get_subscription_stats),
        ];

        Self {
            methods: table.into_iter().map(|d| (d.name, d)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Registered method names, sorted (for metrics setup and server info).
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.methods.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_the_full_method_surface() {
        let registry = MethodRegistry::builtin();
        assert_eq!(registry.len(), 37);
    }

    #[test]
    fn unguarded_core_is_unguarded() {
        let registry = MethodRegistry::builtin();
        for name in ["ping", "authenticate", "get_system_status"] {
            let d = registry.get(name).unwrap();
            assert!(!d.auth_required, "{name} must not require auth");
            assert!(!d.ready_required, "{name} must not require readiness");
        }
    }

    #[test]
    fn domain_methods_require_auth_and_readiness() {
        let registry = MethodRegistry::builtin();
        for name in ["get_camera_list", "start_recording", "get_storage_info"] {
            let d = registry.get(name).unwrap();
            assert!(d.auth_required);
            assert!(d.ready_required);
        }
    }

    #[test]
    fn subscription_methods_work_before_readiness() {
        let registry = MethodRegistry::builtin();
        for name in ["subscribe_events", "unsubscribe_events", "get_subscription_stats"] {
            let d = registry.get(name).unwrap();
            assert!(d.auth_required);
            assert!(!d.ready_required, "{name} must be usable before readiness");
        }
    }

    #[test]
    fn hardware_methods_have_the_tight_timeout() {
        let registry = MethodRegistry::builtin();
        assert_eq!(
            registry.get("start_recording").unwrap().timeout,
            Duration::from_secs(2)
        );
        assert_eq!(
            registry.get("ping").unwrap().timeout,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn unknown_method_is_absent() {
        assert!(MethodRegistry::builtin().get("no_such").is_none());
    }
}
