pub mod api;
pub mod config;
pub mod media;
pub mod metrics;
pub mod security;

pub use api::{serve, serve_with_listener};

use api::connection::ConnectionRegistry;
use api::events::EventManager;
use api::methods::MethodRegistry;
use api::readiness::ReadinessGate;
use config::Config;
use media::MediaController;
use metrics::ApiMetrics;
use security::SecurityProvider;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state passed to every handler and background task.
///
/// The constructor takes every collaborator as an input — there are no
/// globals and no implicit start-order dependencies. The method registry is
/// built here, once, and is immutable for the life of the process.
pub struct AppContext {
    pub config: Arc<Config>,
    pub media: Arc<dyn MediaController>,
    pub security: Arc<dyn SecurityProvider>,
    pub metrics: Arc<ApiMetrics>,
    pub registry: Arc<ConnectionRegistry>,
    pub methods: Arc<MethodRegistry>,
    pub events: Arc<EventManager>,
    pub readiness: Arc<ReadinessGate>,
    pub started_at: std::time::Instant,
    /// Root cancellation token: cancelled once, at shutdown. Every
    /// connection token is a child of this one.
    pub shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(
        config: Config,
        media: Arc<dyn MediaController>,
        security: Arc<dyn SecurityProvider>,
    ) -> Arc<Self> {
        let methods = Arc::new(MethodRegistry::builtin());
        let metrics = Arc::new(ApiMetrics::new(methods.names()));
        let registry = Arc::new(ConnectionRegistry::new(
            config.server.max_connections,
            metrics.clone(),
        ));
        let events = Arc::new(EventManager::new(registry.clone(), metrics.clone()));

        Arc::new(Self {
            config: Arc::new(config),
            media,
            security,
            metrics,
            registry,
            methods,
            events,
            readiness: Arc::new(ReadinessGate::new()),
            started_at: std::time::Instant::now(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Request a graceful stop. Idempotent — cancelling an already-cancelled
    /// token is a no-op.
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }
}
