//! Topic subscriptions and event fan-out.
//!
//! The subscription index is the one shared-mutable structure on the hot
//! path. Fan-out takes the read lock just long enough to snapshot the
//! subscriber set, releases it, and only then touches send queues — so a
//! slow client can never stall a publish, and no two locks are ever held
//! together.

use crate::api::codec::encode_notification;
use crate::api::connection::{ConnectionRegistry, PushOutcome};
use crate::api::readiness::ReadinessGate;
use crate::media::MediaEvent;
use crate::metrics::ApiMetrics;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

// ─── Topics ──────────────────────────────────────────────────────────────────

/// The closed set of notification topics. Subscribing to anything outside
/// this set is an invalid-params error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    CameraConnected,
    CameraDisconnected,
    CameraStatusChange,
    RecordingStart,
    RecordingStop,
    RecordingError,
    SnapshotTaken,
    SystemStartup,
    SystemShutdown,
    SystemHealth,
    StorageLow,
    StorageCritical,
    StreamStarted,
    StreamStopped,
}

impl Topic {
    pub const ALL: [Topic; 14] = [
        Topic::CameraConnected,
        Topic::CameraDisconnected,
        Topic::CameraStatusChange,
        Topic::RecordingStart,
        Topic::RecordingStop,
        Topic::RecordingError,
        Topic::SnapshotTaken,
        Topic::SystemStartup,
        Topic::SystemShutdown,
        Topic::SystemHealth,
        Topic::StorageLow,
        Topic::StorageCritical,
        Topic::StreamStarted,
        Topic::StreamStopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::CameraConnected => "camera.connected",
            Topic::CameraDisconnected => "camera.disconnected",
            Topic::CameraStatusChange => "camera.status_change",
            Topic::RecordingStart => "recording.start",
            Topic::RecordingStop => "recording.stop",
            Topic::RecordingError => "recording.error",
            Topic::SnapshotTaken => "snapshot.taken",
            Topic::SystemStartup => "system.startup",
            Topic::SystemShutdown => "system.shutdown",
            Topic::SystemHealth => "system.health",
            Topic::StorageLow => "storage.low",
            Topic::StorageCritical => "storage.critical",
            Topic::StreamStarted => "stream.started",
            Topic::StreamStopped => "stream.stopped",
        }
    }

    pub fn parse(s: &str) -> Option<Topic> {
        Topic::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Subscription index ──────────────────────────────────────────────────────

/// Bidirectional index; both views are mutated under one write lock so they
/// can never disagree.
#[derive(Debug, Default)]
struct SubscriptionIndex {
    by_topic: HashMap<Topic, HashSet<u64>>,
    by_client: HashMap<u64, HashSet<Topic>>,
}

impl SubscriptionIndex {
    fn subscribe(&mut self, client_id: u64, topics: &[Topic]) {
        for &topic in topics {
            self.by_topic.entry(topic).or_default().insert(client_id);
            self.by_client.entry(client_id).or_default().insert(topic);
        }
    }

    fn unsubscribe(&mut self, client_id: u64, topics: Option<&[Topic]>) {
        match topics {
            Some(topics) => {
                for &topic in topics {
                    if let Some(subscribers) = self.by_topic.get_mut(&topic) {
                        subscribers.remove(&client_id);
                        if subscribers.is_empty() {
                            self.by_topic.remove(&topic);
                        }
                    }
                    if let Some(set) = self.by_client.get_mut(&client_id) {
                        set.remove(&topic);
                        if set.is_empty() {
                            self.by_client.remove(&client_id);
                        }
                    }
                }
            }
            None => {
                if let Some(topics) = self.by_client.remove(&client_id) {
                    for topic in topics {
                        if let Some(subscribers) = self.by_topic.get_mut(&topic) {
                            subscribers.remove(&client_id);
                            if subscribers.is_empty() {
                                self.by_topic.remove(&topic);
                            }
                        }
                    }
                }
            }
        }
    }
}

// ─── Event manager ───────────────────────────────────────────────────────────

pub struct EventManager {
    index: RwLock<SubscriptionIndex>,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<ApiMetrics>,
}

impl EventManager {
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<ApiMetrics>) -> Self {
        Self {
            index: RwLock::new(SubscriptionIndex::default()),
            registry,
            metrics,
        }
    }

    /// Additive subscribe: repeated calls union topics. The caller has
    /// already validated the topic names — only valid topics reach here, so
    /// the call can never partially apply.
    pub fn subscribe(&self, client_id: u64, topics: &[Topic]) {
        self.index
            .write()
            .expect("subscription lock poisoned")
            .subscribe(client_id, topics);
        debug!(client_id, count = topics.len(), "subscribed to topics");
    }

    /// `None` removes every topic for the client.
    pub fn unsubscribe(&self, client_id: u64, topics: Option<&[Topic]>) {
        self.index
            .write()
            .expect("subscription lock poisoned")
            .unsubscribe(client_id, topics);
    }

    /// Purge a closing client from both views.
    pub fn remove_client(&self, client_id: u64) {
        self.unsubscribe(client_id, None);
    }

    pub fn client_topics(&self, client_id: u64) -> Vec<String> {
        let index = self.index.read().expect("subscription lock poisoned");
        let mut topics: Vec<&'static str> = index
            .by_client
            .get(&client_id)
            .map(|set| set.iter().map(|t| t.as_str()).collect())
            .unwrap_or_default();
        topics.sort_unstable();
        topics.into_iter().map(str::to_owned).collect()
    }

    /// `get_subscription_stats` document.
    pub fn stats(&self, client_id: u64) -> Value {
        let (active_clients, topic_counts) = {
            let index = self.index.read().expect("subscription lock poisoned");
            let counts: BTreeMap<&'static str, usize> = index
                .by_topic
                .iter()
                .map(|(topic, subs)| (topic.as_str(), subs.len()))
                .collect();
            (index.by_client.len(), counts)
        };
        json!({
            "global_stats": {
                "active_clients": active_clients,
                "topic_counts": topic_counts,
                "events_published": self.metrics.events_published.load(std::sync::atomic::Ordering::Relaxed),
                "events_delivered": self.metrics.events_delivered.load(std::sync::atomic::Ordering::Relaxed),
                "events_dropped": self.metrics.events_dropped.load(std::sync::atomic::Ordering::Relaxed),
            },
            "client_topics": self.client_topics(client_id),
            "client_id": client_id,
        })
    }

    /// Fan one event out to every subscriber of its topic.
    ///
    /// The subscriber set is snapshotted under the read lock and the lock
    /// released before any send queue is touched.
    pub fn publish(&self, topic: Topic, payload: &Value) {
        ApiMetrics::inc(&self.metrics.events_published);

        let subscribers: Vec<u64> = {
            let index = self.index.read().expect("subscription lock poisoned");
            match index.by_topic.get(&topic) {
                Some(subs) => subs.iter().copied().collect(),
                None => return,
            }
        };

        let frame = encode_notification(topic.as_str(), payload);
        let mut delivered = 0u64;
        for client_id in subscribers {
            let Some(conn) = self.registry.get(client_id) else {
                continue;
            };
            match conn.push_notification(frame.clone()) {
                PushOutcome::Queued => delivered += 1,
                PushOutcome::DroppedOldest => {
                    delivered += 1;
                    ApiMetrics::inc(&self.metrics.events_dropped);
                }
                PushOutcome::Closed => {}
            }
        }
        self.metrics
            .events_delivered
            .fetch_add(delivered, std::sync::atomic::Ordering::Relaxed);
        trace!(topic = %topic, delivered, "event fanned out");
    }
}

// ─── Controller event pump ───────────────────────────────────────────────────

/// Consume the Media Controller's event channel: flip the readiness gate on
/// the startup signal and fan every event out to subscribers. Runs until the
/// server token is cancelled.
pub async fn run_event_pump(
    manager: Arc<EventManager>,
    readiness: Arc<ReadinessGate>,
    mut events: broadcast::Receiver<MediaEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Ok(MediaEvent { topic, payload }) => {
                    if topic == Topic::SystemStartup && !readiness.is_ready() {
                        readiness.set_ready();
                        info!("media controller signalled readiness");
                    }
                    manager.publish(topic, &payload);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event pump lagged behind the controller");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    debug!("event pump stopped");
}
