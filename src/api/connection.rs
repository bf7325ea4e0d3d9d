//! Per-client connection state and the process-wide connection registry.
//!
//! Each live WebSocket owns one [`ClientConnection`]. Mutable state is split
//! into short-held mutexes (auth, send queue, pong clock) so neither the
//! dispatcher nor the fan-out path ever holds a lock across an await. All
//! outbound traffic — responses and notifications alike — goes through the
//! bounded send queue and is written by the connection's writer task, which
//! keeps socket writes single-owner and in enqueue order.

use crate::api::rate_limit::ConnectionLimiter;
use crate::metrics::ApiMetrics;
use crate::security::Role;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ─── Auth state ──────────────────────────────────────────────────────────────

/// Authentication state for one connection. Cleared on logout or when the
/// dispatcher observes token expiry.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub authenticated: bool,
    pub user_id: Option<String>,
    pub role: Option<Role>,
    pub auth_method: Option<&'static str>,
    /// Unix seconds after which the session is invalid.
    pub expires_at: Option<i64>,
    pub session_id: Option<String>,
}

// ─── Outbound queue ──────────────────────────────────────────────────────────

/// A frame waiting in the send queue. Responses always enqueue; only
/// notifications are eligible for overflow drops.
#[derive(Debug)]
pub enum Outbound {
    Response(String),
    Notification(String),
    /// Reply to a client-initiated ping.
    Pong(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued, but the oldest pending notification was evicted to make room.
    DroppedOldest,
    /// Connection already closed; frame discarded.
    Closed,
}

// ─── Client connection ───────────────────────────────────────────────────────

pub struct ClientConnection {
    /// Opaque id, unique for the process lifetime.
    pub id: u64,
    pub remote_addr: SocketAddr,
    pub connected_at: chrono::DateTime<chrono::Utc>,
    /// Cancelled when the connection closes; child of the server token, and
    /// parent of every in-flight request on this connection.
    pub cancel: CancellationToken,
    pub limiter: ConnectionLimiter,
    auth: Mutex<AuthState>,
    queue: Mutex<VecDeque<Outbound>>,
    queue_capacity: usize,
    writer_wake: Notify,
    last_pong: Mutex<Instant>,
    closed: AtomicBool,
    close_reason: Mutex<Option<&'static str>>,
}

impl ClientConnection {
    fn new(
        id: u64,
        remote_addr: SocketAddr,
        cancel: CancellationToken,
        queue_capacity: usize,
    ) -> Self {
        Self {
            id,
            remote_addr,
            connected_at: chrono::Utc::now(),
            cancel,
            limiter: ConnectionLimiter::new(),
            auth: Mutex::new(AuthState::default()),
            queue: Mutex::new(VecDeque::new()),
            queue_capacity,
            writer_wake: Notify::new(),
            last_pong: Mutex::new(Instant::now()),
            closed: AtomicBool::new(false),
            close_reason: Mutex::new(None),
        }
    }

    // ── Auth ────────────────────────────────────────────────────────────────

    pub fn auth_snapshot(&self) -> AuthState {
        self.auth.lock().expect("auth lock poisoned").clone()
    }

    pub fn set_authenticated(&self, state: AuthState) {
        *self.auth.lock().expect("auth lock poisoned") = state;
    }

    /// Drop back to anonymous. Used by logout and by expiry demotion.
    pub fn clear_auth(&self) {
        *self.auth.lock().expect("auth lock poisoned") = AuthState::default();
    }

    // ── Send queue ──────────────────────────────────────────────────────────

    /// Enqueue a response frame. Responses are never dropped; the queue bound
    /// applies to notifications only, and in-flight requests are themselves
    /// bounded by the rate limiter.
    pub fn push_response(&self, frame: String) -> PushOutcome {
        if self.closed.load(Ordering::Acquire) {
            return PushOutcome::Closed;
        }
        self.queue
            .lock()
            .expect("queue lock poisoned")
            .push_back(Outbound::Response(frame));
        self.writer_wake.notify_one();
        PushOutcome::Queued
    }

    /// Enqueue a notification frame. On overflow the oldest queued
    /// notification is evicted — delivery is at-most-once with a recency
    /// bias, and the caller accounts the drop.
    pub fn push_notification(&self, frame: String) -> PushOutcome {
        if self.closed.load(Ordering::Acquire) {
            return PushOutcome::Closed;
        }
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        let mut outcome = PushOutcome::Queued;
        if queue.len() >= self.queue_capacity {
            if let Some(pos) = queue
                .iter()
                .position(|f| matches!(f, Outbound::Notification(_)))
            {
                queue.remove(pos);
                outcome = PushOutcome::DroppedOldest;
            }
        }
        queue.push_back(Outbound::Notification(frame));
        drop(queue);
        self.writer_wake.notify_one();
        outcome
    }

    /// Queue a pong reply. Control frames bypass the notification bound.
    pub fn push_pong(&self, data: Vec<u8>) -> PushOutcome {
        if self.closed.load(Ordering::Acquire) {
            return PushOutcome::Closed;
        }
        self.queue
            .lock()
            .expect("queue lock poisoned")
            .push_back(Outbound::Pong(data));
        self.writer_wake.notify_one();
        PushOutcome::Queued
    }

    pub fn pop_outbound(&self) -> Option<Outbound> {
        self.queue.lock().expect("queue lock poisoned").pop_front()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.lock().expect("queue lock poisoned").is_empty()
    }

    /// Resolves when the writer has frames to drain.
    pub async fn writer_wake(&self) {
        self.writer_wake.notified().await;
    }

    // ── Liveness ────────────────────────────────────────────────────────────

    pub fn touch_pong(&self) {
        *self.last_pong.lock().expect("pong lock poisoned") = Instant::now();
    }

    pub fn pong_age(&self) -> Duration {
        self.last_pong.lock().expect("pong lock poisoned").elapsed()
    }

    pub fn uptime(&self) -> Duration {
        (chrono::Utc::now() - self.connected_at)
            .to_std()
            .unwrap_or_default()
    }

    // ── Teardown ────────────────────────────────────────────────────────────

    /// First caller wins; closure is idempotent.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn set_close_reason(&self, reason: &'static str) {
        *self.close_reason.lock().expect("close reason lock poisoned") = Some(reason);
    }

    pub fn close_reason(&self) -> Option<&'static str> {
        *self.close_reason.lock().expect("close reason lock poisoned")
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// All live connections. A connection is present here iff its socket is
/// open; removal and socket teardown are driven together by the connection's
/// close path in `api::run`.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<u64, Arc<ClientConnection>>>,
    next_id: AtomicU64,
    max_connections: usize,
    metrics: Arc<ApiMetrics>,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize, metrics: Arc<ApiMetrics>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_connections,
            metrics,
        }
    }

    /// Cheap pre-upgrade admission probe, used to refuse the HTTP upgrade
    /// with 503 before the WebSocket handshake is attempted.
    pub fn at_capacity(&self) -> bool {
        self.len() >= self.max_connections
    }

    /// Admit a new connection, or `None` when the registry is full.
    pub fn admit(
        &self,
        remote_addr: SocketAddr,
        parent: &CancellationToken,
        queue_capacity: usize,
    ) -> Option<Arc<ClientConnection>> {
        let mut connections = self.connections.write().expect("registry lock poisoned");
        if connections.len() >= self.max_connections {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(ClientConnection::new(
            id,
            remote_addr,
            parent.child_token(),
            queue_capacity,
        ));
        connections.insert(id, conn.clone());
        self.metrics
            .active_connections
            .store(connections.len() as u64, Ordering::Relaxed);
        Some(conn)
    }

    pub fn get(&self, id: u64) -> Option<Arc<ClientConnection>> {
        self.connections
            .read()
            .expect("registry lock poisoned")
            .get(&id)
            .cloned()
    }

    /// Remove a connection. Idempotent; returns the entry if it was present.
    pub fn remove(&self, id: u64) -> Option<Arc<ClientConnection>> {
        let mut connections = self.connections.write().expect("registry lock poisoned");
        let removed = connections.remove(&id);
        self.metrics
            .active_connections
            .store(connections.len() as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.connections
            .read()
            .expect("registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all live connections (for shutdown broadcast).
    pub fn all(&self) -> Vec<Arc<ClientConnection>> {
        self.connections
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn(queue_capacity: usize) -> ClientConnection {
        ClientConnection::new(
            1,
            "127.0.0.1:9".parse().unwrap(),
            CancellationToken::new(),
            queue_capacity,
        )
    }

    #[test]
    fn responses_preserve_enqueue_order() {
        let conn = test_conn(8);
        conn.push_response("a".into());
        conn.push_notification("b".into());
        conn.push_response("c".into());
        let drained: Vec<String> = std::iter::from_fn(|| conn.pop_outbound())
            .map(|f| match f {
                Outbound::Response(s) | Outbound::Notification(s) => s,
                Outbound::Pong(_) => unreachable!(),
            })
            .collect();
        assert_eq!(drained, ["a", "b", "c"]);
    }

    #[test]
    fn overflow_drops_oldest_notification_not_responses() {
        let conn = test_conn(2);
        conn.push_response("r1".into());
        assert_eq!(conn.push_notification("n1".into()), PushOutcome::Queued);
        assert_eq!(
            conn.push_notification("n2".into()),
            PushOutcome::DroppedOldest
        );
        let drained: Vec<String> = std::iter::from_fn(|| conn.pop_outbound())
            .map(|f| match f {
                Outbound::Response(s) | Outbound::Notification(s) => s,
                Outbound::Pong(_) => unreachable!(),
            })
            .collect();
        // n1 was evicted; the response survived.
        assert_eq!(drained, ["r1", "n2"]);
    }

    #[test]
    fn closed_connection_refuses_frames() {
        let conn = test_conn(8);
        assert!(conn.mark_closed());
        assert!(!conn.mark_closed(), "closure must be idempotent");
        assert_eq!(conn.push_response("x".into()), PushOutcome::Closed);
        assert_eq!(conn.push_notification("y".into()), PushOutcome::Closed);
        assert!(conn.queue_is_empty());
    }

    #[test]
    fn registry_enforces_capacity() {
        let metrics = Arc::new(ApiMetrics::new([]));
        let registry = ConnectionRegistry::new(2, metrics.clone());
        let parent = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();

        let a = registry.admit(addr, &parent, 8).unwrap();
        let _b = registry.admit(addr, &parent, 8).unwrap();
        assert!(registry.at_capacity());
        assert!(registry.admit(addr, &parent, 8).is_none());

        registry.remove(a.id);
        assert!(registry.admit(addr, &parent, 8).is_some());
        assert_eq!(
            metrics
                .active_connections
                .load(std::sync::atomic::Ordering::Relaxed),
            2
        );
    }

    #[test]
    fn connection_ids_are_unique() {
        let registry = ConnectionRegistry::new(10, Arc::new(ApiMetrics::new([])));
        let parent = CancellationToken::new();
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let a = registry.admit(addr, &parent, 8).unwrap();
        let b = registry.admit(addr, &parent, 8).unwrap();
        assert_ne!(a.id, b.id);
    }
}
