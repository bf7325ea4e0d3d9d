//! Progressive Readiness.
//!
//! The server is safe to connect to from t=0: the listener is up and the
//! unguarded methods (`ping`, `authenticate`, `get_system_status`, the
//! subscription calls) answer immediately. Methods marked `ready_required`
//! are filtered against this gate and return the typed
//! `service_initializing` envelope until the media controller has signalled
//! readiness on its event channel. Readiness is a gate on specific methods,
//! never on the listener.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ReadinessGate {
    media_ready: AtomicBool,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.media_ready.load(Ordering::Acquire)
    }

    /// One-way transition; flipped by the event pump on `system.startup`.
    pub fn set_ready(&self) {
        self.media_ready.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_ready_and_latches() {
        let gate = ReadinessGate::new();
        assert!(!gate.is_ready());
        gate.set_ready();
        assert!(gate.is_ready());
        gate.set_ready();
        assert!(gate.is_ready());
    }
}
