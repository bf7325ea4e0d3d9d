//! Per-connection request quotas.
//!
//! Two scopes: a global per-connection bucket and per-method buckets for the
//! hardware-touching calls. Buckets are classic token buckets — constant
//! time per check, never blocking; the dispatcher turns an overflow into a
//! −32002 with the retry-after in the suggestion.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default global per-connection rate.
pub const GLOBAL_RATE_PER_SEC: f64 = 100.0;
pub const GLOBAL_BURST: f64 = 200.0;

/// Default per-method rate for hardware-backed operations.
pub const HARDWARE_RATE_PER_SEC: f64 = 5.0;
pub const HARDWARE_BURST: f64 = 10.0;

/// Methods that get their own bucket on top of the global one.
const HARDWARE_METHODS: [&str; 3] = ["start_recording", "stop_recording", "take_snapshot"];

#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_sec: f64, burst: f64) -> Self {
        Self {
            capacity: burst,
            tokens: burst,
            refill_per_sec: rate_per_sec,
            last_refill: Instant::now(),
        }
    }

    /// Take one token, or report how long until one is available.
    fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}

/// An exceeded quota: which bucket, and when to come back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaExceeded {
    pub bucket: String,
    pub retry_after: Duration,
}

/// Per-connection limiter. One instance per live connection; the mutexes are
/// held only for the arithmetic above, never across an await.
#[derive(Debug)]
pub struct ConnectionLimiter {
    global: Mutex<TokenBucket>,
    per_method: Mutex<HashMap<&'static str, TokenBucket>>,
}

impl ConnectionLimiter {
    pub fn new() -> Self {
        Self {
            global: Mutex::new(TokenBucket::new(GLOBAL_RATE_PER_SEC, GLOBAL_BURST)),
            per_method: Mutex::new(
                HARDWARE_METHODS
                    .iter()
                    .map(|&m| (m, TokenBucket::new(HARDWARE_RATE_PER_SEC, HARDWARE_BURST)))
                    .collect(),
            ),
        }
    }

    /// Admit one request for `method`, or name the exhausted bucket.
    pub fn check(&self, method: &str) -> Result<(), QuotaExceeded> {
        let now = Instant::now();

        self.global
            .lock()
            .expect("limiter lock poisoned")
            .try_acquire(now)
            .map_err(|retry_after| QuotaExceeded {
                bucket: "connection".to_owned(),
                retry_after,
            })?;

        let mut per_method = self.per_method.lock().expect("limiter lock poisoned");
        if let Some(bucket) = per_method.get_mut(method) {
            bucket.try_acquire(now).map_err(|retry_after| QuotaExceeded {
                bucket: format!("method '{method}'"),
                retry_after,
            })?;
        }
        Ok(())
    }
}

impl Default for ConnectionLimiter {
    fn default() -> Self {
        Self::new()
    }
}
