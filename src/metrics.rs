//! Process-wide performance counters.
//!
//! All counters are atomics incremented inline on the hot path — no external
//! metrics library, no locks. The per-method latency histograms use a fixed
//! bucket layout allocated once at server construction, so recording a
//! sample is a couple of relaxed atomic adds.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Histogram bucket upper bounds, milliseconds.
const BUCKET_BOUNDS_MS: [u64; 10] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 2500];

/// Fixed-bucket latency histogram. One per registered method.
#[derive(Debug)]
pub struct LatencyHistogram {
    /// `buckets[i]` counts samples ≤ `BUCKET_BOUNDS_MS[i]`; the final slot
    /// is the overflow bucket.
    buckets: [AtomicU64; BUCKET_BOUNDS_MS.len() + 1],
    count: AtomicU64,
    sum_ms: AtomicU64,
}

impl LatencyHistogram {
    fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            sum_ms: AtomicU64::new(0),
        }
    }

    pub fn observe_ms(&self, ms: u64) {
        let idx = BUCKET_BOUNDS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(BUCKET_BOUNDS_MS.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_ms.fetch_add(ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Value {
        let count = self.count.load(Ordering::Relaxed);
        let sum = self.sum_ms.load(Ordering::Relaxed);
        let avg = if count > 0 { sum as f64 / count as f64 } else { 0.0 };
        json!({
            "count": count,
            "sum_ms": sum,
            "avg_ms": avg,
            "buckets": BUCKET_BOUNDS_MS
                .iter()
                .enumerate()
                .map(|(i, bound)| json!({
                    "le_ms": bound,
                    "count": self.buckets[i].load(Ordering::Relaxed),
                }))
                .chain(std::iter::once(json!({
                    "le_ms": "inf",
                    "count": self.buckets[BUCKET_BOUNDS_MS.len()].load(Ordering::Relaxed),
                })))
                .collect::<Vec<_>>(),
        })
    }
}

/// In-process counters shared across all connections.
#[derive(Debug)]
pub struct ApiMetrics {
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
    /// Gauge — connections currently in the registry.
    pub active_connections: AtomicU64,
    pub rate_limit_hits: AtomicU64,
    /// Handler panics converted to internal errors.
    pub incidents_total: AtomicU64,
    pub events_published: AtomicU64,
    pub events_delivered: AtomicU64,
    pub events_dropped: AtomicU64,
    /// Per-method latency, keyed by registered method name.
    histograms: HashMap<&'static str, LatencyHistogram>,
}

impl ApiMetrics {
    pub fn new(method_names: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            rate_limit_hits: AtomicU64::new(0),
            incidents_total: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            histograms: method_names
                .into_iter()
                .map(|name| (name, LatencyHistogram::new()))
                .collect(),
        }
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_method_ms(&self, method: &str, ms: u64) {
        if let Some(hist) = self.histograms.get(method) {
            hist.observe_ms(ms);
        }
    }

    /// Full snapshot served by `get_metrics`.
    pub fn snapshot(&self) -> Value {
        let mut methods: Vec<(&str, Value)> = self
            .histograms
            .iter()
            .filter(|(_, h)| h.count.load(Ordering::Relaxed) > 0)
            .map(|(name, h)| (*name, h.snapshot()))
            .collect();
        methods.sort_by_key(|(name, _)| *name);

        json!({
            "requests_total": self.requests_total.load(Ordering::Relaxed),
            "errors_total": self.errors_total.load(Ordering::Relaxed),
            "active_connections": self.active_connections.load(Ordering::Relaxed),
            "rate_limit_hits": self.rate_limit_hits.load(Ordering::Relaxed),
            "incidents_total": self.incidents_total.load(Ordering::Relaxed),
            "events": {
                "published": self.events_published.load(Ordering::Relaxed),
                "delivered": self.events_delivered.load(Ordering::Relaxed),
                "dropped": self.events_dropped.load(Ordering::Relaxed),
            },
            "response_times": methods
                .into_iter()
                .map(|(name, v)| (name.to_owned(), v))
                .collect::<serde_json::Map<_, _>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_buckets_samples() {
        let m = ApiMetrics::new(["ping"]);
        m.observe_method_ms("ping", 3);
        m.observe_method_ms("ping", 3000);
        let snap = m.snapshot();
        let hist = &snap["response_times"]["ping"];
        assert_eq!(hist["count"], 2);
        assert_eq!(hist["sum_ms"], 3003);
        // 3 ms lands in the ≤5 bucket, 3000 ms overflows.
        assert_eq!(hist["buckets"][1]["count"], 1);
        assert_eq!(hist["buckets"][10]["count"], 1);
    }

    #[test]
    fn unknown_method_is_ignored() {
        let m = ApiMetrics::new(["ping"]);
        m.observe_method_ms("nope", 1);
        assert!(m.snapshot()["response_times"]
            .as_object()
            .unwrap()
            .is_empty());
    }
}
