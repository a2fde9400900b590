//! Per-session frame counters and latency accumulator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Point-in-time copy of a session's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    /// Frames accepted into the queue.
    pub received: u64,
    /// Frames that went through detection and produced a result.
    pub processed: u64,
    /// Frames displaced by backpressure or rejected by the decoder.
    pub dropped: u64,
    /// Running mean processing latency, microseconds.
    pub mean_latency_us: u64,
    /// Worst processing latency seen, microseconds.
    pub max_latency_us: u64,
}

#[derive(Debug, Default)]
struct LatencyStats {
    samples: u64,
    total_us: u64,
    max_us: u64,
}

/// Live counters shared between a session and its processing loop.
#[derive(Debug, Default)]
pub struct SessionCounters {
    received: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    latency: Mutex<LatencyStats>,
}

impl SessionCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a frame accepted into the queue.
    pub fn record_received(&self) {
        let _ = self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a frame that produced a detection result.
    pub fn record_processed(&self) {
        let _ = self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a discarded frame.
    pub fn record_dropped(&self) {
        let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold one processing latency into the running mean/max.
    pub fn record_latency(&self, latency: Duration) {
        let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        let mut stats = self.latency.lock();
        stats.samples += 1;
        stats.total_us = stats.total_us.saturating_add(us);
        stats.max_us = stats.max_us.max(us);
    }

    /// Re-zero every counter.
    pub fn reset(&self) {
        let mut stats = self.latency.lock();
        self.received.store(0, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        *stats = LatencyStats::default();
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> CounterSnapshot {
        let stats = self.latency.lock();
        let mean_latency_us = if stats.samples == 0 {
            0
        } else {
            stats.total_us / stats.samples
        };
        CounterSnapshot {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            mean_latency_us,
            max_latency_us: stats.max_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(SessionCounters::new().snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn counts_accumulate() {
        let c = SessionCounters::new();
        c.record_received();
        c.record_received();
        c.record_processed();
        c.record_dropped();
        let snap = c.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.processed, 1);
        assert_eq!(snap.dropped, 1);
    }

    #[test]
    fn latency_mean_and_max() {
        let c = SessionCounters::new();
        c.record_latency(Duration::from_millis(10));
        c.record_latency(Duration::from_millis(30));
        let snap = c.snapshot();
        assert_eq!(snap.mean_latency_us, 20_000);
        assert_eq!(snap.max_latency_us, 30_000);
    }

    #[test]
    fn reset_zeroes_everything() {
        let c = SessionCounters::new();
        c.record_received();
        c.record_dropped();
        c.record_latency(Duration::from_millis(5));
        c.reset();
        assert_eq!(c.snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(CounterSnapshot::default()).unwrap();
        assert!(json.get("meanLatencyUs").is_some());
        assert!(json.get("maxLatencyUs").is_some());
    }
}
