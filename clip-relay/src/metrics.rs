//! Operational counters for the relay.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Thread-safe via `AtomicU64`; incrementing takes no lock.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total WebSocket connections accepted.
    pub connections_total: AtomicU64,
    /// Total frames queued to recipients by broadcasts.
    pub frames_relayed: AtomicU64,
    /// Total connections dropped because their outbox was full.
    pub evictions_total: AtomicU64,
    /// Total rejected requests (validation, state, unknown type).
    pub protocol_errors_total: AtomicU64,
    /// Total inbound frames that could not be decoded.
    pub decode_errors_total: AtomicU64,
    /// Total rate limit rejections (upgrade + message).
    pub rate_limit_hits: AtomicU64,
}

impl RelayMetrics {
    /// Increment a counter by one.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            evictions_total: self.evictions_total.load(Ordering::Relaxed),
            protocol_errors_total: self.protocol_errors_total.load(Ordering::Relaxed),
            decode_errors_total: self.decode_errors_total.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RelayMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// See [`RelayMetrics::connections_total`].
    pub connections_total: u64,
    /// See [`RelayMetrics::frames_relayed`].
    pub frames_relayed: u64,
    /// See [`RelayMetrics::evictions_total`].
    pub evictions_total: u64,
    /// See [`RelayMetrics::protocol_errors_total`].
    pub protocol_errors_total: u64,
    /// See [`RelayMetrics::decode_errors_total`].
    pub decode_errors_total: u64,
    /// See [`RelayMetrics::rate_limit_hits`].
    pub rate_limit_hits: u64,
}
