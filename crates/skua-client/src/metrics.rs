//! Pool metrics.
//!
//! All fields are atomics so observability reads never take the pool lock.
//! Gauges mirror the locked counters and may lag a mutation by an instant;
//! the locked values in [`PoolStats`](crate::pool::PoolStats) are exact.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Atomic counters and gauges describing pool behavior.
#[derive(Debug, Default)]
#[allow(missing_docs)]
pub struct PoolMetrics {
    // Gauges (current state)
    pub total_in_use: AtomicUsize,
    pub total_idle: AtomicUsize,
    pub waiters_total: AtomicUsize,

    // Counters (cumulative)
    pub acquire_success: AtomicU64,
    pub acquire_timeout: AtomicU64,
    pub acquire_shutdown: AtomicU64,
    pub acquire_internal_error: AtomicU64,
    pub acquire_circuit_open: AtomicU64,
    pub connection_created: AtomicU64,
    pub connection_reused: AtomicU64,
    pub connection_pruned: AtomicU64,
    pub connection_dropped_unhealthy: AtomicU64,
    pub connection_dropped_reuse_limit: AtomicU64,
    pub connection_dropped_age_limit: AtomicU64,
    pub release_invalid_id: AtomicU64,
    pub circuit_breaker_opened: AtomicU64,
    pub circuit_breaker_closed: AtomicU64,
}

impl PoolMetrics {
    /// Consistent point-in-time copy of every metric.
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            total_in_use: self.total_in_use.load(Ordering::Relaxed),
            total_idle: self.total_idle.load(Ordering::Relaxed),
            waiters_total: self.waiters_total.load(Ordering::Relaxed),
            acquire_success: self.acquire_success.load(Ordering::Relaxed),
            acquire_timeout: self.acquire_timeout.load(Ordering::Relaxed),
            acquire_shutdown: self.acquire_shutdown.load(Ordering::Relaxed),
            acquire_internal_error: self.acquire_internal_error.load(Ordering::Relaxed),
            acquire_circuit_open: self.acquire_circuit_open.load(Ordering::Relaxed),
            connection_created: self.connection_created.load(Ordering::Relaxed),
            connection_reused: self.connection_reused.load(Ordering::Relaxed),
            connection_pruned: self.connection_pruned.load(Ordering::Relaxed),
            connection_dropped_unhealthy: self.connection_dropped_unhealthy.load(Ordering::Relaxed),
            connection_dropped_reuse_limit: self
                .connection_dropped_reuse_limit
                .load(Ordering::Relaxed),
            connection_dropped_age_limit: self.connection_dropped_age_limit.load(Ordering::Relaxed),
            release_invalid_id: self.release_invalid_id.load(Ordering::Relaxed),
            circuit_breaker_opened: self.circuit_breaker_opened.load(Ordering::Relaxed),
            circuit_breaker_closed: self.circuit_breaker_closed.load(Ordering::Relaxed),
        }
    }
}

/// Plain-value copy of [`PoolMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct PoolMetricsSnapshot {
    pub total_in_use: usize,
    pub total_idle: usize,
    pub waiters_total: usize,
    pub acquire_success: u64,
    pub acquire_timeout: u64,
    pub acquire_shutdown: u64,
    pub acquire_internal_error: u64,
    pub acquire_circuit_open: u64,
    pub connection_created: u64,
    pub connection_reused: u64,
    pub connection_pruned: u64,
    pub connection_dropped_unhealthy: u64,
    pub connection_dropped_reuse_limit: u64,
    pub connection_dropped_age_limit: u64,
    pub release_invalid_id: u64,
    pub circuit_breaker_opened: u64,
    pub circuit_breaker_closed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = PoolMetrics::default();

        metrics.connection_created.fetch_add(2, Ordering::Relaxed);
        metrics.acquire_success.fetch_add(5, Ordering::Relaxed);
        metrics.total_in_use.store(3, Ordering::Relaxed);

        let snap = metrics.snapshot();
        assert_eq!(snap.connection_created, 2);
        assert_eq!(snap.acquire_success, 5);
        assert_eq!(snap.total_in_use, 3);
        assert_eq!(snap.acquire_timeout, 0);
    }
}
