//! Pool configuration.

use std::time::Duration;

/// Limits and policies for a [`ConnectionPool`](crate::pool::ConnectionPool).
///
/// All options have conservative defaults; construct with
/// `PoolConfig::default()` and adjust with the `with_*` methods.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Global hard cap on concurrent connections (in use + idle).
    pub max_total_connections: usize,
    /// Per-endpoint hard cap on concurrent connections (in use + idle).
    pub max_connections_per_endpoint: usize,
    /// Age after which an idle connection is pruned.
    pub connection_idle_ttl: Duration,
    /// Requests served by one connection before forced rotation.
    pub max_connection_reuse_count: u32,
    /// Wall-clock lifetime of a single connection.
    pub max_connection_age: Duration,
    /// Consecutive failures that open an endpoint's circuit.
    pub circuit_breaker_failure_threshold: u32,
    /// How long an opened circuit stays open.
    pub circuit_breaker_timeout: Duration,
    /// Close the socket when pruning an idle connection.
    pub close_on_prune: bool,
    /// Close idle sockets on pool shutdown.
    pub close_on_shutdown: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total_connections: 10,
            max_connections_per_endpoint: 5,
            connection_idle_ttl: Duration::from_secs(30),
            max_connection_reuse_count: 1000,
            max_connection_age: Duration::from_secs(300),
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(30),
            close_on_prune: true,
            close_on_shutdown: true,
        }
    }
}

impl PoolConfig {
    /// Set the global connection cap.
    pub fn with_max_total_connections(mut self, max: usize) -> Self {
        self.max_total_connections = max;
        self
    }

    /// Set the per-endpoint connection cap.
    pub fn with_max_connections_per_endpoint(mut self, max: usize) -> Self {
        self.max_connections_per_endpoint = max;
        self
    }

    /// Set the idle time-to-live.
    pub fn with_connection_idle_ttl(mut self, ttl: Duration) -> Self {
        self.connection_idle_ttl = ttl;
        self
    }

    /// Set the reuse cap per connection.
    pub fn with_max_connection_reuse_count(mut self, count: u32) -> Self {
        self.max_connection_reuse_count = count;
        self
    }

    /// Set the wall-clock lifetime cap per connection.
    pub fn with_max_connection_age(mut self, age: Duration) -> Self {
        self.max_connection_age = age;
        self
    }

    /// Set the circuit breaker failure threshold.
    pub fn with_circuit_breaker_failure_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker_failure_threshold = threshold;
        self
    }

    /// Set how long an opened circuit stays open.
    pub fn with_circuit_breaker_timeout(mut self, timeout: Duration) -> Self {
        self.circuit_breaker_timeout = timeout;
        self
    }

    /// Close sockets when pruning idle connections.
    pub fn with_close_on_prune(mut self, close: bool) -> Self {
        self.close_on_prune = close;
        self
    }

    /// Close idle sockets on pool shutdown.
    pub fn with_close_on_shutdown(mut self, close: bool) -> Self {
        self.close_on_shutdown = close;
        self
    }
}
