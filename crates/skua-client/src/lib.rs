//! # skua-client
//!
//! Async HTTP/1.1 REST client core for [skua](https://github.com/skua-rs/skua):
//! a bounded pool of persistent connections, handed out as move-only leases.
//!
//! ## Features
//!
//! - **Connection pooling**: per-endpoint buckets with a global cap, idle
//!   reuse, and lazy connection establishment
//! - **Leases**: move-only handles that return the connection on drop and
//!   stay memory-safe across pool shutdown
//! - **Waiter queue**: FIFO waiting with timeouts, cancellation, and
//!   endpoint-local priority over global waiters
//! - **Circuit breaker**: per-endpoint fail-fast after consecutive failures
//! - **Aging policy**: idle TTL pruning plus reuse-count and wall-clock caps
//! - **TLS**: rustls with native roots and SNI
//! - **Metrics**: lock-free counters and gauges for every pool decision
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skua_client::{ConnectionPool, PoolConfig};
//! use skua_http::{Endpoint, Method, PreparedRequest, Request};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = ConnectionPool::new(
//!     PoolConfig::default()
//!         .with_max_total_connections(10)
//!         .with_max_connections_per_endpoint(5),
//! )?;
//!
//! let request = Request::new(Method::Get, "https://api.example.com/users/1");
//! let prepared = PreparedRequest::prepare(&request, None, "skua/0.3")?;
//!
//! let mut lease = pool
//!     .acquire(prepared.endpoint(), Duration::from_secs(5))
//!     .await?;
//! let response = lease.request(&prepared).await?;
//!
//! if response.is_success() {
//!     pool.report_success(prepared.endpoint());
//! } else {
//!     pool.report_failure(prepared.endpoint());
//! }
//! // Dropping the lease returns the connection to the pool.
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod tls;

pub use config::PoolConfig;
pub use connection::HttpConnection;
pub use error::{AcquireError, Error, Result};
pub use metrics::{PoolMetrics, PoolMetricsSnapshot};
pub use pool::{ConnectionPool, Lease, PoolStats};
pub use tls::{TlsClientConfig, TlsConnector};

// Re-export the wire types callers need to drive a leased connection.
pub use skua_http::{Endpoint, Method, PreparedRequest, Request, Response};
