//! The asynchronous connection pool.
//!
//! Multiplexes a bounded set of persistent HTTP(S) connections across
//! concurrent request tasks, enforcing per-endpoint and global capacity,
//! idle eviction, connection aging and reuse caps, per-endpoint circuit
//! breaking, and a cooperative waiter queue with timeouts and cancellation.
//!
//! # Safety model
//!
//! All public methods are thread-safe. A single mutex protects every
//! mutable field of the pool and its buckets, and is never held across an
//! `.await`; the only suspension points are the waiter's notification
//! inside [`ConnectionPool::acquire`] and the polling sleep inside
//! [`ConnectionPool::drain`]. Waiter wakeups are issued after the lock is
//! released.
//!
//! # Invariants
//!
//! At every quiescent point:
//!
//! 1. Per bucket: `in_use + idle <= max_connections_per_endpoint`.
//! 2. Globally: the sum of `in_use + idle` over all buckets is at most
//!    `max_total_connections`.
//! 3. `total_in_use` equals the sum of bucket in-use counts.
//! 4. A connection is either idle in exactly one bucket or owned by exactly
//!    one [`Lease`]; the ownership model makes double-holding unrepresentable.
//!
//! Debug builds re-check 1–3 under the lock after every mutation.
//!
//! # Lifecycle
//!
//! Construction → `acquire`/`release` traffic → [`ConnectionPool::shutdown`]
//! (cancels all waiters, optionally closes idle sockets) → optional
//! [`ConnectionPool::drain`] → drop. Dropping the pool runs `shutdown`.
//! Leases outliving the pool become inert: their drop observes the dead
//! pool through a weak reference and closes the connection without touching
//! pool state.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use slab::Slab;
use tokio::sync::Notify;
use tracing::{debug, warn};

use skua_http::{Endpoint, PreparedRequest, Response};

use crate::config::PoolConfig;
use crate::connection::HttpConnection;
use crate::error::AcquireError;
use crate::metrics::PoolMetrics;
use crate::tls::{TlsClientConfig, TlsConnector};

/// Cadence of the `drain` poll.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Internal state
// ============================================================================

/// Why an acquire is parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitReason {
    /// Blocked by the per-endpoint limit.
    EndpointCapacity,
    /// Blocked by the global pool limit.
    GlobalCapacity,
}

struct IdleEntry {
    conn: Box<HttpConnection>,
    last_used: Instant,
    created: Instant,
    reuse_count: u32,
}

/// Bookkeeping for a leased-out connection. The connection itself lives in
/// the lease; `created` and `reuse_count` ride here so release can restore
/// them into the idle entry.
struct LeasedMeta {
    created: Instant,
    reuse_count: u32,
}

/// A parked acquire. Lives in the primary slab; secondary queues reference
/// it by `(key, seq)`, and the seq token makes recycled slab keys harmless.
struct Waiter {
    seq: u64,
    notify: Arc<Notify>,
    /// True while eligible to be woken; flipped exactly once by whichever of
    /// release-claim, timeout, or cancellation wins.
    active: bool,
    /// `Some` when parked on an endpoint's local queue, `None` when parked
    /// on the global queue. Lets timeout and cancellation purge the matching
    /// secondary-queue entry.
    endpoint: Option<Endpoint>,
}

#[derive(Default)]
struct Bucket {
    /// Front = least recently used (pruning side); reuse pops the back.
    idle: VecDeque<IdleEntry>,
    in_use: HashMap<u64, LeasedMeta>,
    local_waiters: VecDeque<(usize, u64)>,
    consecutive_failures: u32,
    circuit_open_until: Option<Instant>,
}

impl Bucket {
    fn is_circuit_open(&self, now: Instant) -> bool {
        self.circuit_open_until.is_some_and(|until| now < until)
    }

    fn len(&self) -> usize {
        self.in_use.len() + self.idle.len()
    }
}

struct PoolState {
    buckets: HashMap<Endpoint, Bucket>,
    waiters: Slab<Waiter>,
    global_waiters: VecDeque<(usize, u64)>,
    total_in_use: usize,
    total_idle: usize,
    next_id: u64,
    next_waiter_seq: u64,
}

struct PoolShared {
    /// Cleared exactly once by shutdown (and pool drop). Leases observe it
    /// through a weak reference before calling back into the pool.
    alive: AtomicBool,
    state: Mutex<PoolState>,
    metrics: PoolMetrics,
    config: PoolConfig,
    tls: Arc<TlsConnector>,
}

enum TryAcquire {
    Acquired(Lease),
    CircuitOpen,
    AtCapacity,
    ShuttingDown,
}

// ============================================================================
// Pool
// ============================================================================

/// Exact gauge readings taken under the pool lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently leased out.
    pub total_in_use: usize,
    /// Connections currently idle across all buckets.
    pub total_idle: usize,
    /// Acquires currently parked.
    pub waiters: usize,
}

/// Thread-safe pool of persistent HTTP(S) connections.
///
/// Share it with `Arc<ConnectionPool>`; it is not `Clone`.
///
/// # Example
///
/// ```rust,no_run
/// use skua_client::{ConnectionPool, PoolConfig};
/// use skua_http::Endpoint;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = ConnectionPool::new(PoolConfig::default())?;
/// let endpoint = Endpoint::new("api.example.com", "", true);
///
/// let lease = pool.acquire(&endpoint, Duration::from_secs(5)).await?;
/// // drive a request through the lease, then drop it to return the
/// // connection
/// drop(lease);
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a pool with a default TLS connector (native roots).
    pub fn new(config: PoolConfig) -> crate::error::Result<Self> {
        let tls = Arc::new(TlsConnector::new(&TlsClientConfig::default())?);
        Ok(Self::with_tls(config, tls))
    }

    /// Create a pool sharing an existing TLS connector.
    pub fn with_tls(config: PoolConfig, tls: Arc<TlsConnector>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                alive: AtomicBool::new(true),
                state: Mutex::new(PoolState {
                    buckets: HashMap::new(),
                    waiters: Slab::new(),
                    global_waiters: VecDeque::new(),
                    total_in_use: 0,
                    total_idle: 0,
                    next_id: 1,
                    next_waiter_seq: 1,
                }),
                metrics: PoolMetrics::default(),
                config,
                tls,
            }),
        }
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Lock-free metrics.
    pub fn metrics(&self) -> &PoolMetrics {
        &self.shared.metrics
    }

    /// Exact gauges, read under the lock.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            total_in_use: state.total_in_use,
            total_idle: state.total_idle,
            waiters: state.waiters.len(),
        }
    }

    /// Try to acquire a connection without waiting.
    ///
    /// Returns `None` when the pool is shut down, the endpoint's circuit is
    /// open, or both reuse and creation are blocked by capacity.
    pub fn try_acquire(&self, endpoint: &Endpoint) -> Option<Lease> {
        let endpoint = endpoint.normalized();
        let mut state = self.shared.state.lock();
        match self.try_acquire_locked(&mut state, &endpoint) {
            TryAcquire::Acquired(lease) => Some(lease),
            _ => None,
        }
    }

    /// Acquire a connection, waiting up to `timeout` for capacity.
    ///
    /// `Duration::MAX` means wait forever. Waiters are resolved FIFO within
    /// their queue, and a waiter parked for this endpoint's capacity beats
    /// one parked for global capacity when a connection is released here.
    ///
    /// Dropping the returned future while it is parked removes the waiter
    /// deterministically; no capacity is leaked.
    pub async fn acquire(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> std::result::Result<Lease, AcquireError> {
        let endpoint = endpoint.normalized();
        let metrics = &self.shared.metrics;
        let deadline = if timeout == Duration::MAX {
            None
        } else {
            tokio::time::Instant::now().checked_add(timeout)
        };

        loop {
            // Fast path: no waiter allocation.
            {
                let mut state = self.shared.state.lock();
                match self.try_acquire_locked(&mut state, &endpoint) {
                    TryAcquire::Acquired(lease) => {
                        metrics.acquire_success.fetch_add(1, Ordering::Relaxed);
                        return Ok(lease);
                    }
                    TryAcquire::ShuttingDown => {
                        metrics.acquire_shutdown.fetch_add(1, Ordering::Relaxed);
                        return Err(AcquireError::Shutdown);
                    }
                    TryAcquire::CircuitOpen => {
                        metrics.acquire_circuit_open.fetch_add(1, Ordering::Relaxed);
                        return Err(AcquireError::CircuitOpen);
                    }
                    TryAcquire::AtCapacity => {}
                }
            }

            let (notify, key, seq) = {
                let mut state = self.shared.state.lock();

                // Re-check shutdown now that we hold the lock again.
                if !self.shared.alive.load(Ordering::Acquire) {
                    metrics.acquire_shutdown.fetch_add(1, Ordering::Relaxed);
                    return Err(AcquireError::Shutdown);
                }

                let reason = wait_reason_locked(&state, &self.shared.config, &endpoint);
                let notify = Arc::new(Notify::new());
                let seq = state.next_waiter_seq;
                state.next_waiter_seq += 1;
                let key = state.waiters.insert(Waiter {
                    seq,
                    notify: Arc::clone(&notify),
                    active: true,
                    endpoint: match reason {
                        WaitReason::EndpointCapacity => Some(endpoint.clone()),
                        WaitReason::GlobalCapacity => None,
                    },
                });
                match reason {
                    WaitReason::EndpointCapacity => state
                        .buckets
                        .entry(endpoint.clone())
                        .or_default()
                        .local_waiters
                        .push_back((key, seq)),
                    WaitReason::GlobalCapacity => state.global_waiters.push_back((key, seq)),
                }
                metrics.waiters_total.fetch_add(1, Ordering::Relaxed);

                // Close the lost-wakeup window: a release may have landed
                // between the fast path unlocking and this enqueue.
                match self.try_acquire_locked(&mut state, &endpoint) {
                    TryAcquire::Acquired(lease) => {
                        remove_waiter_locked(&self.shared, &mut state, key, seq);
                        metrics.acquire_success.fetch_add(1, Ordering::Relaxed);
                        return Ok(lease);
                    }
                    TryAcquire::ShuttingDown => {
                        remove_waiter_locked(&self.shared, &mut state, key, seq);
                        metrics.acquire_shutdown.fetch_add(1, Ordering::Relaxed);
                        return Err(AcquireError::Shutdown);
                    }
                    TryAcquire::CircuitOpen => {
                        remove_waiter_locked(&self.shared, &mut state, key, seq);
                        metrics.acquire_circuit_open.fetch_add(1, Ordering::Relaxed);
                        return Err(AcquireError::CircuitOpen);
                    }
                    TryAcquire::AtCapacity => {}
                }

                (notify, key, seq)
            };

            // Suspend outside the lock. The guard removes the waiter if this
            // future is dropped mid-wait.
            let guard = WaiterGuard {
                shared: Arc::clone(&self.shared),
                key,
                seq,
                armed: true,
            };
            let woken = match deadline {
                None => {
                    notify.notified().await;
                    true
                }
                Some(at) => tokio::time::timeout_at(at, notify.notified()).await.is_ok(),
            };

            let was_active = {
                let mut state = self.shared.state.lock();
                remove_waiter_locked(&self.shared, &mut state, key, seq)
            };
            guard.disarm();

            if !woken && was_active {
                metrics.acquire_timeout.fetch_add(1, Ordering::Relaxed);
                return Err(AcquireError::Timeout);
            }
            // Woken by a release, claimed concurrently with the timeout, or
            // drained by shutdown: retry the fast path.
        }
    }

    /// Prune idle connections that have outlived `connection_idle_ttl`.
    ///
    /// Also runs at the start of every acquire attempt; this entry point
    /// exists for periodic maintenance on otherwise quiet pools.
    pub fn prune_idle(&self) {
        let mut state = self.shared.state.lock();
        prune_idle_locked(&self.shared, &mut state, Instant::now());
    }

    /// Record a request failure against an endpoint's circuit breaker.
    pub fn report_failure(&self, endpoint: &Endpoint) {
        let endpoint = endpoint.normalized();
        let mut state = self.shared.state.lock();
        let threshold = self.shared.config.circuit_breaker_failure_threshold;
        let bucket = state.buckets.entry(endpoint.clone()).or_default();

        bucket.consecutive_failures += 1;
        if bucket.consecutive_failures >= threshold {
            bucket.circuit_open_until =
                Some(Instant::now() + self.shared.config.circuit_breaker_timeout);
            self.shared
                .metrics
                .circuit_breaker_opened
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                endpoint = %endpoint,
                failures = bucket.consecutive_failures,
                "circuit breaker opened"
            );
        }
    }

    /// Record a request success, resetting the endpoint's failure streak.
    pub fn report_success(&self, endpoint: &Endpoint) {
        let endpoint = endpoint.normalized();
        let mut state = self.shared.state.lock();
        if let Some(bucket) = state.buckets.get_mut(&endpoint) {
            if bucket.consecutive_failures > 0 {
                bucket.consecutive_failures = 0;
                self.shared
                    .metrics
                    .circuit_breaker_closed
                    .fetch_add(1, Ordering::Relaxed);
                debug!(endpoint = %endpoint, "circuit breaker reset");
            }
        }
    }

    /// Shut the pool down.
    ///
    /// Flips the shared alive flag so outstanding leases become inert,
    /// cancels every parked waiter, and closes idle connections when
    /// `close_on_shutdown` is set. In-use connections are closed by their
    /// leases as those drop. Idempotent; all later acquires fail with
    /// [`AcquireError::Shutdown`].
    pub fn shutdown(&self) {
        let was_alive = self.shared.alive.swap(false, Ordering::AcqRel);

        // Drain the primary waiter registry under the lock; wake outside it.
        let drained: Vec<Arc<Notify>> = {
            let mut state = self.shared.state.lock();
            for bucket in state.buckets.values_mut() {
                bucket.local_waiters.clear();
            }
            state.global_waiters.clear();
            let notifies: Vec<Arc<Notify>> = state.waiters.drain().map(|w| w.notify).collect();
            self.shared.metrics.waiters_total.store(0, Ordering::Relaxed);
            notifies
        };
        for notify in drained {
            notify.notify_one();
        }

        if self.shared.config.close_on_shutdown {
            let mut state = self.shared.state.lock();
            let st = &mut *state;
            for bucket in st.buckets.values_mut() {
                while let Some(mut entry) = bucket.idle.pop_front() {
                    entry.conn.close();
                    st.total_idle -= 1;
                }
            }
            self.shared
                .metrics
                .total_idle
                .store(st.total_idle, Ordering::Relaxed);
        }

        if was_alive {
            debug!("connection pool shut down");
        }
    }

    /// Wait for all leased connections to be returned.
    ///
    /// Polls `total_in_use` every 100 ms until it reaches zero or the
    /// deadline passes; returns whether the pool fully drained.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.state.lock().total_in_use == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    /// The non-blocking acquisition core. Caller holds the lock.
    fn try_acquire_locked(&self, state: &mut PoolState, endpoint: &Endpoint) -> TryAcquire {
        if !self.shared.alive.load(Ordering::Acquire) {
            return TryAcquire::ShuttingDown;
        }

        let now = Instant::now();
        prune_idle_locked(&self.shared, state, now);

        let config = &self.shared.config;
        let metrics = &self.shared.metrics;
        let st = &mut *state;
        let bucket = st.buckets.entry(endpoint.clone()).or_default();

        if bucket.is_circuit_open(now) {
            return TryAcquire::CircuitOpen;
        }

        // Reuse from the back (most recently used); pruning eats the front.
        while let Some(mut entry) = bucket.idle.pop_back() {
            st.total_idle -= 1;
            metrics.total_idle.store(st.total_idle, Ordering::Relaxed);

            if !entry.conn.is_healthy() {
                metrics
                    .connection_dropped_unhealthy
                    .fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if entry.reuse_count >= config.max_connection_reuse_count {
                metrics
                    .connection_dropped_reuse_limit
                    .fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if now.duration_since(entry.created) > config.max_connection_age {
                metrics
                    .connection_dropped_age_limit
                    .fetch_add(1, Ordering::Relaxed);
                continue;
            }

            entry.reuse_count += 1;
            let id = st.next_id;
            st.next_id += 1;
            bucket.in_use.insert(
                id,
                LeasedMeta {
                    created: entry.created,
                    reuse_count: entry.reuse_count,
                },
            );
            st.total_in_use += 1;
            metrics.total_in_use.store(st.total_in_use, Ordering::Relaxed);
            metrics.connection_reused.fetch_add(1, Ordering::Relaxed);

            let lease = Lease {
                shared: Arc::downgrade(&self.shared),
                conn: Some(entry.conn),
                endpoint: endpoint.clone(),
                id,
            };
            check_invariants_locked(&self.shared, state);
            return TryAcquire::Acquired(lease);
        }

        // No reusable idle connection; create if capacity allows.
        let endpoint_total = bucket.len();
        let global_total = st.total_in_use + st.total_idle;
        if endpoint_total >= config.max_connections_per_endpoint
            || global_total >= config.max_total_connections
        {
            return TryAcquire::AtCapacity;
        }

        let id = st.next_id;
        st.next_id += 1;
        let conn = Box::new(HttpConnection::new(
            endpoint.clone(),
            Arc::clone(&self.shared.tls),
            id,
        ));
        bucket.in_use.insert(
            id,
            LeasedMeta {
                created: now,
                reuse_count: 0,
            },
        );
        st.total_in_use += 1;
        metrics.total_in_use.store(st.total_in_use, Ordering::Relaxed);
        metrics.connection_created.fetch_add(1, Ordering::Relaxed);

        let lease = Lease {
            shared: Arc::downgrade(&self.shared),
            conn: Some(conn),
            endpoint: endpoint.clone(),
            id,
        };
        check_invariants_locked(&self.shared, state);
        TryAcquire::Acquired(lease)
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ConnectionPool")
            .field("alive", &self.shared.alive.load(Ordering::Relaxed))
            .field("stats", &stats)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Locked helpers
// ============================================================================

fn wait_reason_locked(state: &PoolState, config: &PoolConfig, endpoint: &Endpoint) -> WaitReason {
    match state.buckets.get(endpoint) {
        Some(bucket) if bucket.len() >= config.max_connections_per_endpoint => {
            WaitReason::EndpointCapacity
        }
        _ => WaitReason::GlobalCapacity,
    }
}

fn prune_idle_locked(shared: &PoolShared, state: &mut PoolState, now: Instant) {
    let ttl = shared.config.connection_idle_ttl;
    if ttl.is_zero() {
        return;
    }

    let st = &mut *state;
    for bucket in st.buckets.values_mut() {
        loop {
            let expired = match bucket.idle.front() {
                Some(front) => now.duration_since(front.last_used) >= ttl,
                None => false,
            };
            if !expired {
                break;
            }
            if let Some(mut entry) = bucket.idle.pop_front() {
                if shared.config.close_on_prune {
                    entry.conn.close();
                }
                st.total_idle -= 1;
                shared
                    .metrics
                    .total_idle
                    .store(st.total_idle, Ordering::Relaxed);
                shared
                    .metrics
                    .connection_pruned
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Pop one eligible waiter for a release on `endpoint`: local queue first,
/// then global. The claimed waiter is marked inactive under the lock; the
/// caller notifies it after unlocking.
fn pop_waiter_locked(
    shared: &PoolShared,
    state: &mut PoolState,
    endpoint: &Endpoint,
) -> Option<Arc<Notify>> {
    let st = &mut *state;

    if let Some(bucket) = st.buckets.get_mut(endpoint) {
        while let Some((key, seq)) = bucket.local_waiters.pop_front() {
            if let Some(waiter) = st.waiters.get_mut(key) {
                if waiter.seq == seq && waiter.active {
                    waiter.active = false;
                    shared.metrics.waiters_total.fetch_sub(1, Ordering::Relaxed);
                    return Some(Arc::clone(&waiter.notify));
                }
            }
        }
    }

    while let Some((key, seq)) = st.global_waiters.pop_front() {
        if let Some(waiter) = st.waiters.get_mut(key) {
            if waiter.seq == seq && waiter.active {
                waiter.active = false;
                shared.metrics.waiters_total.fetch_sub(1, Ordering::Relaxed);
                return Some(Arc::clone(&waiter.notify));
            }
        }
    }

    None
}

/// Remove a waiter from the primary slab if it is still ours (seq match),
/// along with its secondary-queue entry. Returns whether it was still
/// active. A claimed (inactive) waiter's queue entry was already popped by
/// the releaser, so only active waiters need the queue scan; this keeps the
/// queues from accumulating dead entries on endpoints that never see a
/// release.
fn remove_waiter_locked(shared: &PoolShared, state: &mut PoolState, key: usize, seq: u64) -> bool {
    let st = &mut *state;
    let matches = st.waiters.get(key).is_some_and(|w| w.seq == seq);
    if !matches {
        return false;
    }
    let waiter = st.waiters.remove(key);
    if !waiter.active {
        return false;
    }

    match &waiter.endpoint {
        Some(endpoint) => {
            if let Some(bucket) = st.buckets.get_mut(endpoint) {
                bucket
                    .local_waiters
                    .retain(|&(k, s)| !(k == key && s == seq));
            }
        }
        None => st.global_waiters.retain(|&(k, s)| !(k == key && s == seq)),
    }

    shared.metrics.waiters_total.fetch_sub(1, Ordering::Relaxed);
    true
}

/// Return a leased connection. Runs on the lease's drop path and therefore
/// must never panic; unknown ids only bump `release_invalid_id`.
fn release_connection(shared: &PoolShared, endpoint: &Endpoint, id: u64, conn: Box<HttpConnection>) {
    let notify = {
        let mut state = shared.state.lock();
        let st = &mut *state;

        let Some(bucket) = st.buckets.get_mut(endpoint) else {
            shared
                .metrics
                .release_invalid_id
                .fetch_add(1, Ordering::Relaxed);
            return;
        };
        let Some(meta) = bucket.in_use.remove(&id) else {
            shared
                .metrics
                .release_invalid_id
                .fetch_add(1, Ordering::Relaxed);
            return;
        };

        st.total_in_use -= 1;
        shared
            .metrics
            .total_in_use
            .store(st.total_in_use, Ordering::Relaxed);

        if conn.is_healthy() {
            bucket.idle.push_back(IdleEntry {
                conn,
                last_used: Instant::now(),
                created: meta.created,
                reuse_count: meta.reuse_count,
            });
            st.total_idle += 1;
            shared
                .metrics
                .total_idle
                .store(st.total_idle, Ordering::Relaxed);
        } else {
            shared
                .metrics
                .connection_dropped_unhealthy
                .fetch_add(1, Ordering::Relaxed);
            drop(conn);
        }

        let notify = pop_waiter_locked(shared, &mut state, endpoint);
        check_invariants_locked(shared, &state);
        notify
    };

    // Wake outside the lock so the woken task can immediately take it.
    if let Some(notify) = notify {
        notify.notify_one();
    }
}

#[cfg(debug_assertions)]
fn check_invariants_locked(shared: &PoolShared, state: &PoolState) {
    let mut computed_in_use = 0;
    let mut computed_idle = 0;
    for bucket in state.buckets.values() {
        computed_in_use += bucket.in_use.len();
        computed_idle += bucket.idle.len();
        debug_assert!(
            bucket.len() <= shared.config.max_connections_per_endpoint,
            "bucket exceeds per-endpoint cap"
        );
    }
    debug_assert_eq!(computed_in_use, state.total_in_use, "total_in_use drift");
    debug_assert_eq!(computed_idle, state.total_idle, "total_idle drift");
    debug_assert!(
        computed_in_use + computed_idle <= shared.config.max_total_connections,
        "pool exceeds global cap"
    );
}

#[cfg(not(debug_assertions))]
fn check_invariants_locked(_shared: &PoolShared, _state: &PoolState) {}

// ============================================================================
// Waiter guard
// ============================================================================

/// Removes the waiter if the acquire future is dropped while parked
/// (cancellation). Disarmed on the normal wake and timeout paths, which do
/// their own removal.
struct WaiterGuard {
    shared: Arc<PoolShared>,
    key: usize,
    seq: u64,
    armed: bool,
}

impl WaiterGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.shared.state.lock();
        remove_waiter_locked(&self.shared, &mut state, self.key, self.seq);
    }
}

// ============================================================================
// Lease
// ============================================================================

/// Move-only handle granting temporary exclusive use of one connection.
///
/// Dropping the lease returns the connection to the pool: healthy
/// connections go back to the idle set and one parked waiter is woken;
/// unhealthy ones are dropped. If the pool has been shut down or destroyed,
/// the drop closes the connection without touching pool state; this is the
/// check that makes outstanding leases safe across pool destruction.
pub struct Lease {
    shared: Weak<PoolShared>,
    conn: Option<Box<HttpConnection>>,
    endpoint: Endpoint,
    id: u64,
}

impl Lease {
    /// The leased connection, or `None` once the pool is gone or shut down.
    pub fn get(&self) -> Option<&HttpConnection> {
        if self.pool_alive() {
            self.conn.as_deref()
        } else {
            None
        }
    }

    /// Mutable access to the leased connection.
    pub fn get_mut(&mut self) -> Option<&mut HttpConnection> {
        if self.pool_alive() {
            self.conn.as_deref_mut()
        } else {
            None
        }
    }

    /// Whether the lease still grants access to a live connection.
    pub fn is_active(&self) -> bool {
        self.conn.is_some() && self.pool_alive()
    }

    /// Endpoint the leased connection is tied to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Pool-assigned id of this lease.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Drive one HTTP transaction through the leased connection.
    pub async fn request(&mut self, prepared: &PreparedRequest) -> crate::error::Result<Response> {
        if !self.pool_alive() {
            return Err(crate::error::Error::ConnectionClosed);
        }
        let conn = self
            .conn
            .as_deref_mut()
            .ok_or(crate::error::Error::ConnectionClosed)?;
        conn.request(prepared).await
    }

    fn pool_alive(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.alive.load(Ordering::Acquire))
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        match self.shared.upgrade() {
            Some(shared) if shared.alive.load(Ordering::Acquire) => {
                release_connection(&shared, &self.endpoint, self.id, conn);
            }
            // Pool is gone or shut down: just close the connection.
            _ => drop(conn),
        }
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("endpoint", &self.endpoint)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
