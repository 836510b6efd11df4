//! Concurrency tests for the connection pool: waiter scheduling, timeouts,
//! cancellation, circuit breaking, shutdown, and capacity under load.

use std::sync::Arc;
use std::time::Duration;

use skua_client::{AcquireError, ConnectionPool, PoolConfig};
use skua_http::Endpoint;
use tokio::time::Instant;

fn ep(host: &str) -> Endpoint {
    Endpoint::new(host, "80", false)
}

fn tiny_pool() -> Arc<ConnectionPool> {
    Arc::new(
        ConnectionPool::new(
            PoolConfig::default()
                .with_max_connections_per_endpoint(1)
                .with_max_total_connections(1),
        )
        .unwrap(),
    )
}

// ==================== Waiter Wake Tests ====================

#[tokio::test]
async fn test_release_wakes_waiter_with_same_connection() {
    let pool = tiny_pool();
    let endpoint = ep("localhost");

    let lease_a = pool.acquire(&endpoint, Duration::from_secs(1)).await.unwrap();
    let serial_a = lease_a.get().unwrap().serial();

    let waiter_pool = Arc::clone(&pool);
    let waiter_ep = endpoint.clone();
    let waiter = tokio::spawn(async move {
        let started = Instant::now();
        let lease = waiter_pool
            .acquire(&waiter_ep, Duration::from_secs(5))
            .await
            .unwrap();
        (started.elapsed(), lease.get().unwrap().serial())
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(lease_a);

    let (elapsed, serial_b) = waiter.await.unwrap();
    assert_eq!(serial_b, serial_a, "waiter should reuse the released connection");
    assert!(
        elapsed < Duration::from_millis(500),
        "waiter should wake promptly after release, took {elapsed:?}"
    );
}

#[tokio::test]
async fn test_waiters_wake_in_fifo_order() {
    let pool = tiny_pool();
    let endpoint = ep("localhost");
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let holder = pool.acquire(&endpoint, Duration::from_secs(1)).await.unwrap();

    let mut tasks = Vec::new();
    for tag in ["first", "second", "third"] {
        let pool = Arc::clone(&pool);
        let endpoint = endpoint.clone();
        let order = Arc::clone(&order);
        tasks.push(tokio::spawn(async move {
            let lease = pool.acquire(&endpoint, Duration::from_secs(5)).await.unwrap();
            order.lock().unwrap().push(tag);
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(lease);
        }));
        // Ensure this waiter is parked before the next one enqueues.
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    drop(holder);
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_local_waiter_beats_global_waiter() {
    let pool = Arc::new(
        ConnectionPool::new(
            PoolConfig::default()
                .with_max_connections_per_endpoint(1)
                .with_max_total_connections(2),
        )
        .unwrap(),
    );

    let lease_one = pool.acquire(&ep("one"), Duration::from_secs(1)).await.unwrap();
    let _lease_two = pool.acquire(&ep("two"), Duration::from_secs(1)).await.unwrap();

    // Global waiter enqueues first: endpoint "three" is below its own cap,
    // so it is parked on global capacity.
    let global_pool = Arc::clone(&pool);
    let global = tokio::spawn(async move {
        global_pool.acquire(&ep("three"), Duration::from_millis(500)).await
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Local waiter enqueues second, parked on endpoint "one"'s capacity.
    let local_pool = Arc::clone(&pool);
    let local = tokio::spawn(async move {
        local_pool.acquire(&ep("one"), Duration::from_secs(2)).await
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Releasing on "one" must wake the local waiter even though the global
    // waiter has been parked longer.
    drop(lease_one);

    let local_result = local.await.unwrap();
    assert!(local_result.is_ok(), "local waiter should win the release");

    // The global waiter never gets capacity and times out.
    let global_result = global.await.unwrap();
    assert_eq!(global_result.unwrap_err(), AcquireError::Timeout);
}

// ==================== Timeout & Cancellation Tests ====================

#[tokio::test]
async fn test_acquire_times_out_at_capacity() {
    let pool = tiny_pool();
    let endpoint = ep("localhost");

    let _holder = pool.acquire(&endpoint, Duration::from_secs(1)).await.unwrap();

    let started = Instant::now();
    let result = pool.acquire(&endpoint, Duration::from_millis(50)).await;
    let elapsed = started.elapsed();

    assert_eq!(result.unwrap_err(), AcquireError::Timeout);
    assert!(elapsed >= Duration::from_millis(45), "returned before the deadline");
    assert!(elapsed < Duration::from_millis(500), "overshot the deadline badly");
    assert_eq!(pool.metrics().snapshot().acquire_timeout, 1);
    assert_eq!(pool.stats().waiters, 0);
}

#[tokio::test]
async fn test_cancelled_acquire_removes_waiter() {
    let pool = tiny_pool();
    let endpoint = ep("localhost");

    let holder = pool.acquire(&endpoint, Duration::from_secs(1)).await.unwrap();

    let task_pool = Arc::clone(&pool);
    let task_ep = endpoint.clone();
    let parked = tokio::spawn(async move {
        let _ = task_pool.acquire(&task_ep, Duration::from_secs(30)).await;
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.stats().waiters, 1);

    parked.abort();
    let _ = parked.await;
    assert_eq!(pool.stats().waiters, 0, "cancelled waiter must be removed");

    // The release path tolerates the cancelled waiter's stale queue entry.
    drop(holder);
    let lease = pool.acquire(&endpoint, Duration::from_millis(200)).await;
    assert!(lease.is_ok(), "capacity must not leak on cancellation");
}

// ==================== Circuit Breaker Tests ====================

#[tokio::test]
async fn test_open_circuit_fails_acquire_immediately() {
    let pool = Arc::new(
        ConnectionPool::new(
            PoolConfig::default()
                .with_circuit_breaker_failure_threshold(3)
                .with_circuit_breaker_timeout(Duration::from_millis(50)),
        )
        .unwrap(),
    );
    let endpoint = ep("flaky");

    for _ in 0..3 {
        pool.report_failure(&endpoint);
    }

    let started = Instant::now();
    let result = pool.acquire(&endpoint, Duration::from_secs(5)).await;
    assert_eq!(result.unwrap_err(), AcquireError::CircuitOpen);
    assert!(started.elapsed() < Duration::from_millis(100), "must fail fast");
    assert_eq!(pool.metrics().snapshot().acquire_circuit_open, 1);
    assert!(pool.try_acquire(&endpoint).is_none());

    // After the breaker timeout the endpoint admits traffic again.
    tokio::time::sleep(Duration::from_millis(60)).await;
    let lease = pool.acquire(&endpoint, Duration::from_millis(200)).await;
    assert!(lease.is_ok());

    pool.report_success(&endpoint);
    let snap = pool.metrics().snapshot();
    assert_eq!(snap.circuit_breaker_opened, 1);
    assert_eq!(snap.circuit_breaker_closed, 1);
}

// ==================== Shutdown & Drain Tests ====================

#[tokio::test]
async fn test_shutdown_wakes_parked_waiters() {
    let pool = tiny_pool();
    let endpoint = ep("localhost");

    let _holder = pool.acquire(&endpoint, Duration::from_secs(1)).await.unwrap();

    let task_pool = Arc::clone(&pool);
    let task_ep = endpoint.clone();
    let parked = tokio::spawn(async move {
        task_pool.acquire(&task_ep, Duration::from_secs(30)).await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(1), parked)
        .await
        .expect("waiter must wake promptly on shutdown")
        .unwrap();
    assert_eq!(result.unwrap_err(), AcquireError::Shutdown);

    // Everything after shutdown fails the same way.
    let result = pool.acquire(&endpoint, Duration::from_millis(50)).await;
    assert_eq!(result.unwrap_err(), AcquireError::Shutdown);
}

#[tokio::test]
async fn test_drain_waits_for_leases() {
    let pool = tiny_pool();
    let endpoint = ep("localhost");

    let lease = pool.acquire(&endpoint, Duration::from_secs(1)).await.unwrap();

    // Still held: a short drain fails.
    assert!(!pool.drain(Duration::from_millis(50)).await);

    let dropper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(lease);
    });

    assert!(pool.drain(Duration::from_secs(2)).await);
    dropper.await.unwrap();
    assert_eq!(pool.stats().total_in_use, 0);
}

// ==================== Load Tests ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contended_pool_serves_all_tasks() {
    let pool = Arc::new(
        ConnectionPool::new(
            PoolConfig::default()
                .with_max_connections_per_endpoint(2)
                .with_max_total_connections(2),
        )
        .unwrap(),
    );
    let endpoint = ep("localhost");

    const TASKS: usize = 1000;
    let mut handles = Vec::with_capacity(TASKS);
    for i in 0..TASKS {
        let pool = Arc::clone(&pool);
        let endpoint = endpoint.clone();
        handles.push(tokio::spawn(async move {
            // Stagger starts to mix reuse, creation, and waiting.
            tokio::time::sleep(Duration::from_millis((i % 5) as u64)).await;
            let lease = pool.acquire(&endpoint, Duration::from_secs(30)).await?;
            tokio::time::sleep(Duration::from_millis(1)).await;
            drop(lease);
            Ok::<(), AcquireError>(())
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.total_in_use, 0);
    assert!(stats.total_idle <= 2);
    assert_eq!(stats.waiters, 0);

    let snap = pool.metrics().snapshot();
    assert_eq!(snap.acquire_success, TASKS as u64);
    assert_eq!(snap.acquire_timeout, 0);
    assert!(snap.connection_created <= 2);
    assert_eq!(
        snap.connection_created + snap.connection_reused,
        TASKS as u64
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_races_outstanding_leases() {
    // Shut the pool down while tasks are mid-flight; leases dropped after
    // shutdown must be inert, and nothing may panic.
    let pool = Arc::new(
        ConnectionPool::new(
            PoolConfig::default()
                .with_max_connections_per_endpoint(2)
                .with_max_total_connections(2),
        )
        .unwrap(),
    );
    let endpoint = ep("localhost");

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pool = Arc::clone(&pool);
        let endpoint = endpoint.clone();
        handles.push(tokio::spawn(async move {
            match pool.acquire(&endpoint, Duration::from_millis(200)).await {
                Ok(lease) => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    drop(lease);
                }
                Err(AcquireError::Shutdown | AcquireError::Timeout) => {}
                Err(other) => panic!("unexpected acquire error: {other}"),
            }
        }));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.shutdown();

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(pool.stats().waiters, 0);
}
