//! Tests for the rdbc-pool pool module

mod common;

use common::{test_config, MockFactory};
use rdbc_pool::prelude::*;
use std::sync::Arc;
use std::time::Duration;

// ==================== Counters ====================

#[tokio::test]
async fn test_happy_path_counters() {
    let (factory, _state) = MockFactory::new();
    let config = test_config()
        .with_init_size(2)
        .with_min_size(2)
        .with_max_size(4)
        .with_acquire_timeout(Duration::from_secs(5));
    let pool = SimpleConnectionPool::with_factory(config, factory)
        .await
        .expect("pool construction");

    assert_eq!(pool.total_connections(), 2);
    assert_eq!(pool.idle_connections(), 2);
    assert_eq!(pool.active_connections(), 0);

    let mut c1 = pool.acquire().await.expect("first acquire");
    let mut c2 = pool.acquire().await.expect("second acquire");
    let mut c3 = pool.acquire().await.expect("third acquire grows the pool");

    assert_eq!(pool.total_connections(), 3);
    assert_eq!(pool.idle_connections(), 0);
    assert_eq!(pool.active_connections(), 3);

    c1.close().await;
    c2.close().await;
    c3.close().await;

    assert_eq!(pool.total_connections(), 3);
    assert_eq!(pool.idle_connections(), 3);
    assert_eq!(pool.active_connections(), 0);

    let stats = pool.stats();
    assert_eq!(stats.connections_created, 3);
    assert_eq!(stats.acquisitions, 3);
    assert_eq!(stats.connections_closed, 0);
}

// ==================== Timeout ====================

#[tokio::test(start_paused = true)]
async fn test_acquire_times_out_when_exhausted() {
    let (factory, _state) = MockFactory::new();
    let config = test_config()
        .with_init_size(1)
        .with_max_size(1)
        .with_acquire_timeout(Duration::from_millis(100));
    let pool = SimpleConnectionPool::with_factory(config, factory)
        .await
        .expect("pool construction");

    let mut held = pool.acquire().await.expect("only connection");

    let start = tokio::time::Instant::now();
    let err = pool.acquire().await.expect_err("pool is exhausted");
    let waited = start.elapsed();

    assert!(matches!(err, Error::PoolExhausted { .. }));
    assert!(err.to_string().contains("idle=0/1"), "got: {err}");
    assert!(
        waited >= Duration::from_millis(100) && waited <= Duration::from_millis(200),
        "waited {waited:?}"
    );
    assert_eq!(pool.stats().exhaustions, 1);

    held.close().await;
    assert_eq!(pool.idle_connections(), 1);
}

// ==================== Max lifetime on checkout ====================

#[tokio::test(start_paused = true)]
async fn test_max_lifetime_recycles_on_checkout() {
    let (factory, _state) = MockFactory::new();
    let config = test_config()
        .with_init_size(1)
        .with_max_size(2)
        .with_max_lifetime(Duration::from_millis(50));
    let pool = SimpleConnectionPool::with_factory(config, factory)
        .await
        .expect("pool construction");

    let mut first = pool.acquire().await.expect("first acquire");
    let first_created = first.created_at();
    first.close().await;

    tokio::time::sleep(Duration::from_millis(60)).await;

    let mut second = pool.acquire().await.expect("second acquire");
    assert!(
        second.created_at() > first_created,
        "aged connection must have been replaced"
    );
    assert_eq!(pool.total_connections(), 1);

    let stats = pool.stats();
    assert_eq!(stats.connections_created, 2);
    assert_eq!(stats.connections_closed, 1);

    second.close().await;
}

// ==================== Fatal vs transient errors ====================

#[tokio::test]
async fn test_fatal_sqlstate_forces_close() {
    let (factory, state) = MockFactory::new();
    let config = test_config().with_init_size(1).with_max_size(2);
    let pool = SimpleConnectionPool::with_factory(config, factory)
        .await
        .expect("pool construction");

    let mut conn = pool.acquire().await.expect("acquire");
    state.inject_error(Error::sql_state("server closed the connection", "08003"));

    let err = conn.execute("SELECT 1", &[]).await.expect_err("injected");
    assert!(err.is_fatal());
    assert!(conn.is_force_closed());
    assert_eq!(pool.total_connections(), 1);

    conn.close().await;

    // Never re-enters idle; the transport is terminated.
    assert_eq!(pool.total_connections(), 0);
    assert_eq!(pool.idle_connections(), 0);
    assert_eq!(pool.stats().connections_closed, 1);

    // The next acquire opens a fresh connection.
    let mut replacement = pool.acquire().await.expect("replacement");
    assert_eq!(pool.stats().connections_created, 2);
    replacement.close().await;
}

#[tokio::test]
async fn test_transient_error_keeps_connection() {
    let (factory, state) = MockFactory::new();
    let config = test_config().with_init_size(1).with_max_size(2);
    let pool = SimpleConnectionPool::with_factory(config, factory)
        .await
        .expect("pool construction");

    let mut conn = pool.acquire().await.expect("acquire");
    state.inject_error(Error::sql_state("syntax error at or near", "42601"));

    let err = conn.execute("SELEC 1", &[]).await.expect_err("injected");
    assert!(!err.is_fatal());
    assert!(!conn.is_force_closed());

    conn.close().await;
    assert_eq!(pool.idle_connections(), 1);
    assert_eq!(pool.total_connections(), 1);

    // Reacquire reuses the same connection, nothing new is opened.
    let mut again = pool.acquire().await.expect("reacquire");
    assert_eq!(pool.stats().connections_created, 1);
    again.close().await;
}

// ==================== Concurrency bound ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquirers_respect_ceiling() {
    let (factory, state) = MockFactory::new();
    let config = test_config()
        .with_max_size(4)
        .with_acquire_timeout(Duration::from_secs(2));
    let pool = SimpleConnectionPool::with_factory(config, factory)
        .await
        .expect("pool construction");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let mut conn = pool.acquire().await?;
            tokio::time::sleep(Duration::from_millis(20)).await;
            conn.close().await;
            Ok::<_, Error>(())
        }));
    }

    for handle in handles {
        handle.await.expect("task").expect("acquire within deadline");
    }

    assert!(pool.total_connections() <= 4);
    assert!(state.opened.load(std::sync::atomic::Ordering::Acquire) <= 4);
    assert_eq!(pool.stats().acquisitions, 8);
}

// ==================== Growth failure diagnostics ====================

#[tokio::test(start_paused = true)]
async fn test_exhausted_error_carries_latest_failure() {
    let (factory, state) = MockFactory::new();
    state
        .open_failures
        .store(1000, std::sync::atomic::Ordering::Release);
    let config = test_config().with_acquire_timeout(Duration::from_millis(100));
    let pool = SimpleConnectionPool::with_factory(config, factory)
        .await
        .expect("construction is best-effort");

    let err = pool.acquire().await.expect_err("nothing can be opened");
    assert!(matches!(err, Error::PoolExhausted { .. }));
    assert!(
        err.to_string().contains("mock driver refused to connect"),
        "got: {err}"
    );
    assert!(pool.latest_error().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_initial_fill_is_best_effort() {
    let (factory, state) = MockFactory::new();
    state
        .open_failures
        .store(1000, std::sync::atomic::Ordering::Release);
    let config = test_config().with_init_size(2).with_min_size(2);

    let pool = SimpleConnectionPool::with_factory(config, factory)
        .await
        .expect("shortfall is logged, not fatal");

    assert_eq!(pool.total_connections(), 0);
    assert!(pool.latest_error().is_some());
}

// ==================== Shutdown ====================

#[tokio::test]
async fn test_shutdown_idle_spares_checked_out() {
    let (factory, _state) = MockFactory::new();
    let config = test_config()
        .with_init_size(3)
        .with_min_size(3)
        .with_max_size(4);
    let pool = SimpleConnectionPool::with_factory(config, factory)
        .await
        .expect("pool construction");

    let mut held = pool.acquire().await.expect("acquire");
    pool.shutdown_idle().await;

    assert_eq!(pool.idle_connections(), 0);
    assert_eq!(pool.total_connections(), 1);

    // The pool is still open; the held connection comes back normally.
    held.close().await;
    assert_eq!(pool.idle_connections(), 1);
    assert_eq!(pool.total_connections(), 1);
}

#[tokio::test]
async fn test_close_terminates_on_release() {
    let (factory, _state) = MockFactory::new();
    let config = test_config().with_init_size(2).with_min_size(2);
    let pool = SimpleConnectionPool::with_factory(config, factory)
        .await
        .expect("pool construction");

    let mut held = pool.acquire().await.expect("acquire");
    pool.close().await;

    assert!(pool.is_shut_down());
    assert_eq!(pool.idle_connections(), 0);
    assert_eq!(pool.total_connections(), 1);

    let err = pool.acquire().await.expect_err("pool is shut down");
    assert!(matches!(err, Error::PoolExhausted { .. }));

    // Releasing after shutdown becomes a hard terminate.
    held.close().await;
    assert_eq!(pool.total_connections(), 0);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (factory, _state) = MockFactory::new();
    let pool = SimpleConnectionPool::with_factory(test_config().with_init_size(1), factory)
        .await
        .expect("pool construction");

    pool.close().await;
    pool.close().await;

    assert!(pool.is_shut_down());
    assert_eq!(pool.total_connections(), 0);
}

// ==================== Admission probe ====================

#[tokio::test]
async fn test_dead_connections_are_not_admitted() {
    let (factory, state) = MockFactory::new();
    state.alive.store(false, std::sync::atomic::Ordering::Release);
    let config = test_config()
        .with_test_connection(true)
        .with_acquire_timeout(Duration::from_millis(50))
        .with_retries(1, Duration::from_millis(1));
    let pool = SimpleConnectionPool::with_factory(config, factory)
        .await
        .expect("pool construction");

    let err = pool.acquire().await.expect_err("nothing passes the probe");
    assert!(matches!(err, Error::PoolExhausted { .. }));
    assert_eq!(pool.total_connections(), 0);
    assert!(pool.stats().probe_failures >= 1);
}
