//! Pool manager contract: borrow-and-return balance, eviction safety,
//! and handle behavior when the owning pool disappears.

use std::sync::Arc;
use std::time::Duration;

use sqlsage_core::{AdapterRegistry, DatabaseKind, PoolConfig, PoolManager};
use sqlsage_test_support::{fixtures, FakeAdapter, FakeAdapterFactory};

fn manager_with(adapter: FakeAdapter, idle_timeout: Duration, max_size: usize) -> PoolManager {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(FakeAdapterFactory::new(adapter)));

    PoolManager::new(
        registry,
        PoolConfig {
            min_size: 1,
            max_size,
            idle_timeout,
        },
    )
}

#[test]
fn acquire_then_release_keeps_open_count_stable() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres);
    let manager = manager_with(adapter, Duration::from_secs(1800), 10);
    let params = fixtures::postgres_params();

    let handle = manager.acquire(&params).unwrap();
    assert_eq!(manager.pool_stats(&params), Some((1, 1)));

    drop(handle);
    assert_eq!(manager.pool_stats(&params), Some((1, 0)));

    // Re-acquire reuses the idle adapter instead of opening another.
    let _handle = manager.acquire(&params).unwrap();
    assert_eq!(manager.pool_stats(&params), Some((1, 1)));
}

#[test]
fn pool_reuses_adapters_instead_of_reconnecting() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres);
    let stats_handle = adapter.clone();
    let manager = manager_with(adapter, Duration::from_secs(1800), 10);
    let params = fixtures::postgres_params();

    for _ in 0..5 {
        let handle = manager.acquire(&params).unwrap();
        drop(handle);
    }

    assert_eq!(stats_handle.stats().created_adapters, 1);
}

#[test]
fn exhausted_pool_reports_a_distinct_error() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres);
    let manager = manager_with(adapter, Duration::from_secs(1800), 2);
    let params = fixtures::postgres_params();

    let _first = manager.acquire(&params).unwrap();
    let _second = manager.acquire(&params).unwrap();

    let third = manager.acquire(&params);
    assert!(matches!(
        third,
        Err(sqlsage_core::DbError::PoolExhausted { .. })
    ));
}

#[test]
fn sweep_never_closes_a_pool_with_checked_out_handles() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres);
    let manager = manager_with(adapter, Duration::ZERO, 10);
    let params = fixtures::postgres_params();

    let handle = manager.acquire(&params).unwrap();
    std::thread::sleep(Duration::from_millis(10));

    // The pool is past its idle timeout, but a handle is out.
    assert_eq!(manager.sweep_idle(), 0);
    assert_eq!(manager.pool_count(), 1);

    drop(handle);
    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(manager.sweep_idle(), 1);
    assert_eq!(manager.pool_count(), 0);
}

#[test]
fn sweep_trims_surviving_pools_to_min_size() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres);
    let manager = manager_with(adapter, Duration::from_secs(1800), 10);
    let params = fixtures::postgres_params();

    // Three concurrent checkouts grow the pool to three adapters.
    let a = manager.acquire(&params).unwrap();
    let b = manager.acquire(&params).unwrap();
    let c = manager.acquire(&params).unwrap();
    drop((a, b, c));
    assert_eq!(manager.pool_stats(&params), Some((3, 0)));

    // The pool is recent, so it survives, but idle shrinks to min_size.
    assert_eq!(manager.sweep_idle(), 0);
    assert_eq!(manager.pool_stats(&params), Some((1, 0)));
}

#[test]
fn handle_returned_after_eviction_closes_the_adapter() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres);
    let stats_handle = adapter.clone();
    let manager = manager_with(adapter, Duration::from_secs(1800), 10);
    let params = fixtures::postgres_params();

    let handle = manager.acquire(&params).unwrap();

    // The pool vanishes while the handle is out.
    manager.close(&params);
    assert_eq!(manager.pool_count(), 0);

    drop(handle);
    assert_eq!(stats_handle.stats().close_calls, 1);
}

#[test]
fn close_all_closes_idle_adapters() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres);
    let stats_handle = adapter.clone();
    let manager = manager_with(adapter, Duration::from_secs(1800), 10);
    let params = fixtures::postgres_params();

    let handle = manager.acquire(&params).unwrap();
    drop(handle);

    manager.close_all();
    assert_eq!(stats_handle.stats().close_calls, 1);
}

#[test]
fn adapters_are_usable_through_the_guard() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres)
        .with_query_result("SELECT COUNT(*) FROM users", fixtures::count_result(3));
    let manager = manager_with(adapter, Duration::from_secs(1800), 10);
    let params = fixtures::postgres_params();

    let handle = manager.acquire(&params).unwrap();
    let output = handle.execute("SELECT COUNT(*) FROM users").unwrap();
    assert_eq!(output.rows[0]["count"], serde_json::json!(3));
}
