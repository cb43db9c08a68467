//! Per-database connection pooling.
//!
//! Pools are keyed by a deterministic hash of the connection identity
//! (`host:port:database:user`). Handles are checked out as drop guards:
//! returning on every exit path is guaranteed by `Drop`, and a guard
//! whose pool has been evicted closes its adapter instead of leaking it.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::{AdapterRegistry, ConnectionParams, DatabaseAdapter, DbError};

/// Sizing and eviction knobs for every pool under a manager.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    /// Pools idle longer than this are reclaimed by the sweep.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Deterministic pool key for a connection identity.
pub fn pool_key(params: &ConnectionParams) -> String {
    let digest = Sha256::digest(params.identity().as_bytes());
    hex::encode(&digest[..12])
}

struct PoolInner {
    idle: Vec<Box<dyn DatabaseAdapter>>,
    checked_out: usize,
    last_used: Instant,
    closed: bool,
}

/// Pooled adapters for one connection identity.
pub struct ConnectionPool {
    key: String,
    params: ConnectionParams,
    registry: AdapterRegistry,
    config: PoolConfig,
    inner: Mutex<PoolInner>,
}

impl ConnectionPool {
    fn new(
        key: String,
        params: ConnectionParams,
        registry: AdapterRegistry,
        config: PoolConfig,
    ) -> Self {
        Self {
            key,
            params,
            registry,
            config,
            inner: Mutex::new(PoolInner {
                idle: Vec::new(),
                checked_out: 0,
                last_used: Instant::now(),
                closed: false,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Total adapters owned by the pool, idle and checked out.
    pub fn open_count(&self) -> usize {
        let inner = lock(&self.inner);
        inner.idle.len() + inner.checked_out
    }

    pub fn checked_out(&self) -> usize {
        lock(&self.inner).checked_out
    }

    pub fn last_used(&self) -> Instant {
        lock(&self.inner).last_used
    }

    fn checkout(self: &Arc<Self>) -> Result<PooledAdapter, DbError> {
        let adapter = {
            let mut inner = lock(&self.inner);

            if inner.closed {
                return Err(DbError::PoolExhausted {
                    key: self.key.clone(),
                });
            }

            inner.last_used = Instant::now();

            if let Some(adapter) = inner.idle.pop() {
                inner.checked_out += 1;
                Some(adapter)
            } else if inner.checked_out < self.config.max_size {
                // Reserve the slot before connecting so concurrent
                // checkouts cannot overshoot max_size.
                inner.checked_out += 1;
                None
            } else {
                return Err(DbError::PoolExhausted {
                    key: self.key.clone(),
                });
            }
        };

        let adapter = match adapter {
            Some(adapter) => adapter,
            None => match self.registry.create(&self.params) {
                Ok(adapter) => {
                    log::debug!("[POOL] {} opened a new connection", self.key);
                    adapter
                }
                Err(e) => {
                    lock(&self.inner).checked_out -= 1;
                    return Err(e);
                }
            },
        };

        Ok(PooledAdapter {
            adapter: Some(adapter),
            pool: Arc::downgrade(self),
        })
    }

    /// Close idle adapters beyond `min_size`. Returns how many closed.
    fn shrink_idle(&self) -> usize {
        let extras = {
            let mut inner = lock(&self.inner);
            if inner.idle.len() > self.config.min_size {
                inner.idle.split_off(self.config.min_size)
            } else {
                Vec::new()
            }
        };

        for adapter in &extras {
            adapter.close();
        }

        if !extras.is_empty() {
            log::debug!(
                "[POOL] {} trimmed {} idle connections",
                self.key,
                extras.len()
            );
        }

        extras.len()
    }

    fn give_back(&self, adapter: Box<dyn DatabaseAdapter>) {
        let mut inner = lock(&self.inner);
        inner.checked_out = inner.checked_out.saturating_sub(1);
        inner.last_used = Instant::now();

        if inner.closed {
            drop(inner);
            adapter.close();
            return;
        }

        inner.idle.push(adapter);
    }

    fn close_all(&self) {
        let drained = {
            let mut inner = lock(&self.inner);
            inner.closed = true;
            std::mem::take(&mut inner.idle)
        };

        for adapter in &drained {
            adapter.close();
        }

        if !drained.is_empty() {
            log::info!("[POOL] {} closed {} idle connections", self.key, drained.len());
        }
    }
}

/// Checked-out adapter handle.
///
/// Dereferences to the adapter; on drop the adapter is returned to its
/// pool, or closed if the pool has been evicted in the meantime.
pub struct PooledAdapter {
    adapter: Option<Box<dyn DatabaseAdapter>>,
    pool: Weak<ConnectionPool>,
}

impl Deref for PooledAdapter {
    type Target = dyn DatabaseAdapter;

    fn deref(&self) -> &Self::Target {
        self.adapter
            .as_deref()
            .expect("pooled adapter accessed after return")
    }
}

impl Drop for PooledAdapter {
    fn drop(&mut self) {
        if let Some(adapter) = self.adapter.take() {
            match self.pool.upgrade() {
                Some(pool) => pool.give_back(adapter),
                None => adapter.close(),
            }
        }
    }
}

/// Owner of every pool, keyed by connection identity.
pub struct PoolManager {
    registry: AdapterRegistry,
    config: PoolConfig,
    pools: Mutex<HashMap<String, Arc<ConnectionPool>>>,
}

impl PoolManager {
    pub fn new(registry: AdapterRegistry, config: PoolConfig) -> Self {
        Self {
            registry,
            config,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Borrow an adapter for the given parameters, creating the pool
    /// lazily on first use.
    pub fn acquire(&self, params: &ConnectionParams) -> Result<PooledAdapter, DbError> {
        let pool = self.get_or_create(params);
        pool.checkout()
    }

    fn get_or_create(&self, params: &ConnectionParams) -> Arc<ConnectionPool> {
        let key = pool_key(params);
        let mut pools = lock(&self.pools);

        pools
            .entry(key.clone())
            .or_insert_with(|| {
                log::info!("[POOL] Creating pool {} for {}", key, params.identity());
                Arc::new(ConnectionPool::new(
                    key,
                    params.clone(),
                    self.registry.clone(),
                    self.config.clone(),
                ))
            })
            .clone()
    }

    /// Stats for a pool, if it exists: (open, checked_out).
    pub fn pool_stats(&self, params: &ConnectionParams) -> Option<(usize, usize)> {
        let pools = lock(&self.pools);
        pools
            .get(&pool_key(params))
            .map(|p| (p.open_count(), p.checked_out()))
    }

    pub fn pool_count(&self) -> usize {
        lock(&self.pools).len()
    }

    /// Close and remove the pool for one identity.
    pub fn close(&self, params: &ConnectionParams) {
        let removed = lock(&self.pools).remove(&pool_key(params));
        if let Some(pool) = removed {
            pool.close_all();
        }
    }

    pub fn close_all(&self) {
        let drained: Vec<Arc<ConnectionPool>> = lock(&self.pools).drain().map(|(_, p)| p).collect();
        for pool in drained {
            pool.close_all();
        }
    }

    /// Reclaim pools idle beyond the configured timeout and trim the
    /// survivors' idle adapters down to `min_size`.
    ///
    /// A pool with any checked-out handle is never reclaimed. Returns
    /// the number of pools closed.
    pub fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let mut evicted = Vec::new();
        let mut survivors = Vec::new();

        {
            let mut pools = lock(&self.pools);
            pools.retain(|key, pool| {
                let idle_for = now.saturating_duration_since(pool.last_used());
                if pool.checked_out() == 0 && idle_for > self.config.idle_timeout {
                    log::info!(
                        "[POOL] Evicting idle pool {} (idle {}s)",
                        key,
                        idle_for.as_secs()
                    );
                    evicted.push(pool.clone());
                    false
                } else {
                    survivors.push(pool.clone());
                    true
                }
            });
        }

        for pool in &evicted {
            pool.close_all();
        }

        for pool in &survivors {
            pool.shrink_idle();
        }

        evicted.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}
