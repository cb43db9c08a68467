use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::SchemaSnapshot;

/// TTL cache for introspected snapshots, shared by every adapter.
///
/// Single writer per entry: whoever finds the entry missing or stale
/// re-introspects and stores; concurrent readers receive the last
/// written snapshot.
pub struct SnapshotCache {
    ttl: Duration,
    per_schema: Mutex<HashMap<String, (SchemaSnapshot, Instant)>>,
    database: Mutex<Option<(SchemaSnapshot, Instant)>>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            per_schema: Mutex::new(HashMap::new()),
            database: Mutex::new(None),
        }
    }

    pub fn schema(&self, name: &str) -> Option<SchemaSnapshot> {
        let cache = lock(&self.per_schema);
        cache.get(name).and_then(|(snapshot, at)| {
            if at.elapsed() <= self.ttl {
                Some(snapshot.clone())
            } else {
                None
            }
        })
    }

    pub fn store_schema(&self, name: &str, snapshot: SchemaSnapshot) {
        lock(&self.per_schema).insert(name.to_string(), (snapshot, Instant::now()));
    }

    pub fn database(&self) -> Option<SchemaSnapshot> {
        let cache = lock(&self.database);
        cache.as_ref().and_then(|(snapshot, at)| {
            if at.elapsed() <= self.ttl {
                Some(snapshot.clone())
            } else {
                None
            }
        })
    }

    pub fn store_database(&self, snapshot: SchemaSnapshot) {
        *lock(&self.database) = Some((snapshot, Instant::now()));
    }

    pub fn clear(&self) {
        lock(&self.per_schema).clear();
        *lock(&self.database) = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabaseKind;

    #[test]
    fn cached_snapshot_expires_after_ttl() {
        let cache = SnapshotCache::new(Duration::ZERO);
        cache.store_schema("public", SchemaSnapshot::new("app", DatabaseKind::Postgres));

        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.schema("public").is_none());
    }

    #[test]
    fn clear_drops_both_layers() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        cache.store_schema("public", SchemaSnapshot::new("app", DatabaseKind::Postgres));
        cache.store_database(SchemaSnapshot::new("app", DatabaseKind::Postgres));

        cache.clear();
        assert!(cache.schema("public").is_none());
        assert!(cache.database().is_none());
    }
}
