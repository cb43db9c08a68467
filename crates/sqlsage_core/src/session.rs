//! User sessions binding connection parameters to cached schema state.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{ConnectionParams, DbError, SchemaSnapshot};

/// One user's binding of connection parameters plus cached schema.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    pub params: ConnectionParams,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub schema_cache: Option<SchemaSnapshot>,
    pub schema_cache_at: Option<DateTime<Utc>>,
}

impl Session {
    fn new(params: ConnectionParams) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            params,
            created_at: now,
            last_accessed: now,
            schema_cache: None,
            schema_cache_at: None,
        }
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        let idle = Utc::now() - self.last_accessed;
        idle.to_std().map(|d| d > timeout).unwrap_or(false)
    }
}

/// Registry of live sessions, swept for expiry every few minutes.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Session>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Find or mint a session for the given parameters.
    ///
    /// An existing session is reused only when its connection identity
    /// matches; a session id pointing at a different database mints a
    /// fresh session rather than silently switching targets.
    pub fn get_or_create(&self, session_id: Option<Uuid>, params: &ConnectionParams) -> Session {
        let mut sessions = lock(&self.sessions);

        if let Some(id) = session_id {
            if let Some(session) = sessions.get_mut(&id) {
                if session.params.identity() == params.identity() {
                    session.last_accessed = Utc::now();
                    return session.clone();
                }
                log::info!(
                    "[SESSION] {} rebound to a different connection, minting a new session",
                    id
                );
            }
        }

        let session = Session::new(params.clone());
        log::info!(
            "[SESSION] Created {} for {}",
            session.session_id,
            params.identity()
        );
        sessions.insert(session.session_id, session.clone());
        session
    }

    /// Fetch a session, updating its access time.
    pub fn get(&self, session_id: Uuid) -> Result<Session, DbError> {
        let mut sessions = lock(&self.sessions);
        match sessions.get_mut(&session_id) {
            Some(session) => {
                session.last_accessed = Utc::now();
                Ok(session.clone())
            }
            None => Err(DbError::NoActiveSession(session_id.to_string())),
        }
    }

    /// Attach a schema snapshot to the session's cache.
    pub fn cache_schema(&self, session_id: Uuid, snapshot: SchemaSnapshot) {
        let mut sessions = lock(&self.sessions);
        if let Some(session) = sessions.get_mut(&session_id) {
            session.schema_cache = Some(snapshot);
            session.schema_cache_at = Some(Utc::now());
        }
    }

    /// Cached snapshot, if present and younger than `ttl`.
    pub fn cached_schema(&self, session_id: Uuid, ttl: Duration) -> Option<SchemaSnapshot> {
        let sessions = lock(&self.sessions);
        let session = sessions.get(&session_id)?;
        let cached_at = session.schema_cache_at?;

        let age = (Utc::now() - cached_at).to_std().ok()?;
        if age > ttl {
            return None;
        }

        session.schema_cache.clone()
    }

    pub fn remove(&self, session_id: Uuid) -> bool {
        lock(&self.sessions).remove(&session_id).is_some()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Evict sessions idle beyond the timeout. Returns the number evicted.
    pub fn sweep_expired(&self) -> usize {
        let mut sessions = lock(&self.sessions);
        let before = sessions.len();
        sessions.retain(|id, session| {
            let keep = !session.is_expired(self.idle_timeout);
            if !keep {
                log::info!("[SESSION] Expired {}", id);
            }
            keep
        });
        before - sessions.len()
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

    fn params(db: &str) -> ConnectionParams {
        ConnectionParams::Postgres {
            host: "localhost".to_string(),
            port: 5432,
            database: db.to_string(),
            username: "postgres".to_string(),
            password: String::new(),
        }
    }

    #[test]
    fn matching_identity_reuses_the_session() {
        let registry = SessionRegistry::new(Duration::from_secs(3600));
        let first = registry.get_or_create(None, &params("app"));
        let second = registry.get_or_create(Some(first.session_id), &params("app"));

        assert_eq!(first.session_id, second.session_id);
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn different_identity_mints_a_new_session() {
        let registry = SessionRegistry::new(Duration::from_secs(3600));
        let first = registry.get_or_create(None, &params("app"));
        let second = registry.get_or_create(Some(first.session_id), &params("warehouse"));

        assert_ne!(first.session_id, second.session_id);
        assert_eq!(registry.session_count(), 2);
    }

    #[test]
    fn schema_cache_honors_ttl() {
        let registry = SessionRegistry::new(Duration::from_secs(3600));
        let session = registry.get_or_create(None, &params("app"));

        let snapshot = SchemaSnapshot::new("app", DatabaseKind::Postgres);
        registry.cache_schema(session.session_id, snapshot);

        assert!(registry
            .cached_schema(session.session_id, Duration::from_secs(60))
            .is_some());
        assert!(registry
            .cached_schema(session.session_id, Duration::ZERO)
            .is_none());
    }

    #[test]
    fn sweep_evicts_only_idle_sessions() {
        let registry = SessionRegistry::new(Duration::ZERO);
        registry.get_or_create(None, &params("app"));

        // Idle timeout of zero expires everything immediately.
        assert_eq!(registry.sweep_expired(), 1);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn unknown_session_is_an_error() {
        let registry = SessionRegistry::new(Duration::from_secs(3600));
        assert!(matches!(
            registry.get(Uuid::new_v4()),
            Err(DbError::NoActiveSession(_))
        ));
    }
}
