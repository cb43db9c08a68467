use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{ConnectionParams, DatabaseKind, DbError, QueryOutput, SchemaSnapshot, TableDescriptor};

/// Connection metadata returned by a successful `test_connection`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub database: String,
    pub user: String,
    pub version: String,
    pub database_type: DatabaseKind,
}

/// One row of `list_schemas`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaOverview {
    pub schema_name: String,
    pub table_count: usize,
    pub view_count: usize,
}

/// Dialect-normalized database access.
///
/// One adapter owns one live connection. The agent and the schema layer
/// interact exclusively through this trait; driver crates never leak
/// their client types. Implementations must be thread-safe: execution is
/// serialized internally on the underlying connection.
pub trait DatabaseAdapter: Send + Sync {
    /// The dialect this adapter speaks.
    fn kind(&self) -> DatabaseKind;

    /// Verify the connection works and report server metadata.
    fn test_connection(&self) -> Result<ConnectionInfo, DbError>;

    /// List user-visible schemas with object counts.
    ///
    /// System schemas are excluded per dialect; SQLite reports a
    /// synthetic `main`; Oracle reports only the connected user's schema.
    fn list_schemas(&self) -> Result<Vec<SchemaOverview>, DbError>;

    /// Snapshot one schema. Cached per schema with a TTL.
    fn schema_snapshot(&self, schema: &str) -> Result<SchemaSnapshot, DbError>;

    /// Snapshot the whole database. May span multiple schemas
    /// (PostgreSQL/MySQL) or coincide with the single-schema snapshot
    /// (SQLite/Oracle). Cached with a TTL.
    fn database_snapshot(&self) -> Result<SchemaSnapshot, DbError>;

    /// Full descriptor for one table, including every column.
    fn table_info(&self, schema: &str, table: &str) -> Result<TableDescriptor, DbError>;

    /// Execute one statement.
    ///
    /// SELECT-like statements return serialized rows; anything else is
    /// committed and returns an empty result. Failures carry the
    /// backend's native message for the error analyzer.
    fn execute(&self, sql: &str) -> Result<QueryOutput, DbError>;

    /// Drop cached snapshots so the next call re-introspects.
    fn invalidate_cache(&self);

    /// Close the underlying connection. Called when a pool evicts the
    /// adapter; implementations release resources and become inert.
    fn close(&self);
}

/// Factory for one dialect's adapters.
///
/// Registered in an `AdapterRegistry` at startup; the pool manager calls
/// `create` when it needs to grow a pool.
pub trait AdapterFactory: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn DatabaseAdapter>, DbError>;
}

/// Dialect → factory map assembled at startup.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: HashMap<DatabaseKind, Arc<dyn AdapterFactory>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn AdapterFactory>) {
        self.factories.insert(factory.kind(), factory);
    }

    pub fn create(&self, params: &ConnectionParams) -> Result<Box<dyn DatabaseAdapter>, DbError> {
        params.validate()?;

        let factory = self.factories.get(&params.kind()).ok_or_else(|| {
            DbError::UnsupportedDatabase(format!(
                "No adapter registered for {}",
                params.kind()
            ))
        })?;

        factory.create(params)
    }

    pub fn supported(&self) -> Vec<DatabaseKind> {
        let mut kinds: Vec<DatabaseKind> = self.factories.keys().copied().collect();
        kinds.sort_by_key(|k| k.id());
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullFactory(DatabaseKind);

    impl AdapterFactory for NullFactory {
        fn kind(&self) -> DatabaseKind {
            self.0
        }

        fn create(&self, _params: &ConnectionParams) -> Result<Box<dyn DatabaseAdapter>, DbError> {
            Err(DbError::NotSupported("test factory".to_string()))
        }
    }

    #[test]
    fn registry_rejects_unregistered_kinds() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(NullFactory(DatabaseKind::Sqlite)));

        let params = ConnectionParams::Postgres {
            host: "localhost".to_string(),
            port: 5432,
            database: "app".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
        };

        assert!(matches!(
            registry.create(&params),
            Err(DbError::UnsupportedDatabase(_))
        ));
        assert_eq!(registry.supported(), vec![DatabaseKind::Sqlite]);
    }
}
