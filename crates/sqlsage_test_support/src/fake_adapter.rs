use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use sqlsage_core::{
    AdapterFactory, ConnectionInfo, ConnectionParams, DatabaseAdapter, DatabaseKind, DbError,
    QueryOutput, SchemaOverview, SchemaSnapshot, TableDescriptor,
};

/// Scripted result for one SQL string.
#[derive(Debug, Clone)]
pub enum FakeQueryOutcome {
    Success(QueryOutput),
    Error(String),
    /// Block for the given duration, then succeed with an empty result.
    Delay(Duration),
}

impl FakeQueryOutcome {
    fn into_result(&self) -> Result<QueryOutput, DbError> {
        match self {
            Self::Success(output) => Ok(output.clone()),
            Self::Error(message) => Err(DbError::query_failed(message.clone())),
            Self::Delay(duration) => {
                std::thread::sleep(*duration);
                Ok(QueryOutput::empty(*duration))
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeAdapterStats {
    pub executed: Vec<String>,
    pub close_calls: usize,
    pub created_adapters: usize,
}

#[derive(Default)]
struct FakeAdapterState {
    snapshot: RwLock<Option<SchemaSnapshot>>,
    outcomes: RwLock<HashMap<String, FakeQueryOutcome>>,
    default_outcome: RwLock<Option<FakeQueryOutcome>>,
    executed: Mutex<Vec<String>>,
    close_calls: AtomicUsize,
    created_adapters: AtomicUsize,
    connect_error: RwLock<Option<String>>,
}

/// Deterministic adapter for tests: scripted outcomes keyed by SQL,
/// a configurable snapshot, and call statistics.
///
/// Cloning shares the underlying state, so a factory handed to a pool
/// and the test body observe the same statistics.
#[derive(Clone)]
pub struct FakeAdapter {
    kind: DatabaseKind,
    state: Arc<FakeAdapterState>,
}

impl FakeAdapter {
    pub fn new(kind: DatabaseKind) -> Self {
        Self {
            kind,
            state: Arc::new(FakeAdapterState::default()),
        }
    }

    pub fn with_snapshot(self, snapshot: SchemaSnapshot) -> Self {
        *write(&self.state.snapshot) = Some(snapshot);
        self
    }

    pub fn with_query_result(self, sql: impl Into<String>, output: QueryOutput) -> Self {
        write(&self.state.outcomes).insert(sql.into(), FakeQueryOutcome::Success(output));
        self
    }

    pub fn with_query_error(self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        write(&self.state.outcomes).insert(sql.into(), FakeQueryOutcome::Error(message.into()));
        self
    }

    pub fn with_default_result(self, output: QueryOutput) -> Self {
        *write(&self.state.default_outcome) = Some(FakeQueryOutcome::Success(output));
        self
    }

    pub fn with_default_error(self, message: impl Into<String>) -> Self {
        *write(&self.state.default_outcome) = Some(FakeQueryOutcome::Error(message.into()));
        self
    }

    pub fn with_connect_error(self, message: impl Into<String>) -> Self {
        *write(&self.state.connect_error) = Some(message.into());
        self
    }

    pub fn set_outcome(&self, sql: impl Into<String>, outcome: FakeQueryOutcome) {
        write(&self.state.outcomes).insert(sql.into(), outcome);
    }

    pub fn stats(&self) -> FakeAdapterStats {
        FakeAdapterStats {
            executed: lock(&self.state.executed).clone(),
            close_calls: self.state.close_calls.load(Ordering::Relaxed),
            created_adapters: self.state.created_adapters.load(Ordering::Relaxed),
        }
    }
}

impl DatabaseAdapter for FakeAdapter {
    fn kind(&self) -> DatabaseKind {
        self.kind
    }

    fn test_connection(&self) -> Result<ConnectionInfo, DbError> {
        if let Some(message) = read(&self.state.connect_error).clone() {
            return Err(DbError::connection_failed(message));
        }

        Ok(ConnectionInfo {
            database: "fake".to_string(),
            user: "fake".to_string(),
            version: "Fake 1.0".to_string(),
            database_type: self.kind,
        })
    }

    fn list_schemas(&self) -> Result<Vec<SchemaOverview>, DbError> {
        let snapshot = self.database_snapshot()?;
        let mut by_schema: HashMap<String, usize> = HashMap::new();
        for table in snapshot.tables.values() {
            *by_schema.entry(table.schema_name.clone()).or_default() += 1;
        }

        let mut overviews: Vec<SchemaOverview> = by_schema
            .into_iter()
            .map(|(schema_name, table_count)| SchemaOverview {
                schema_name,
                table_count,
                view_count: 0,
            })
            .collect();
        overviews.sort_by(|a, b| a.schema_name.cmp(&b.schema_name));
        Ok(overviews)
    }

    fn schema_snapshot(&self, _schema: &str) -> Result<SchemaSnapshot, DbError> {
        self.database_snapshot()
    }

    fn database_snapshot(&self) -> Result<SchemaSnapshot, DbError> {
        read(&self.state.snapshot)
            .clone()
            .ok_or_else(|| DbError::query_failed("fake adapter has no snapshot configured"))
    }

    fn table_info(&self, _schema: &str, table: &str) -> Result<TableDescriptor, DbError> {
        let snapshot = self.database_snapshot()?;
        snapshot
            .find_table(table)
            .cloned()
            .ok_or_else(|| DbError::query_failed(format!("no such table: {}", table)))
    }

    fn execute(&self, sql: &str) -> Result<QueryOutput, DbError> {
        lock(&self.state.executed).push(sql.to_string());

        if let Some(outcome) = read(&self.state.outcomes).get(sql).cloned() {
            return outcome.into_result();
        }

        if let Some(outcome) = read(&self.state.default_outcome).clone() {
            return outcome.into_result();
        }

        Ok(QueryOutput::empty(Duration::from_millis(1)))
    }

    fn invalidate_cache(&self) {}

    fn close(&self) {
        self.state.close_calls.fetch_add(1, Ordering::Relaxed);
    }
}

/// Factory returning clones of one shared fake adapter.
pub struct FakeAdapterFactory {
    adapter: FakeAdapter,
}

impl FakeAdapterFactory {
    pub fn new(adapter: FakeAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &FakeAdapter {
        &self.adapter
    }
}

impl AdapterFactory for FakeAdapterFactory {
    fn kind(&self) -> DatabaseKind {
        self.adapter.kind
    }

    fn create(&self, _params: &ConnectionParams) -> Result<Box<dyn DatabaseAdapter>, DbError> {
        if let Some(message) = read(&self.adapter.state.connect_error).clone() {
            return Err(DbError::connection_failed(message));
        }

        self.adapter
            .state
            .created_adapters
            .fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(self.adapter.clone()))
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}
