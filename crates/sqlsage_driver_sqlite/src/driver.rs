use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rusqlite::Connection as RusqliteConnection;
use sqlsage_core::{
    AdapterFactory, ColumnDescriptor, ConnectionInfo, ConnectionParams, DatabaseAdapter,
    DatabaseKind, DbError, ForeignKey, FormattedError, QueryOutput, SchemaOverview,
    SchemaSnapshot, SnapshotCache, TableDescriptor, Value, ViewDescriptor, MAX_SAMPLE_ROWS,
};

/// SQLite exposes a single synthetic schema.
const MAIN_SCHEMA: &str = "main";

pub struct SqliteAdapterFactory {
    schema_cache_ttl: Duration,
}

impl SqliteAdapterFactory {
    pub fn new(schema_cache_ttl: Duration) -> Self {
        Self { schema_cache_ttl }
    }
}

impl AdapterFactory for SqliteAdapterFactory {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Sqlite
    }

    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn DatabaseAdapter>, DbError> {
        let path = match params {
            ConnectionParams::Sqlite { file_path } => file_path.clone(),
            _ => {
                return Err(DbError::InvalidParams(
                    "Expected SQLite parameters".to_string(),
                ));
            }
        };

        log::info!("Opening SQLite database at {}", path.display());

        let conn = if path.as_os_str() == ":memory:" {
            RusqliteConnection::open_in_memory()
        } else {
            RusqliteConnection::open(&path)
        }
        .map_err(|e| DbError::connection_failed(e.to_string()))?;

        Ok(Box::new(SqliteAdapter {
            conn: Mutex::new(conn),
            path,
            cache: SnapshotCache::new(self.schema_cache_ttl),
        }))
    }
}

pub struct SqliteAdapter {
    conn: Mutex<RusqliteConnection>,
    path: PathBuf,
    cache: SnapshotCache,
}

impl DatabaseAdapter for SqliteAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Sqlite
    }

    fn test_connection(&self) -> Result<ConnectionInfo, DbError> {
        let conn = self.lock_conn();

        let version: String = conn
            .query_row("SELECT sqlite_version()", [], |row| row.get(0))
            .map_err(|e| format_sqlite_error(&e))?;

        Ok(ConnectionInfo {
            database: self.path.display().to_string(),
            user: String::new(),
            version: format!("SQLite {}", version),
            database_type: DatabaseKind::Sqlite,
        })
    }

    fn list_schemas(&self) -> Result<Vec<SchemaOverview>, DbError> {
        let conn = self.lock_conn();

        let table_count: usize = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| format_sqlite_error(&e))? as usize;

        let view_count: usize = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'view'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| format_sqlite_error(&e))? as usize;

        Ok(vec![SchemaOverview {
            schema_name: MAIN_SCHEMA.to_string(),
            table_count,
            view_count,
        }])
    }

    fn schema_snapshot(&self, schema: &str) -> Result<SchemaSnapshot, DbError> {
        // Any requested schema maps onto the single `main` namespace.
        if let Some(cached) = self.cache.schema(schema) {
            log::debug!("[SCHEMA] Cache hit for schema {}", schema);
            return Ok(cached);
        }

        let snapshot = self.introspect()?;
        self.cache.store_schema(schema, snapshot.clone());
        Ok(snapshot)
    }

    fn database_snapshot(&self) -> Result<SchemaSnapshot, DbError> {
        if let Some(cached) = self.cache.database() {
            return Ok(cached);
        }

        let snapshot = self.introspect()?;
        self.cache.store_database(snapshot.clone());
        Ok(snapshot)
    }

    fn table_info(&self, _schema: &str, table: &str) -> Result<TableDescriptor, DbError> {
        let conn = self.lock_conn();
        fetch_table(&conn, table, true)
    }

    fn execute(&self, sql: &str) -> Result<QueryOutput, DbError> {
        let start = Instant::now();
        let conn = self.lock_conn();

        log::debug!("[QUERY] Executing: {}", preview(sql));

        if sqlsage_core::is_select_like(sql) {
            let mut stmt = conn.prepare(sql).map_err(|e| format_sqlite_error(&e))?;

            let columns: Vec<String> =
                stmt.column_names().iter().map(|s| s.to_string()).collect();
            let column_count = columns.len();

            let mut rows = stmt.query([]).map_err(|e| format_sqlite_error(&e))?;
            let mut values: Vec<Vec<Value>> = Vec::new();

            loop {
                match rows.next() {
                    Ok(Some(row)) => {
                        values.push(
                            (0..column_count)
                                .map(|i| sqlite_value_to_value(row, i))
                                .collect(),
                        );
                    }
                    Ok(None) => break,
                    Err(e) => return Err(format_sqlite_error(&e)),
                }
            }

            let elapsed = start.elapsed();
            log::debug!(
                "[QUERY] Completed in {:.2}ms, {} rows",
                elapsed.as_secs_f64() * 1000.0,
                values.len()
            );

            Ok(QueryOutput::from_rows(columns, values, elapsed))
        } else {
            let affected = conn.execute(sql, []).map_err(|e| format_sqlite_error(&e))?;
            let elapsed = start.elapsed();
            log::debug!(
                "[QUERY] Statement affected {} rows in {:.2}ms",
                affected,
                elapsed.as_secs_f64() * 1000.0
            );
            Ok(QueryOutput::empty(elapsed))
        }
    }

    fn invalidate_cache(&self) {
        self.cache.clear();
    }

    fn close(&self) {
        log::debug!("[POOL] SQLite adapter for {} released", self.path.display());
    }
}

impl SqliteAdapter {
    fn lock_conn(&self) -> std::sync::MutexGuard<'_, RusqliteConnection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    fn introspect(&self) -> Result<SchemaSnapshot, DbError> {
        let start = Instant::now();
        let conn = self.lock_conn();

        let mut snapshot =
            SchemaSnapshot::new(self.path.display().to_string(), DatabaseKind::Sqlite);

        let table_names: Vec<String> = {
            let mut stmt = conn
                .prepare(
                    "SELECT name FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )
                .map_err(|e| format_sqlite_error(&e))?;

            let rows = stmt
                .query_map([], |row| row.get(0))
                .map_err(|e| format_sqlite_error(&e))?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        for name in table_names {
            snapshot.insert_table(fetch_table(&conn, &name, true)?);
        }

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'view' ORDER BY name")
            .map_err(|e| format_sqlite_error(&e))?;

        let views: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| format_sqlite_error(&e))?
            .filter_map(|r| r.ok())
            .collect();

        for view in views {
            snapshot.views.push(ViewDescriptor {
                schema_name: MAIN_SCHEMA.to_string(),
                view_name: view,
            });
        }

        log::info!(
            "[SCHEMA] Introspected {} tables, {} views in {:.2}ms",
            snapshot.table_count(),
            snapshot.views.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(snapshot)
    }
}

fn fetch_table(
    conn: &RusqliteConnection,
    table: &str,
    with_samples: bool,
) -> Result<TableDescriptor, DbError> {
    let mut descriptor = TableDescriptor::new(MAIN_SCHEMA, table);

    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info('{}')", escape_single(table)))
        .map_err(|e| format_sqlite_error(&e))?;

    let columns: Vec<ColumnDescriptor> = stmt
        .query_map([], |row| {
            let data_type: String = row.get::<_, String>(2).unwrap_or_default();
            Ok(ColumnDescriptor {
                name: row.get(1)?,
                data_type,
                nullable: row.get::<_, i32>(3).unwrap_or(1) == 0,
                default_value: row.get::<_, Option<String>>(4).unwrap_or(None),
                primary_key: row.get::<_, i32>(5).unwrap_or(0) >= 1,
                unique: row.get::<_, i32>(5).unwrap_or(0) >= 1,
            })
        })
        .map_err(|e| format_sqlite_error(&e))?
        .filter_map(|r| r.ok())
        .collect();

    descriptor.columns = columns;
    descriptor.foreign_keys = fetch_foreign_keys(conn, table)?;

    if with_samples {
        descriptor.sample_rows = fetch_sample_rows(conn, table);
    }

    Ok(descriptor)
}

fn fetch_foreign_keys(conn: &RusqliteConnection, table: &str) -> Result<Vec<ForeignKey>, DbError> {
    let mut stmt = conn
        .prepare(&format!(
            "PRAGMA foreign_key_list('{}')",
            escape_single(table)
        ))
        .map_err(|e| format_sqlite_error(&e))?;

    // PRAGMA foreign_key_list returns: id, seq, table, from, to, on_update, on_delete, match
    let fk_rows: Vec<(String, String, String, String)> = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(6)?,
            ))
        })
        .map_err(|e| format_sqlite_error(&e))?
        .filter_map(|r| r.ok())
        .collect();

    Ok(fk_rows
        .into_iter()
        .map(|(ref_table, from_col, to_col, on_delete)| ForeignKey {
            column: from_col,
            references_table: format!("{}.{}", MAIN_SCHEMA, ref_table),
            references_column: to_col,
            on_delete: if on_delete == "NO ACTION" {
                None
            } else {
                Some(on_delete)
            },
        })
        .collect())
}

fn fetch_sample_rows(conn: &RusqliteConnection, table: &str) -> Vec<serde_json::Value> {
    let sql = format!(
        "SELECT * FROM {} LIMIT {}",
        quote_ident(table),
        MAX_SAMPLE_ROWS
    );

    let mut stmt = match conn.prepare(&sql) {
        Ok(stmt) => stmt,
        Err(e) => {
            log::warn!("[SCHEMA] Sample rows failed for {}: {}", table, e);
            return Vec::new();
        }
    };

    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

    let mut rows = match stmt.query([]) {
        Ok(rows) => rows,
        Err(e) => {
            log::warn!("[SCHEMA] Sample rows failed for {}: {}", table, e);
            return Vec::new();
        }
    };

    let mut samples = Vec::new();
    while let Ok(Some(row)) = rows.next() {
        let map: serde_json::Map<String, serde_json::Value> = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), sqlite_value_to_value(row, i).into_json()))
            .collect();
        samples.push(serde_json::Value::Object(map));

        if samples.len() >= MAX_SAMPLE_ROWS {
            break;
        }
    }

    samples
}

fn sqlite_value_to_value(row: &rusqlite::Row, idx: usize) -> Value {
    use rusqlite::types::ValueRef;

    match row.get_ref(idx) {
        Ok(ValueRef::Null) => Value::Null,
        Ok(ValueRef::Integer(i)) => Value::Int(i),
        Ok(ValueRef::Real(f)) => Value::Float(f),
        Ok(ValueRef::Text(t)) => Value::Text(String::from_utf8_lossy(t).to_string()),
        Ok(ValueRef::Blob(b)) => Value::Bytes(b.to_vec()),
        Err(_) => Value::Null,
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn escape_single(name: &str) -> String {
    name.replace('\'', "''")
}

fn preview(sql: &str) -> String {
    let flattened = sql.replace('\n', " ");
    sqlsage_core::truncate_string_safe(&flattened, 80)
}

fn format_sqlite_error(e: &rusqlite::Error) -> DbError {
    let formatted = match e {
        rusqlite::Error::SqliteFailure(err, msg) => {
            let message = msg.clone().unwrap_or_else(|| format!("{:?}", err.code));
            FormattedError::new(message).with_code(format!("{:?} ({})", err.code, err.extended_code))
        }
        _ => FormattedError::new(e.to_string()),
    };

    log::error!("SQLite query failed: {}", formatted);
    DbError::QueryFailed(formatted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_adapter() -> Box<dyn DatabaseAdapter> {
        let factory = SqliteAdapterFactory::new(Duration::from_secs(3600));
        factory
            .create(&ConnectionParams::Sqlite {
                file_path: ":memory:".into(),
            })
            .expect("in-memory sqlite should open")
    }

    #[test]
    fn memory_database_opens_and_probes() {
        let adapter = memory_adapter();
        let info = adapter.test_connection().unwrap();
        assert!(info.version.starts_with("SQLite"));
        assert_eq!(info.database_type, DatabaseKind::Sqlite);
    }

    #[test]
    fn execute_creates_and_reads_rows() {
        let adapter = memory_adapter();
        adapter
            .execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        adapter
            .execute("INSERT INTO users (name) VALUES ('ada'), ('grace'), ('edsger')")
            .unwrap();

        let output = adapter.execute("SELECT COUNT(*) AS count FROM users").unwrap();
        assert_eq!(output.rows[0]["count"], serde_json::json!(3));
    }

    #[test]
    fn snapshot_reports_synthetic_main_schema() {
        let adapter = memory_adapter();
        adapter
            .execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
            .unwrap();
        adapter.invalidate_cache();

        let schemas = adapter.list_schemas().unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].schema_name, "main");
        assert_eq!(schemas[0].table_count, 1);

        let snapshot = adapter.database_snapshot().unwrap();
        assert!(snapshot.tables.contains_key("main.notes"));
    }

    #[test]
    fn foreign_keys_are_reported() {
        let adapter = memory_adapter();
        adapter
            .execute("CREATE TABLE vendors (id INTEGER PRIMARY KEY)")
            .unwrap();
        adapter
            .execute(
                "CREATE TABLE orders (id INTEGER PRIMARY KEY, \
                 vendor_id INTEGER REFERENCES vendors(id))",
            )
            .unwrap();

        let table = adapter.table_info("main", "orders").unwrap();
        assert_eq!(table.foreign_keys.len(), 1);
        assert_eq!(table.foreign_keys[0].references_table, "main.vendors");
    }

    #[test]
    fn query_failure_carries_native_message() {
        let adapter = memory_adapter();
        let err = adapter.execute("SELECT nope FROM missing").unwrap_err();
        assert!(err.native_message().contains("no such table"));
    }
}
