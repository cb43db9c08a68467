use std::sync::Mutex;
use std::time::{Duration, Instant};

use postgres::{Client, NoTls};
use sqlsage_core::{
    AdapterFactory, ColumnDescriptor, ConnectionInfo, ConnectionParams, DatabaseAdapter,
    DatabaseKind, DbError, ForeignKey, FormattedError, QueryOutput, SchemaOverview,
    SchemaSnapshot, SnapshotCache, TableDescriptor, Value, ViewDescriptor, MAX_SAMPLE_ROWS,
};

/// Factory registered for `DatabaseKind::Postgres`.
pub struct PostgresAdapterFactory {
    schema_cache_ttl: Duration,
}

impl PostgresAdapterFactory {
    pub fn new(schema_cache_ttl: Duration) -> Self {
        Self { schema_cache_ttl }
    }
}

impl AdapterFactory for PostgresAdapterFactory {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Postgres
    }

    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn DatabaseAdapter>, DbError> {
        let (host, port, database, username, password) = match params {
            ConnectionParams::Postgres {
                host,
                port,
                database,
                username,
                password,
            } => (host, *port, database, username, password),
            _ => {
                return Err(DbError::InvalidParams(
                    "Expected PostgreSQL parameters".to_string(),
                ));
            }
        };

        log::info!(
            "Connecting to PostgreSQL at {}:{} as {} (database: {})",
            host,
            port,
            username,
            database
        );

        let conn_string = format!(
            "host={} port={} user={} password={} dbname={} connect_timeout=30",
            host, port, username, password, database
        );

        let client = Client::connect(&conn_string, NoTls)
            .map_err(|e| format_pg_connect_error(&e, host, port))?;

        log::info!("Connected to {}:{}", host, port);

        Ok(Box::new(PostgresAdapter {
            client: Mutex::new(client),
            database: database.clone(),
            cache: SnapshotCache::new(self.schema_cache_ttl),
        }))
    }
}

/// One live PostgreSQL connection behind the adapter contract.
pub struct PostgresAdapter {
    client: Mutex<Client>,
    database: String,
    cache: SnapshotCache,
}

impl DatabaseAdapter for PostgresAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Postgres
    }

    fn test_connection(&self) -> Result<ConnectionInfo, DbError> {
        let mut client = self.lock_client();

        let row = client
            .query_one(
                "SELECT current_database(), current_user, version()",
                &[],
            )
            .map_err(format_pg_query_error)?;

        Ok(ConnectionInfo {
            database: row.get(0),
            user: row.get(1),
            version: row.get(2),
            database_type: DatabaseKind::Postgres,
        })
    }

    fn list_schemas(&self) -> Result<Vec<SchemaOverview>, DbError> {
        let mut client = self.lock_client();

        let schema_rows = client
            .query(
                "SELECT schema_name FROM information_schema.schemata \
                 WHERE schema_name NOT IN ('pg_catalog', 'information_schema', 'pg_toast') \
                 ORDER BY schema_name",
                &[],
            )
            .map_err(format_pg_query_error)?;

        let count_rows = client
            .query(
                "SELECT table_schema, \
                        COUNT(*) FILTER (WHERE table_type = 'BASE TABLE'), \
                        COUNT(*) FILTER (WHERE table_type = 'VIEW') \
                 FROM information_schema.tables \
                 GROUP BY table_schema",
                &[],
            )
            .map_err(format_pg_query_error)?;

        let counts: std::collections::HashMap<String, (i64, i64)> = count_rows
            .iter()
            .map(|row| (row.get::<_, String>(0), (row.get(1), row.get(2))))
            .collect();

        Ok(schema_rows
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                let (tables, views) = counts.get(&name).copied().unwrap_or((0, 0));
                SchemaOverview {
                    schema_name: name,
                    table_count: tables as usize,
                    view_count: views as usize,
                }
            })
            .collect())
    }

    fn schema_snapshot(&self, schema: &str) -> Result<SchemaSnapshot, DbError> {
        if let Some(cached) = self.cache.schema(schema) {
            log::debug!("[SCHEMA] Cache hit for schema {}", schema);
            return Ok(cached);
        }

        let snapshot = self.introspect_schemas(&[schema.to_string()])?;
        self.cache.store_schema(schema, snapshot.clone());
        Ok(snapshot)
    }

    fn database_snapshot(&self) -> Result<SchemaSnapshot, DbError> {
        if let Some(cached) = self.cache.database() {
            log::debug!("[SCHEMA] Cache hit for database snapshot");
            return Ok(cached);
        }

        let schemas: Vec<String> = self
            .list_schemas()?
            .into_iter()
            .map(|s| s.schema_name)
            .collect();

        let snapshot = self.introspect_schemas(&schemas)?;
        self.cache.store_database(snapshot.clone());
        Ok(snapshot)
    }

    fn table_info(&self, schema: &str, table: &str) -> Result<TableDescriptor, DbError> {
        let mut client = self.lock_client();
        fetch_table(&mut client, schema, table, true)
    }

    fn execute(&self, sql: &str) -> Result<QueryOutput, DbError> {
        let start = Instant::now();
        let mut client = self.lock_client();

        log::debug!("[QUERY] Executing: {}", preview(sql));

        if sqlsage_core::is_select_like(sql) {
            let rows = client.query(sql, &[]).map_err(format_pg_query_error)?;
            let elapsed = start.elapsed();

            if rows.is_empty() {
                return Ok(QueryOutput::empty(elapsed));
            }

            let columns: Vec<String> = rows[0]
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();

            let values: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    (0..columns.len())
                        .map(|i| postgres_value_to_value(row, i))
                        .collect()
                })
                .collect();

            log::debug!(
                "[QUERY] Completed in {:.2}ms, {} rows",
                elapsed.as_secs_f64() * 1000.0,
                values.len()
            );

            Ok(QueryOutput::from_rows(columns, values, elapsed))
        } else {
            let affected = client.execute(sql, &[]).map_err(format_pg_query_error)?;
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
        // Client closes its socket on drop; nothing to flush.
        log::debug!("[POOL] PostgreSQL adapter for {} released", self.database);
    }
}

impl PostgresAdapter {
    fn lock_client(&self) -> std::sync::MutexGuard<'_, Client> {
        match self.client.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    fn introspect_schemas(&self, schemas: &[String]) -> Result<SchemaSnapshot, DbError> {
        let start = Instant::now();
        let mut client = self.lock_client();
        let mut snapshot = SchemaSnapshot::new(self.database.clone(), DatabaseKind::Postgres);

        for schema in schemas {
            let table_rows = client
                .query(
                    "SELECT table_name FROM information_schema.tables \
                     WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
                     ORDER BY table_name",
                    &[&schema],
                )
                .map_err(format_pg_query_error)?;

            for row in &table_rows {
                let table_name: String = row.get(0);
                let table = fetch_table(&mut client, schema, &table_name, true)?;
                snapshot.insert_table(table);
            }

            let view_rows = client
                .query(
                    "SELECT table_name FROM information_schema.views \
                     WHERE table_schema = $1 ORDER BY table_name",
                    &[&schema],
                )
                .map_err(format_pg_query_error)?;

            for row in &view_rows {
                snapshot.views.push(ViewDescriptor {
                    schema_name: schema.clone(),
                    view_name: row.get(0),
                });
            }
        }

        log::info!(
            "[SCHEMA] Introspected {} tables, {} views across {} schemas in {:.2}ms",
            snapshot.table_count(),
            snapshot.views.len(),
            schemas.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(snapshot)
    }
}

fn fetch_table(
    client: &mut Client,
    schema: &str,
    table: &str,
    with_samples: bool,
) -> Result<TableDescriptor, DbError> {
    let mut descriptor = TableDescriptor::new(schema, table);

    let column_rows = client
        .query(
            "SELECT column_name, data_type, is_nullable, column_default \
             FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 \
             ORDER BY ordinal_position",
            &[&schema, &table],
        )
        .map_err(format_pg_query_error)?;

    let constraint_rows = client
        .query(
            "SELECT kcu.column_name, tc.constraint_type \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             WHERE tc.table_schema = $1 AND tc.table_name = $2 \
               AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE')",
            &[&schema, &table],
        )
        .map_err(format_pg_query_error)?;

    let mut primary: Vec<String> = Vec::new();
    let mut unique: Vec<String> = Vec::new();
    for row in &constraint_rows {
        let column: String = row.get(0);
        let kind: String = row.get(1);
        if kind == "PRIMARY KEY" {
            primary.push(column);
        } else {
            unique.push(column);
        }
    }

    for row in &column_rows {
        let name: String = row.get(0);
        let nullable: String = row.get(2);
        descriptor.columns.push(ColumnDescriptor {
            primary_key: primary.contains(&name),
            unique: primary.contains(&name) || unique.contains(&name),
            name,
            data_type: row.get(1),
            nullable: nullable == "YES",
            default_value: row.get(3),
        });
    }

    let fk_rows = client
        .query(
            "SELECT kcu.column_name, ccu.table_schema, ccu.table_name, ccu.column_name, \
                    rc.delete_rule \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             JOIN information_schema.constraint_column_usage ccu \
               ON ccu.constraint_name = tc.constraint_name \
              AND ccu.table_schema = tc.table_schema \
             JOIN information_schema.referential_constraints rc \
               ON rc.constraint_name = tc.constraint_name \
              AND rc.constraint_schema = tc.table_schema \
             WHERE tc.table_schema = $1 AND tc.table_name = $2 \
               AND tc.constraint_type = 'FOREIGN KEY'",
            &[&schema, &table],
        )
        .map_err(format_pg_query_error)?;

    for row in &fk_rows {
        let ref_schema: String = row.get(1);
        let ref_table: String = row.get(2);
        let delete_rule: String = row.get(4);
        descriptor.foreign_keys.push(ForeignKey {
            column: row.get(0),
            references_table: format!("{}.{}", ref_schema, ref_table),
            references_column: row.get(3),
            on_delete: if delete_rule == "NO ACTION" {
                None
            } else {
                Some(delete_rule)
            },
        });
    }

    if with_samples {
        descriptor.sample_rows = fetch_sample_rows(client, schema, table);
    }

    Ok(descriptor)
}

fn fetch_sample_rows(client: &mut Client, schema: &str, table: &str) -> Vec<serde_json::Value> {
    let sql = format!(
        "SELECT * FROM {}.{} LIMIT {}",
        quote_ident(schema),
        quote_ident(table),
        MAX_SAMPLE_ROWS
    );

    let rows = match client.query(&sql, &[]) {
        Ok(rows) => rows,
        Err(e) => {
            log::warn!("[SCHEMA] Sample rows failed for {}.{}: {}", schema, table, e);
            return Vec::new();
        }
    };

    rows.iter()
        .map(|row| {
            let map: serde_json::Map<String, serde_json::Value> = row
                .columns()
                .iter()
                .enumerate()
                .map(|(i, col)| {
                    (
                        col.name().to_string(),
                        postgres_value_to_value(row, i).into_json(),
                    )
                })
                .collect();
            serde_json::Value::Object(map)
        })
        .collect()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn postgres_value_to_value(row: &postgres::Row, idx: usize) -> Value {
    let col_type = row.columns()[idx].type_();

    match col_type.name() {
        "bool" => row
            .try_get::<_, bool>(idx)
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "int2" => row
            .try_get::<_, i16>(idx)
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),
        "int4" => row
            .try_get::<_, i32>(idx)
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),
        "int8" => row
            .try_get::<_, i64>(idx)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "float4" => row
            .try_get::<_, f32>(idx)
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),
        "float8" => row
            .try_get::<_, f64>(idx)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "numeric" => row
            .try_get::<_, String>(idx)
            .map(Value::Decimal)
            .unwrap_or(Value::Null),
        "bytea" => row
            .try_get::<_, Vec<u8>>(idx)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        "timestamptz" => row
            .try_get::<_, chrono::DateTime<chrono::Utc>>(idx)
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        "timestamp" => row
            .try_get::<_, chrono::NaiveDateTime>(idx)
            .map(|v| Value::DateTime(v.and_utc()))
            .unwrap_or(Value::Null),
        "date" => row
            .try_get::<_, chrono::NaiveDate>(idx)
            .map(Value::Date)
            .unwrap_or(Value::Null),
        "time" => row
            .try_get::<_, chrono::NaiveTime>(idx)
            .map(Value::Time)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<_, String>(idx)
            .map(Value::Text)
            .unwrap_or(Value::Null),
    }
}

fn preview(sql: &str) -> String {
    let flattened = sql.replace('\n', " ");
    sqlsage_core::truncate_string_safe(&flattened, 80)
}

fn format_pg_query_error(e: postgres::Error) -> DbError {
    let formatted = match e.as_db_error() {
        Some(db_error) => {
            let mut f = FormattedError::new(db_error.message())
                .with_code(db_error.code().code());
            if let Some(detail) = db_error.detail() {
                f = f.with_detail(detail);
            }
            if let Some(hint) = db_error.hint() {
                f = f.with_hint(hint);
            }
            f
        }
        None => FormattedError::new(e.to_string()),
    };

    log::error!("PostgreSQL query failed: {}", formatted);
    DbError::QueryFailed(formatted)
}

fn format_pg_connect_error(e: &postgres::Error, host: &str, port: u16) -> DbError {
    let source = e.to_string();

    let message = if source.contains("timed out") {
        format!(
            "Connection to {}:{} timed out. Check that the host is reachable and the port is open.",
            host, port
        )
    } else if source.contains("Connection refused") {
        format!(
            "Connection refused at {}:{}. Verify PostgreSQL is running and accepting connections.",
            host, port
        )
    } else if source.contains("password authentication failed") {
        "Authentication failed. Check your username and password.".to_string()
    } else if source.contains("does not exist") {
        format!("Database or user does not exist: {}", source)
    } else if source.contains("Name or service not known")
        || source.contains("nodename nor servname")
    {
        format!("Could not resolve hostname: {}", host)
    } else {
        format!("Connection error: {}", source)
    };

    log::error!("PostgreSQL connection failed: {}", message);
    DbError::connection_failed(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_rejects_foreign_params() {
        let factory = PostgresAdapterFactory::new(Duration::from_secs(3600));
        let params = ConnectionParams::Sqlite {
            file_path: ":memory:".into(),
        };
        assert!(matches!(
            factory.create(&params),
            Err(DbError::InvalidParams(_))
        ));
    }

    #[test]
    fn ident_quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
