use std::sync::Mutex;
use std::time::{Duration, Instant};

use oracle::sql_type::OracleType;
use oracle::Connection as OracleConnection;
use sqlsage_core::{
    AdapterFactory, ColumnDescriptor, ConnectionInfo, ConnectionParams, DatabaseAdapter,
    DatabaseKind, DbError, ForeignKey, FormattedError, QueryOutput, SchemaOverview,
    SchemaSnapshot, SnapshotCache, TableDescriptor, Value, ViewDescriptor,
    DEFAULT_ORACLE_SERVICE, MAX_SAMPLE_ROWS,
};

pub struct OracleAdapterFactory {
    schema_cache_ttl: Duration,
}

impl OracleAdapterFactory {
    pub fn new(schema_cache_ttl: Duration) -> Self {
        Self { schema_cache_ttl }
    }
}

impl AdapterFactory for OracleAdapterFactory {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Oracle
    }

    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn DatabaseAdapter>, DbError> {
        let (host, port, username, password, sid, service_name) = match params {
            ConnectionParams::Oracle {
                host,
                port,
                username,
                password,
                sid,
                service_name,
            } => (host, *port, username, password, sid, service_name),
            _ => {
                return Err(DbError::InvalidParams(
                    "Expected Oracle parameters".to_string(),
                ));
            }
        };

        let connect_string = match (sid, service_name) {
            (Some(sid), _) => format!(
                "(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST={})(PORT={}))\
                 (CONNECT_DATA=(SID={})))",
                host, port, sid
            ),
            (None, Some(service)) => format!("//{}:{}/{}", host, port, service),
            (None, None) => format!("//{}:{}/{}", host, port, DEFAULT_ORACLE_SERVICE),
        };

        log::info!(
            "Connecting to Oracle at {}:{} as {}",
            host,
            port,
            username
        );

        let conn = OracleConnection::connect(username, password, &connect_string)
            .map_err(|e| format_oracle_connect_error(&e, host, port))?;

        let current_user: String = conn
            .query_row_as("SELECT user FROM dual", &[])
            .map_err(format_oracle_error)?;

        log::info!("Connected to {}:{} as {}", host, port, current_user);

        Ok(Box::new(OracleAdapter {
            conn: Mutex::new(conn),
            current_user,
            database: params.database_name(),
            cache: SnapshotCache::new(self.schema_cache_ttl),
        }))
    }
}

pub struct OracleAdapter {
    conn: Mutex<OracleConnection>,
    /// The connected user's schema; introspection is restricted to it.
    current_user: String,
    database: String,
    cache: SnapshotCache,
}

impl DatabaseAdapter for OracleAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Oracle
    }

    fn test_connection(&self) -> Result<ConnectionInfo, DbError> {
        let conn = self.lock_conn();

        let (version, banner) = conn.server_version().map_err(format_oracle_error)?;
        let _ = banner;

        Ok(ConnectionInfo {
            database: self.database.clone(),
            user: self.current_user.clone(),
            version: format!("Oracle {}", version),
            database_type: DatabaseKind::Oracle,
        })
    }

    fn list_schemas(&self) -> Result<Vec<SchemaOverview>, DbError> {
        let conn = self.lock_conn();

        // Only the connected user's schema is visible here; enumerating
        // every account on the instance is noise for query generation.
        let table_count: i64 = conn
            .query_row_as("SELECT COUNT(*) FROM user_tables", &[])
            .map_err(format_oracle_error)?;

        let view_count: i64 = conn
            .query_row_as("SELECT COUNT(*) FROM user_views", &[])
            .map_err(format_oracle_error)?;

        Ok(vec![SchemaOverview {
            schema_name: self.current_user.clone(),
            table_count: table_count as usize,
            view_count: view_count as usize,
        }])
    }

    fn schema_snapshot(&self, schema: &str) -> Result<SchemaSnapshot, DbError> {
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
        fetch_table(&conn, &self.current_user, table, true)
    }

    fn execute(&self, sql: &str) -> Result<QueryOutput, DbError> {
        let start = Instant::now();
        let conn = self.lock_conn();

        // Oracle rejects trailing semicolons in single statements.
        let sql = sql.trim().trim_end_matches(';');

        log::debug!("[QUERY] Executing: {}", preview(sql));

        if sqlsage_core::is_select_like(sql) {
            let rows = conn.query(sql, &[]).map_err(format_oracle_error)?;

            let columns: Vec<String> = rows
                .column_info()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            let column_types: Vec<OracleType> = rows
                .column_info()
                .iter()
                .map(|c| c.oracle_type().clone())
                .collect();

            let mut values: Vec<Vec<Value>> = Vec::new();
            for row_result in rows {
                let row = row_result.map_err(format_oracle_error)?;
                values.push(
                    column_types
                        .iter()
                        .enumerate()
                        .map(|(i, ty)| oracle_value_to_value(&row, i, ty))
                        .collect(),
                );
            }

            let elapsed = start.elapsed();
            log::debug!(
                "[QUERY] Completed in {:.2}ms, {} rows",
                elapsed.as_secs_f64() * 1000.0,
                values.len()
            );

            Ok(QueryOutput::from_rows(columns, values, elapsed))
        } else {
            conn.execute(sql, &[]).map_err(format_oracle_error)?;
            conn.commit().map_err(format_oracle_error)?;
            let elapsed = start.elapsed();
            log::debug!(
                "[QUERY] Statement committed in {:.2}ms",
                elapsed.as_secs_f64() * 1000.0
            );
            Ok(QueryOutput::empty(elapsed))
        }
    }

    fn invalidate_cache(&self) {
        self.cache.clear();
    }

    fn close(&self) {
        log::debug!("[POOL] Oracle adapter for {} released", self.current_user);
    }
}

impl OracleAdapter {
    fn lock_conn(&self) -> std::sync::MutexGuard<'_, OracleConnection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    fn introspect(&self) -> Result<SchemaSnapshot, DbError> {
        let start = Instant::now();
        let conn = self.lock_conn();

        let mut snapshot = SchemaSnapshot::new(self.database.clone(), DatabaseKind::Oracle);

        let table_names: Vec<String> = {
            let rows = conn
                .query_as::<String>("SELECT table_name FROM user_tables ORDER BY table_name", &[])
                .map_err(format_oracle_error)?;
            rows.filter_map(|r| r.ok()).collect()
        };

        for name in table_names {
            snapshot.insert_table(fetch_table(&conn, &self.current_user, &name, true)?);
        }

        let views: Vec<String> = {
            let rows = conn
                .query_as::<String>("SELECT view_name FROM user_views ORDER BY view_name", &[])
                .map_err(format_oracle_error)?;
            rows.filter_map(|r| r.ok()).collect()
        };

        for view in views {
            snapshot.views.push(ViewDescriptor {
                schema_name: self.current_user.clone(),
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
    conn: &OracleConnection,
    schema: &str,
    table: &str,
    with_samples: bool,
) -> Result<TableDescriptor, DbError> {
    let mut descriptor = TableDescriptor::new(schema, table);

    let primary: Vec<String> = constraint_columns(conn, table, "P")?;
    let unique: Vec<String> = constraint_columns(conn, table, "U")?;

    let column_rows = conn
        .query_as::<(String, String, String, Option<String>)>(
            "SELECT column_name, data_type, nullable, data_default \
             FROM user_tab_columns WHERE table_name = :1 ORDER BY column_id",
            &[&table],
        )
        .map_err(format_oracle_error)?;

    for row in column_rows {
        let (name, data_type, nullable, default_value) = row.map_err(format_oracle_error)?;
        descriptor.columns.push(ColumnDescriptor {
            primary_key: primary.contains(&name),
            unique: primary.contains(&name) || unique.contains(&name),
            name,
            data_type,
            nullable: nullable == "Y",
            default_value: default_value.map(|d| d.trim().to_string()),
        });
    }

    let fk_rows = conn
        .query_as::<(String, String, String, String)>(
            "SELECT a.column_name, c_pk.table_name, b.column_name, c.delete_rule \
             FROM user_cons_columns a \
             JOIN user_constraints c ON a.constraint_name = c.constraint_name \
             JOIN user_constraints c_pk ON c.r_constraint_name = c_pk.constraint_name \
             JOIN user_cons_columns b \
               ON c_pk.constraint_name = b.constraint_name AND b.position = a.position \
             WHERE c.constraint_type = 'R' AND a.table_name = :1",
            &[&table],
        )
        .map_err(format_oracle_error)?;

    for row in fk_rows {
        let (column, ref_table, ref_column, delete_rule) = row.map_err(format_oracle_error)?;
        descriptor.foreign_keys.push(ForeignKey {
            column,
            references_table: format!("{}.{}", schema, ref_table),
            references_column: ref_column,
            on_delete: if delete_rule == "NO ACTION" {
                None
            } else {
                Some(delete_rule)
            },
        });
    }

    if with_samples {
        descriptor.sample_rows = fetch_sample_rows(conn, table);
    }

    Ok(descriptor)
}

fn constraint_columns(
    conn: &OracleConnection,
    table: &str,
    constraint_type: &str,
) -> Result<Vec<String>, DbError> {
    let rows = conn
        .query_as::<String>(
            "SELECT cols.column_name \
             FROM user_constraints cons \
             JOIN user_cons_columns cols ON cons.constraint_name = cols.constraint_name \
             WHERE cons.constraint_type = :1 AND cons.table_name = :2",
            &[&constraint_type, &table],
        )
        .map_err(format_oracle_error)?;

    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn fetch_sample_rows(conn: &OracleConnection, table: &str) -> Vec<serde_json::Value> {
    let sql = format!(
        "SELECT * FROM {} WHERE ROWNUM <= {}",
        quote_ident(table),
        MAX_SAMPLE_ROWS
    );

    let rows = match conn.query(&sql, &[]) {
        Ok(rows) => rows,
        Err(e) => {
            log::warn!("[SCHEMA] Sample rows failed for {}: {}", table, e);
            return Vec::new();
        }
    };

    let columns: Vec<String> = rows
        .column_info()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let column_types: Vec<OracleType> = rows
        .column_info()
        .iter()
        .map(|c| c.oracle_type().clone())
        .collect();

    rows.filter_map(|r| r.ok())
        .map(|row| {
            let map: serde_json::Map<String, serde_json::Value> = columns
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    (
                        name.clone(),
                        oracle_value_to_value(&row, i, &column_types[i]).into_json(),
                    )
                })
                .collect();
            serde_json::Value::Object(map)
        })
        .collect()
}

fn oracle_value_to_value(row: &oracle::Row, idx: usize, ty: &OracleType) -> Value {
    match ty {
        OracleType::Number(_, scale) if *scale == 0 => row
            .get::<usize, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),
        OracleType::Number(..) | OracleType::Float(..) => row
            .get::<usize, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),
        OracleType::BinaryFloat | OracleType::BinaryDouble => row
            .get::<usize, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),
        OracleType::Date
        | OracleType::Timestamp(_)
        | OracleType::TimestampTZ(_)
        | OracleType::TimestampLTZ(_) => row
            .get::<usize, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|dt| Value::DateTime(dt.and_utc()))
            .unwrap_or(Value::Null),
        OracleType::Raw(_) | OracleType::BLOB | OracleType::LongRaw => row
            .get::<usize, Option<Vec<u8>>>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => row
            .get::<usize, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::Text)
            .unwrap_or(Value::Null),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn preview(sql: &str) -> String {
    let flattened = sql.replace('\n', " ");
    sqlsage_core::truncate_string_safe(&flattened, 80)
}

fn format_oracle_error(e: oracle::Error) -> DbError {
    let formatted = match e.db_error() {
        Some(db_error) => FormattedError::new(db_error.message())
            .with_code(format!("ORA-{:05}", db_error.code())),
        None => FormattedError::new(e.to_string()),
    };

    log::error!("Oracle query failed: {}", formatted);
    DbError::QueryFailed(formatted)
}

fn format_oracle_connect_error(e: &oracle::Error, host: &str, port: u16) -> DbError {
    let source = e.to_string();

    let message = if source.contains("ORA-01017") {
        "Authentication failed. Check your username and password.".to_string()
    } else if source.contains("ORA-12514") || source.contains("ORA-12505") {
        format!(
            "Listener at {}:{} does not know the requested service or SID: {}",
            host, port, source
        )
    } else if source.contains("Connection refused") || source.contains("ORA-12541") {
        format!(
            "Connection refused at {}:{}. Verify the Oracle listener is running.",
            host, port
        )
    } else {
        format!("Connection error: {}", source)
    };

    log::error!("Oracle connection failed: {}", message);
    DbError::connection_failed(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_rejects_foreign_params() {
        let factory = OracleAdapterFactory::new(Duration::from_secs(3600));
        let params = ConnectionParams::Sqlite {
            file_path: ":memory:".into(),
        };
        assert!(matches!(
            factory.create(&params),
            Err(DbError::InvalidParams(_))
        ));
    }
}
