use std::sync::Mutex;
use std::time::{Duration, Instant};

use mysql::prelude::Queryable;
use mysql::{Conn, Opts, OptsBuilder};
use sqlsage_core::{
    AdapterFactory, ColumnDescriptor, ConnectionInfo, ConnectionParams, DatabaseAdapter,
    DatabaseKind, DbError, ForeignKey, FormattedError, QueryOutput, SchemaOverview,
    SchemaSnapshot, SnapshotCache, TableDescriptor, Value, ViewDescriptor, MAX_SAMPLE_ROWS,
};

const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "mysql", "performance_schema", "sys"];

/// Factory registered for `DatabaseKind::MySql` (MariaDB uses the same
/// wire protocol and adapter).
pub struct MySqlAdapterFactory {
    schema_cache_ttl: Duration,
}

impl MySqlAdapterFactory {
    pub fn new(schema_cache_ttl: Duration) -> Self {
        Self { schema_cache_ttl }
    }
}

impl AdapterFactory for MySqlAdapterFactory {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySql
    }

    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn DatabaseAdapter>, DbError> {
        let (host, port, database, username, password) = match params {
            ConnectionParams::MySql {
                host,
                port,
                database,
                username,
                password,
            } => (host, *port, database, username, password),
            _ => {
                return Err(DbError::InvalidParams(
                    "Expected MySQL parameters".to_string(),
                ));
            }
        };

        log::info!(
            "Connecting to MySQL at {}:{} as {} (database: {})",
            host,
            port,
            username,
            database
        );

        let opts: Opts = OptsBuilder::new()
            .ip_or_hostname(Some(host.clone()))
            .tcp_port(port)
            .user(Some(username.clone()))
            .pass(Some(password.clone()))
            .db_name(Some(database.clone()))
            .into();

        let conn = Conn::new(opts).map_err(|e| format_mysql_connect_error(&e, host, port))?;

        log::info!("Connected to {}:{}", host, port);

        Ok(Box::new(MySqlAdapter {
            conn: Mutex::new(conn),
            database: database.clone(),
            cache: SnapshotCache::new(self.schema_cache_ttl),
        }))
    }
}

pub struct MySqlAdapter {
    conn: Mutex<Conn>,
    database: String,
    cache: SnapshotCache,
}

impl DatabaseAdapter for MySqlAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySql
    }

    fn test_connection(&self) -> Result<ConnectionInfo, DbError> {
        let mut conn = self.lock_conn();

        let row: Option<(Option<String>, String, String)> = conn
            .query_first("SELECT DATABASE(), CURRENT_USER(), VERSION()")
            .map_err(|e| format_mysql_query_error(&e))?;

        let (database, user, version) = row.ok_or_else(|| {
            DbError::query_failed("Server returned no row for connection probe")
        })?;

        Ok(ConnectionInfo {
            database: database.unwrap_or_else(|| self.database.clone()),
            user,
            version,
            database_type: DatabaseKind::MySql,
        })
    }

    fn list_schemas(&self) -> Result<Vec<SchemaOverview>, DbError> {
        let mut conn = self.lock_conn();

        let names: Vec<String> = conn
            .query("SELECT schema_name FROM information_schema.schemata ORDER BY schema_name")
            .map_err(|e| format_mysql_query_error(&e))?;

        let counts: Vec<(String, i64, i64)> = conn
            .query(
                "SELECT table_schema, \
                        CAST(SUM(table_type = 'BASE TABLE') AS SIGNED), \
                        CAST(SUM(table_type = 'VIEW') AS SIGNED) \
                 FROM information_schema.tables \
                 GROUP BY table_schema",
            )
            .map_err(|e| format_mysql_query_error(&e))?;

        let count_map: std::collections::HashMap<String, (i64, i64)> = counts
            .into_iter()
            .map(|(schema, tables, views)| (schema, (tables, views)))
            .collect();

        Ok(names
            .into_iter()
            .filter(|name| !SYSTEM_SCHEMAS.contains(&name.as_str()))
            .map(|name| {
                let (tables, views) = count_map.get(&name).copied().unwrap_or((0, 0));
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
            return Ok(cached);
        }

        // The connected database is the natural scope; other schemas on
        // the server are listed but not introspected wholesale.
        let snapshot = self.introspect_schemas(&[self.database.clone()])?;
        self.cache.store_database(snapshot.clone());
        Ok(snapshot)
    }

    fn table_info(&self, schema: &str, table: &str) -> Result<TableDescriptor, DbError> {
        let mut conn = self.lock_conn();
        fetch_table(&mut conn, schema, table, true)
    }

    fn execute(&self, sql: &str) -> Result<QueryOutput, DbError> {
        let start = Instant::now();
        let mut conn = self.lock_conn();

        log::debug!("[QUERY] Executing: {}", preview(sql));

        if sqlsage_core::is_select_like(sql) {
            let stmt = conn.prep(sql).map_err(|e| format_mysql_query_error(&e))?;

            let columns: Vec<String> = stmt
                .columns()
                .iter()
                .map(|c| c.name_str().to_string())
                .collect();

            let rows: Vec<mysql::Row> = conn
                .exec(&stmt, ())
                .map_err(|e| format_mysql_query_error(&e))?;

            let elapsed = start.elapsed();

            let values: Vec<Vec<Value>> = rows
                .iter()
                .map(|row| {
                    (0..columns.len())
                        .map(|i| mysql_value_to_value(row, i))
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
            conn.query_drop(sql)
                .map_err(|e| format_mysql_query_error(&e))?;
            let affected = conn.affected_rows();
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
        log::debug!("[POOL] MySQL adapter for {} released", self.database);
    }
}

impl MySqlAdapter {
    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Conn> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    fn introspect_schemas(&self, schemas: &[String]) -> Result<SchemaSnapshot, DbError> {
        let start = Instant::now();
        let mut conn = self.lock_conn();
        let mut snapshot = SchemaSnapshot::new(self.database.clone(), DatabaseKind::MySql);

        for schema in schemas {
            let tables: Vec<String> = conn
                .exec(
                    "SELECT table_name FROM information_schema.tables \
                     WHERE table_schema = ? AND table_type = 'BASE TABLE' \
                     ORDER BY table_name",
                    (schema,),
                )
                .map_err(|e| format_mysql_query_error(&e))?;

            for table in tables {
                let descriptor = fetch_table(&mut conn, schema, &table, true)?;
                snapshot.insert_table(descriptor);
            }

            let views: Vec<String> = conn
                .exec(
                    "SELECT table_name FROM information_schema.views \
                     WHERE table_schema = ? ORDER BY table_name",
                    (schema,),
                )
                .map_err(|e| format_mysql_query_error(&e))?;

            for view in views {
                snapshot.views.push(ViewDescriptor {
                    schema_name: schema.clone(),
                    view_name: view,
                });
            }
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
    conn: &mut Conn,
    schema: &str,
    table: &str,
    with_samples: bool,
) -> Result<TableDescriptor, DbError> {
    let mut descriptor = TableDescriptor::new(schema, table);

    let columns: Vec<(String, String, String, Option<String>, String)> = conn
        .exec(
            "SELECT column_name, data_type, is_nullable, column_default, column_key \
             FROM information_schema.columns \
             WHERE table_schema = ? AND table_name = ? \
             ORDER BY ordinal_position",
            (schema, table),
        )
        .map_err(|e| format_mysql_query_error(&e))?;

    for (name, data_type, nullable, default_value, key) in columns {
        descriptor.columns.push(ColumnDescriptor {
            name,
            data_type,
            nullable: nullable == "YES",
            default_value,
            primary_key: key == "PRI",
            unique: key == "PRI" || key == "UNI",
        });
    }

    let fks: Vec<(String, String, String, String, Option<String>)> = conn
        .exec(
            "SELECT kcu.column_name, kcu.referenced_table_schema, \
                    kcu.referenced_table_name, kcu.referenced_column_name, rc.delete_rule \
             FROM information_schema.key_column_usage kcu \
             JOIN information_schema.referential_constraints rc \
               ON rc.constraint_name = kcu.constraint_name \
              AND rc.constraint_schema = kcu.table_schema \
             WHERE kcu.table_schema = ? AND kcu.table_name = ? \
               AND kcu.referenced_table_name IS NOT NULL",
            (schema, table),
        )
        .map_err(|e| format_mysql_query_error(&e))?;

    for (column, ref_schema, ref_table, ref_column, delete_rule) in fks {
        descriptor.foreign_keys.push(ForeignKey {
            column,
            references_table: format!("{}.{}", ref_schema, ref_table),
            references_column: ref_column,
            on_delete: delete_rule.filter(|rule| rule != "NO ACTION" && rule != "RESTRICT"),
        });
    }

    if with_samples {
        descriptor.sample_rows = fetch_sample_rows(conn, schema, table);
    }

    Ok(descriptor)
}

fn fetch_sample_rows(conn: &mut Conn, schema: &str, table: &str) -> Vec<serde_json::Value> {
    let sql = format!(
        "SELECT * FROM {}.{} LIMIT {}",
        quote_ident(schema),
        quote_ident(table),
        MAX_SAMPLE_ROWS
    );

    let stmt = match conn.prep(&sql) {
        Ok(stmt) => stmt,
        Err(e) => {
            log::warn!("[SCHEMA] Sample rows failed for {}.{}: {}", schema, table, e);
            return Vec::new();
        }
    };

    let columns: Vec<String> = stmt
        .columns()
        .iter()
        .map(|c| c.name_str().to_string())
        .collect();

    let rows: Vec<mysql::Row> = match conn.exec(&stmt, ()) {
        Ok(rows) => rows,
        Err(e) => {
            log::warn!("[SCHEMA] Sample rows failed for {}.{}: {}", schema, table, e);
            return Vec::new();
        }
    };

    rows.iter()
        .map(|row| {
            let map: serde_json::Map<String, serde_json::Value> = columns
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), mysql_value_to_value(row, i).into_json()))
                .collect();
            serde_json::Value::Object(map)
        })
        .collect()
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn mysql_value_to_value(row: &mysql::Row, idx: usize) -> Value {
    let raw = match row.as_ref(idx) {
        Some(value) => value,
        None => return Value::Null,
    };

    match raw {
        mysql::Value::NULL => Value::Null,
        mysql::Value::Int(i) => Value::Int(*i),
        mysql::Value::UInt(u) => {
            if *u <= i64::MAX as u64 {
                Value::Int(*u as i64)
            } else {
                Value::Text(u.to_string())
            }
        }
        mysql::Value::Float(f) => Value::Float(*f as f64),
        mysql::Value::Double(d) => Value::Float(*d),
        mysql::Value::Bytes(bytes) => match String::from_utf8(bytes.clone()) {
            Ok(s) => Value::Text(s),
            Err(_) => Value::Bytes(bytes.clone()),
        },
        mysql::Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = chrono::NaiveDate::from_ymd_opt(*year as i32, *month as u32, *day as u32);
            let time = chrono::NaiveTime::from_hms_micro_opt(
                *hour as u32,
                *min as u32,
                *sec as u32,
                *micro,
            );

            match (date, time) {
                // Midnight with no fractional part is a plain DATE.
                (Some(d), _) if *hour == 0 && *min == 0 && *sec == 0 && *micro == 0 => {
                    Value::Date(d)
                }
                (Some(d), Some(t)) => Value::DateTime(
                    chrono::DateTime::from_naive_utc_and_offset(d.and_time(t), chrono::Utc),
                ),
                _ => Value::Text(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, min, sec
                )),
            }
        }
        mysql::Value::Time(_neg, _days, hours, mins, secs, micros) => {
            match chrono::NaiveTime::from_hms_micro_opt(
                *hours as u32,
                *mins as u32,
                *secs as u32,
                *micros,
            ) {
                Some(t) => Value::Time(t),
                None => Value::Text(format!("{:02}:{:02}:{:02}", hours, mins, secs)),
            }
        }
    }
}

fn preview(sql: &str) -> String {
    let flattened = sql.replace('\n', " ");
    sqlsage_core::truncate_string_safe(&flattened, 80)
}

fn format_mysql_query_error(e: &mysql::Error) -> DbError {
    let formatted = match e {
        mysql::Error::MySqlError(server_err) => FormattedError::new(server_err.message.clone())
            .with_code(server_err.code.to_string()),
        other => FormattedError::new(other.to_string()),
    };

    log::error!("MySQL query failed: {}", formatted);
    DbError::QueryFailed(formatted)
}

fn format_mysql_connect_error(e: &mysql::Error, host: &str, port: u16) -> DbError {
    let source = e.to_string();

    let message = if source.contains("Access denied") {
        "Authentication failed. Check your username and password.".to_string()
    } else if source.contains("Unknown database") {
        format!("Database does not exist: {}", source)
    } else if source.contains("Connection refused") {
        format!(
            "Connection refused at {}:{}. Verify MySQL is running and accepting connections.",
            host, port
        )
    } else {
        format!("Connection error: {}", source)
    };

    log::error!("MySQL connection failed: {}", message);
    DbError::connection_failed(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_rejects_foreign_params() {
        let factory = MySqlAdapterFactory::new(Duration::from_secs(3600));
        let params = ConnectionParams::Sqlite {
            file_path: ":memory:".into(),
        };
        assert!(matches!(
            factory.create(&params),
            Err(DbError::InvalidParams(_))
        ));
    }

    #[test]
    fn system_schemas_are_the_documented_four() {
        for schema in ["information_schema", "mysql", "performance_schema", "sys"] {
            assert!(SYSTEM_SCHEMAS.contains(&schema));
        }
    }

    #[test]
    fn ident_quoting_uses_backticks() {
        assert_eq!(quote_ident("orders"), "`orders`");
        assert_eq!(quote_ident("odd`name"), "`odd``name`");
    }
}
