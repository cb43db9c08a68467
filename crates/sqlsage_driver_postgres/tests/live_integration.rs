//! Live-server integration tests.
//!
//! Run with `cargo test -- --ignored` against a disposable PostgreSQL,
//! pointing `SQLSAGE_TEST_POSTGRES` at it as
//! `host:port:database:user:password`.

use std::time::Duration;

use sqlsage_core::{AdapterFactory, ConnectionParams, DatabaseKind, DbError};
use sqlsage_driver_postgres::PostgresAdapterFactory;

fn live_params() -> Option<ConnectionParams> {
    let spec = std::env::var("SQLSAGE_TEST_POSTGRES").ok()?;
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 5 {
        panic!("SQLSAGE_TEST_POSTGRES must be host:port:database:user:password");
    }

    Some(ConnectionParams::Postgres {
        host: parts[0].to_string(),
        port: parts[1].parse().expect("port must be numeric"),
        database: parts[2].to_string(),
        username: parts[3].to_string(),
        password: parts[4].to_string(),
    })
}

#[test]
#[ignore = "requires a live PostgreSQL server"]
fn postgres_live_connect_execute_and_introspect() -> Result<(), DbError> {
    let params = live_params().expect("SQLSAGE_TEST_POSTGRES not set");
    let factory = PostgresAdapterFactory::new(Duration::from_secs(3600));
    let adapter = factory.create(&params)?;

    let info = adapter.test_connection()?;
    assert_eq!(info.database_type, DatabaseKind::Postgres);
    assert!(info.version.contains("PostgreSQL"));

    adapter.execute(
        "CREATE TABLE IF NOT EXISTS sage_live_users (
            id SERIAL PRIMARY KEY,
            name TEXT NOT NULL
        )",
    )?;
    adapter.execute("DELETE FROM sage_live_users")?;
    adapter.execute("INSERT INTO sage_live_users (name) VALUES ('ada'), ('grace'), ('edsger')")?;

    let output = adapter.execute("SELECT COUNT(*) AS count FROM sage_live_users")?;
    assert_eq!(output.rows[0]["count"], serde_json::json!(3));

    adapter.invalidate_cache();
    let snapshot = adapter.schema_snapshot("public")?;
    let table = snapshot
        .find_table("sage_live_users")
        .expect("created table should be introspected");
    assert!(table.columns.iter().any(|c| c.name == "name"));
    assert!(table
        .columns
        .iter()
        .any(|c| c.name == "id" && c.primary_key));

    let schemas = adapter.list_schemas()?;
    assert!(schemas.iter().any(|s| s.schema_name == "public"));
    assert!(schemas.iter().all(|s| s.schema_name != "pg_catalog"));

    adapter.execute("DROP TABLE sage_live_users")?;
    Ok(())
}

#[test]
#[ignore = "requires a live PostgreSQL server"]
fn postgres_live_error_carries_native_message() -> Result<(), DbError> {
    let params = live_params().expect("SQLSAGE_TEST_POSTGRES not set");
    let factory = PostgresAdapterFactory::new(Duration::from_secs(3600));
    let adapter = factory.create(&params)?;

    let err = adapter
        .execute("SELECT missing_col FROM pg_database")
        .unwrap_err();
    assert!(err.native_message().contains("does not exist"));
    Ok(())
}
