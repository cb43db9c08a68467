//! Live-server integration tests.
//!
//! Run with `cargo test -- --ignored` against a disposable MySQL,
//! pointing `SQLSAGE_TEST_MYSQL` at it as
//! `host:port:database:user:password`.

use std::time::Duration;

use sqlsage_core::{AdapterFactory, ConnectionParams, DatabaseKind, DbError};
use sqlsage_driver_mysql::MySqlAdapterFactory;

fn live_params() -> Option<ConnectionParams> {
    let spec = std::env::var("SQLSAGE_TEST_MYSQL").ok()?;
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 5 {
        panic!("SQLSAGE_TEST_MYSQL must be host:port:database:user:password");
    }

    Some(ConnectionParams::MySql {
        host: parts[0].to_string(),
        port: parts[1].parse().expect("port must be numeric"),
        database: parts[2].to_string(),
        username: parts[3].to_string(),
        password: parts[4].to_string(),
    })
}

#[test]
#[ignore = "requires a live MySQL server"]
fn mysql_live_connect_execute_and_introspect() -> Result<(), DbError> {
    let params = live_params().expect("SQLSAGE_TEST_MYSQL not set");
    let factory = MySqlAdapterFactory::new(Duration::from_secs(3600));
    let adapter = factory.create(&params)?;

    let info = adapter.test_connection()?;
    assert_eq!(info.database_type, DatabaseKind::MySql);
    assert!(!info.version.is_empty());

    adapter.execute(
        "CREATE TABLE IF NOT EXISTS sage_live_orders (
            id INT AUTO_INCREMENT PRIMARY KEY,
            total DECIMAL(10,2) NOT NULL
        )",
    )?;
    adapter.execute("DELETE FROM sage_live_orders")?;
    adapter.execute("INSERT INTO sage_live_orders (total) VALUES (9.99), (19.99)")?;

    let output = adapter.execute("SELECT COUNT(*) AS count FROM sage_live_orders")?;
    assert_eq!(output.rows[0]["count"], serde_json::json!(2));

    let schemas = adapter.list_schemas()?;
    for system in ["information_schema", "mysql", "performance_schema", "sys"] {
        assert!(schemas.iter().all(|s| s.schema_name != system));
    }

    adapter.invalidate_cache();
    let snapshot = adapter.database_snapshot()?;
    assert!(snapshot.find_table("sage_live_orders").is_some());

    adapter.execute("DROP TABLE sage_live_orders")?;
    Ok(())
}
