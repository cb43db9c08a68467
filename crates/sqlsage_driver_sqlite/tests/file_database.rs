//! File-backed SQLite behavior not covered by the in-memory unit tests.

use std::time::Duration;

use sqlsage_core::{AdapterFactory, ConnectionParams, DbError};
use sqlsage_driver_sqlite::SqliteAdapterFactory;

#[test]
fn data_persists_across_adapters_on_the_same_file() -> Result<(), DbError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.db");
    let params = ConnectionParams::Sqlite {
        file_path: path.clone(),
    };

    let factory = SqliteAdapterFactory::new(Duration::from_secs(3600));

    {
        let adapter = factory.create(&params)?;
        adapter.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")?;
        adapter.execute("INSERT INTO notes (body) VALUES ('first'), ('second')")?;
    }

    let adapter = factory.create(&params)?;
    let output = adapter.execute("SELECT COUNT(*) AS count FROM notes")?;
    assert_eq!(output.rows[0]["count"], serde_json::json!(2));

    let info = adapter.test_connection()?;
    assert!(info.database.ends_with("app.db"));

    Ok(())
}

#[test]
fn snapshot_database_name_is_the_file_path() -> Result<(), DbError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("named.db");
    let params = ConnectionParams::Sqlite { file_path: path };

    let factory = SqliteAdapterFactory::new(Duration::from_secs(3600));
    let adapter = factory.create(&params)?;
    adapter.execute("CREATE TABLE t (id INTEGER)")?;
    adapter.invalidate_cache();

    let snapshot = adapter.database_snapshot()?;
    assert!(snapshot.database_name.ends_with("named.db"));
    assert!(snapshot.tables.contains_key("main.t"));

    Ok(())
}
