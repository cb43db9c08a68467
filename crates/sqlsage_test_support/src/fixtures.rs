//! Shared schema and result fixtures.

use std::time::Duration;

use sqlsage_core::{
    ColumnDescriptor, ConnectionParams, DatabaseKind, ForeignKey, QueryOutput, SchemaSnapshot,
    TableDescriptor, Value,
};

pub fn column(name: &str, data_type: &str) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable: true,
        default_value: None,
        primary_key: false,
        unique: false,
    }
}

pub fn pk_column(name: &str, data_type: &str) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable: false,
        default_value: None,
        primary_key: true,
        unique: true,
    }
}

/// `public.users(id int, name text)` on PostgreSQL.
pub fn users_snapshot() -> SchemaSnapshot {
    let mut users = TableDescriptor::new("public", "users");
    users.columns = vec![pk_column("id", "integer"), column("name", "text")];
    SchemaSnapshot::from_tables("app", DatabaseKind::Postgres, vec![users])
}

/// `public.orders(id, total, vendor_id)` with an FK to vendors.
pub fn orders_snapshot() -> SchemaSnapshot {
    let mut vendors = TableDescriptor::new("public", "vendors");
    vendors.columns = vec![pk_column("id", "integer"), column("vendor_name", "text")];

    let mut orders = TableDescriptor::new("public", "orders");
    orders.columns = vec![
        pk_column("id", "integer"),
        column("total", "numeric"),
        column("vendor_id", "integer"),
    ];
    orders.foreign_keys = vec![ForeignKey {
        column: "vendor_id".to_string(),
        references_table: "public.vendors".to_string(),
        references_column: "id".to_string(),
        on_delete: None,
    }];

    SchemaSnapshot::from_tables("app", DatabaseKind::Postgres, vec![orders, vendors])
}

/// `web_user(id text)` and `role_permissions(user_id int)`, the classic
/// join-type-mismatch pair.
pub fn mismatch_snapshot() -> SchemaSnapshot {
    let mut web_user = TableDescriptor::new("public", "web_user");
    web_user.columns = vec![
        ColumnDescriptor {
            name: "id".to_string(),
            data_type: "text".to_string(),
            nullable: false,
            default_value: None,
            primary_key: true,
            unique: true,
        },
        column("email", "text"),
    ];

    let mut role_permissions = TableDescriptor::new("public", "role_permissions");
    role_permissions.columns = vec![column("user_id", "integer"), column("role", "text")];

    SchemaSnapshot::from_tables(
        "app",
        DatabaseKind::Postgres,
        vec![web_user, role_permissions],
    )
}

/// An Oracle employees schema.
pub fn employees_snapshot() -> SchemaSnapshot {
    let mut employees = TableDescriptor::new("SCOTT", "EMPLOYEES");
    employees.columns = vec![
        pk_column("EMPLOYEE_ID", "NUMBER"),
        column("FIRST_NAME", "VARCHAR2"),
        column("LAST_NAME", "VARCHAR2"),
        column("SALARY", "NUMBER"),
    ];
    SchemaSnapshot::from_tables("XEPDB1", DatabaseKind::Oracle, vec![employees])
}

/// One-row COUNT(*) result, like three seeded users.
pub fn count_result(count: i64) -> QueryOutput {
    QueryOutput::from_rows(
        vec!["count".to_string()],
        vec![vec![Value::Int(count)]],
        Duration::from_millis(5),
    )
}

pub fn rows_result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryOutput {
    QueryOutput::from_rows(
        columns.iter().map(|c| c.to_string()).collect(),
        rows,
        Duration::from_millis(5),
    )
}

pub fn postgres_params() -> ConnectionParams {
    ConnectionParams::Postgres {
        host: "localhost".to_string(),
        port: 5432,
        database: "app".to_string(),
        username: "postgres".to_string(),
        password: "postgres".to_string(),
    }
}
