use serde::{Deserialize, Deserializer, Serialize};

use crate::DbError;

/// Supported database dialects.
///
/// The dialect drives SQL syntax rules handed to the LLM, metadata
/// queries used for introspection, and row-limiting forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[serde(rename = "postgresql")]
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
    Oracle,
    Sqlite,
}

// Deserialization goes through the alias-aware factory, so stored
// queries and configuration accept `pg`, `mariadb`, `sqlite3`, etc.
impl<'de> Deserialize<'de> for DatabaseKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        parse_database_kind(&name).map_err(serde::de::Error::custom)
    }
}

impl DatabaseKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "PostgreSQL",
            DatabaseKind::MySql => "MySQL",
            DatabaseKind::Oracle => "Oracle",
            DatabaseKind::Sqlite => "SQLite",
        }
    }

    /// Canonical identifier, as used in configuration and stored queries.
    pub fn id(&self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "postgresql",
            DatabaseKind::MySql => "mysql",
            DatabaseKind::Oracle => "oracle",
            DatabaseKind::Sqlite => "sqlite",
        }
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            DatabaseKind::Postgres => Some(5432),
            DatabaseKind::MySql => Some(3306),
            DatabaseKind::Oracle => Some(1521),
            DatabaseKind::Sqlite => None,
        }
    }

    /// Clause that limits a SELECT to `n` rows in this dialect.
    pub fn row_limit_clause(&self, n: u32) -> String {
        match self {
            DatabaseKind::Oracle => format!("WHERE ROWNUM <= {}", n),
            _ => format!("LIMIT {}", n),
        }
    }

    /// System schemas excluded from `list_schemas`.
    pub fn system_schemas(&self) -> &'static [&'static str] {
        match self {
            DatabaseKind::Postgres => &["pg_catalog", "information_schema", "pg_toast"],
            DatabaseKind::MySql => &[
                "information_schema",
                "mysql",
                "performance_schema",
                "sys",
            ],
            DatabaseKind::Oracle | DatabaseKind::Sqlite => &[],
        }
    }

    /// Dialect rule sheet interpolated into the LLM system prompt.
    pub fn rule_sheet(&self) -> &'static str {
        match self {
            DatabaseKind::Oracle => {
                "ORACLE-SPECIFIC INSTRUCTIONS:\n\
                 1. Use DUAL for testing queries (e.g., SELECT 1 FROM DUAL)\n\
                 2. Use ROWNUM instead of LIMIT (e.g., WHERE ROWNUM <= 100)\n\
                 3. String concatenation uses || operator\n\
                 4. Date format: TO_DATE('2024-01-01', 'YYYY-MM-DD')\n\
                 5. Use SYSDATE for current timestamp\n\
                 6. Table metadata lives in user_tables and user_tab_columns"
            }
            DatabaseKind::MySql => {
                "MYSQL-SPECIFIC INSTRUCTIONS:\n\
                 1. Use LIMIT for row limiting (e.g., LIMIT 100)\n\
                 2. String concatenation uses CONCAT() function\n\
                 3. Date format: STR_TO_DATE('2024-01-01', '%Y-%m-%d')\n\
                 4. Use NOW() for current timestamp\n\
                 5. Use backticks ` for identifiers with special characters"
            }
            DatabaseKind::Sqlite => {
                "SQLITE-SPECIFIC INSTRUCTIONS:\n\
                 1. Use LIMIT for row limiting (e.g., LIMIT 100)\n\
                 2. String concatenation uses || operator\n\
                 3. Date/time functions: datetime('now'), date('now')\n\
                 4. SQLite uses dynamic typing (type affinity)\n\
                 5. No RIGHT JOIN or FULL OUTER JOIN support"
            }
            DatabaseKind::Postgres => {
                "POSTGRESQL-SPECIFIC INSTRUCTIONS:\n\
                 1. Use LIMIT for row limiting (e.g., LIMIT 100)\n\
                 2. String concatenation uses || or CONCAT()\n\
                 3. Use NOW() or CURRENT_TIMESTAMP for the current time\n\
                 4. Cast with column::TYPE or CAST(column AS TYPE)\n\
                 5. Arrays and JSON/JSONB types are supported"
            }
        }
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Resolve a user-supplied dialect name, accepting common aliases.
///
/// `postgres`/`pg` map to PostgreSQL, `mariadb` to MySQL, `sqlite3` to
/// SQLite. Unknown names yield `DbError::UnsupportedDatabase`.
pub fn parse_database_kind(name: &str) -> Result<DatabaseKind, DbError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "postgresql" | "postgres" | "pg" => Ok(DatabaseKind::Postgres),
        "mysql" | "mariadb" => Ok(DatabaseKind::MySql),
        "oracle" => Ok(DatabaseKind::Oracle),
        "sqlite" | "sqlite3" => Ok(DatabaseKind::Sqlite),
        other => Err(DbError::UnsupportedDatabase(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_to_variants() {
        assert_eq!(parse_database_kind("pg").unwrap(), DatabaseKind::Postgres);
        assert_eq!(
            parse_database_kind("Postgres").unwrap(),
            DatabaseKind::Postgres
        );
        assert_eq!(parse_database_kind("mariadb").unwrap(), DatabaseKind::MySql);
        assert_eq!(
            parse_database_kind("sqlite3").unwrap(),
            DatabaseKind::Sqlite
        );
        assert_eq!(parse_database_kind("oracle").unwrap(), DatabaseKind::Oracle);
    }

    #[test]
    fn unknown_dialect_is_a_distinct_error() {
        let err = parse_database_kind("mssql").unwrap_err();
        assert!(matches!(err, DbError::UnsupportedDatabase(_)));
    }

    #[test]
    fn oracle_limits_rows_with_rownum() {
        assert_eq!(
            DatabaseKind::Oracle.row_limit_clause(5),
            "WHERE ROWNUM <= 5"
        );
        assert_eq!(DatabaseKind::Postgres.row_limit_clause(5), "LIMIT 5");
    }

    #[test]
    fn serde_writes_canonical_ids_and_reads_aliases() {
        let json = serde_json::to_string(&DatabaseKind::Postgres).unwrap();
        assert_eq!(json, "\"postgresql\"");

        let back: DatabaseKind = serde_json::from_str("\"sqlite3\"").unwrap();
        assert_eq!(back, DatabaseKind::Sqlite);
        let back: DatabaseKind = serde_json::from_str("\"pg\"").unwrap();
        assert_eq!(back, DatabaseKind::Postgres);

        assert!(serde_json::from_str::<DatabaseKind>("\"mssql\"").is_err());
    }
}
