use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{DatabaseKind, DbError};

/// Default Oracle service when neither SID nor service name is given.
pub const DEFAULT_ORACLE_SERVICE: &str = "XEPDB1";

/// Typed connection parameters per dialect.
///
/// Network backends share host/port/database/user/password; Oracle
/// addresses the instance by SID or service name; SQLite is a file path
/// (or `:memory:`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "database_type", rename_all = "lowercase")]
pub enum ConnectionParams {
    #[serde(rename = "postgresql")]
    Postgres {
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
    },
    #[serde(rename = "mysql")]
    MySql {
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
    },
    Oracle {
        host: String,
        port: u16,
        username: String,
        password: String,
        #[serde(default)]
        sid: Option<String>,
        #[serde(default)]
        service_name: Option<String>,
    },
    Sqlite {
        /// Database file path, or `:memory:`.
        file_path: PathBuf,
    },
}

impl ConnectionParams {
    pub fn kind(&self) -> DatabaseKind {
        match self {
            ConnectionParams::Postgres { .. } => DatabaseKind::Postgres,
            ConnectionParams::MySql { .. } => DatabaseKind::MySql,
            ConnectionParams::Oracle { .. } => DatabaseKind::Oracle,
            ConnectionParams::Sqlite { .. } => DatabaseKind::Sqlite,
        }
    }

    /// Logical database name: schema-qualified backends report the
    /// configured database, Oracle the SID/service, SQLite the file path.
    pub fn database_name(&self) -> String {
        match self {
            ConnectionParams::Postgres { database, .. }
            | ConnectionParams::MySql { database, .. } => database.clone(),
            ConnectionParams::Oracle {
                sid, service_name, ..
            } => sid
                .clone()
                .or_else(|| service_name.clone())
                .unwrap_or_else(|| DEFAULT_ORACLE_SERVICE.to_string()),
            ConnectionParams::Sqlite { file_path } => file_path.display().to_string(),
        }
    }

    pub fn username(&self) -> &str {
        match self {
            ConnectionParams::Postgres { username, .. }
            | ConnectionParams::MySql { username, .. }
            | ConnectionParams::Oracle { username, .. } => username,
            ConnectionParams::Sqlite { .. } => "",
        }
    }

    /// Connection identity: `host:port:database:user`.
    ///
    /// Two parameter sets with the same identity share pools and may
    /// share sessions; the password is deliberately excluded.
    pub fn identity(&self) -> String {
        match self {
            ConnectionParams::Postgres {
                host,
                port,
                database,
                username,
                ..
            }
            | ConnectionParams::MySql {
                host,
                port,
                database,
                username,
                ..
            } => format!("{}:{}:{}:{}", host, port, database, username),
            ConnectionParams::Oracle {
                host,
                port,
                username,
                ..
            } => format!("{}:{}:{}:{}", host, port, self.database_name(), username),
            ConnectionParams::Sqlite { file_path } => {
                format!("sqlite::{}", file_path.display())
            }
        }
    }

    /// Validate dialect-specific constraints.
    ///
    /// Oracle accepts SID or service name but not both; network backends
    /// need a host and user.
    pub fn validate(&self) -> Result<(), DbError> {
        match self {
            ConnectionParams::Oracle {
                sid, service_name, ..
            } => {
                if sid.is_some() && service_name.is_some() {
                    return Err(DbError::InvalidParams(
                        "Provide either sid or service_name, not both".to_string(),
                    ));
                }
                Ok(())
            }
            ConnectionParams::Postgres { host, username, .. }
            | ConnectionParams::MySql { host, username, .. } => {
                if host.is_empty() {
                    return Err(DbError::InvalidParams("host is required".to_string()));
                }
                if username.is_empty() {
                    return Err(DbError::InvalidParams("username is required".to_string()));
                }
                Ok(())
            }
            ConnectionParams::Sqlite { file_path } => {
                if file_path.as_os_str().is_empty() {
                    return Err(DbError::InvalidParams("file_path is required".to_string()));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postgres_params() -> ConnectionParams {
        ConnectionParams::Postgres {
            host: "localhost".to_string(),
            port: 5432,
            database: "app".to_string(),
            username: "postgres".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn identity_excludes_password() {
        let identity = postgres_params().identity();
        assert_eq!(identity, "localhost:5432:app:postgres");
        assert!(!identity.contains("secret"));
    }

    #[test]
    fn oracle_defaults_to_xepdb1_service() {
        let params = ConnectionParams::Oracle {
            host: "db".to_string(),
            port: 1521,
            username: "scott".to_string(),
            password: "tiger".to_string(),
            sid: None,
            service_name: None,
        };
        assert_eq!(params.database_name(), DEFAULT_ORACLE_SERVICE);
    }

    #[test]
    fn oracle_rejects_sid_and_service_together() {
        let params = ConnectionParams::Oracle {
            host: "db".to_string(),
            port: 1521,
            username: "scott".to_string(),
            password: "tiger".to_string(),
            sid: Some("XE".to_string()),
            service_name: Some("XEPDB1".to_string()),
        };
        assert!(matches!(
            params.validate(),
            Err(DbError::InvalidParams(_))
        ));
    }

    #[test]
    fn params_deserialize_from_tagged_json() {
        let json = r#"{
            "database_type": "postgresql",
            "host": "localhost",
            "port": 5432,
            "database": "app",
            "username": "postgres",
            "password": "pw"
        }"#;
        let params: ConnectionParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.kind(), DatabaseKind::Postgres);
    }
}
