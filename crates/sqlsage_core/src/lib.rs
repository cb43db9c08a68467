#![allow(clippy::result_large_err)]

mod adapter;
mod analysis;
mod cache;
mod config;
mod error;
mod kind;
mod params;
mod pool;
mod query;
mod query_safety;
mod schema;
pub mod schema_service;
mod session;
mod task;
mod value;

pub use adapter::{
    AdapterFactory, AdapterRegistry, ConnectionInfo, DatabaseAdapter, SchemaOverview,
};
pub use analysis::{ErrorAnalysis, ErrorKind};
pub use cache::SnapshotCache;
pub use config::{
    AppConfig, AppConfigStore, CacheConfig, DynamicOntologyConfig, GeneralConfig, LlmConfig,
    Neo4jConfig, OntologyConfig, RagConfig,
};
pub use error::{DbError, FormattedError};
pub use kind::{parse_database_kind, DatabaseKind};
pub use params::{ConnectionParams, DEFAULT_ORACLE_SERVICE};
pub use pool::{pool_key, ConnectionPool, PoolConfig, PoolManager, PooledAdapter};
pub use query::QueryOutput;
pub use query_safety::{
    dangerous_operation, first_keyword, is_select_like, prose_marker, question_requests,
    starts_with_allowed_keyword, strip_comments, DangerousOperation, ALLOWED_LEADING_KEYWORDS,
};
pub use schema::{
    ColumnDescriptor, ForeignKey, SchemaSnapshot, TableDescriptor, ViewDescriptor,
    MAX_SAMPLE_ROWS,
};
pub use session::{Session, SessionRegistry};
pub use task::CancelToken;
pub use value::Value;

pub use chrono;

/// Safely truncate a string at a character boundary, appending "..." if truncated.
pub fn truncate_string_safe(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let truncate_at = max_len.saturating_sub(3);
    let safe_end = s
        .char_indices()
        .take_while(|(idx, _)| *idx <= truncate_at)
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(0);

    format!("{}...", &s[..safe_end])
}
