//! Orchestrator behavior: timeout enforcement, failure envelopes, and
//! session-bound schema caching.

use std::sync::Arc;
use std::time::Duration;

use sqlsage_core::{
    AdapterRegistry, DatabaseKind, PoolConfig, PoolManager, SessionRegistry,
};
use sqlsage_hints::SemanticHintsProvider;
use sqlsage_llm::LlmCapability;
use sqlsage_server::{OrchestratorSettings, QueryFailure, QueryOrchestrator, QueryRequest};
use sqlsage_test_support::{fixtures, FakeAdapter, FakeAdapterFactory, FakeLlm, FakeLlmReply};

fn orchestrator_with(
    adapter: FakeAdapter,
    llm: Arc<FakeLlm>,
    query_timeout: Duration,
) -> QueryOrchestrator {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(FakeAdapterFactory::new(adapter)));

    let pools = Arc::new(PoolManager::new(registry, PoolConfig::default()));
    let sessions = Arc::new(SessionRegistry::new(Duration::from_secs(3600)));
    let hints = Arc::new(SemanticHintsProvider::disabled());

    QueryOrchestrator::new(
        llm as Arc<dyn LlmCapability>,
        pools,
        sessions,
        hints,
        OrchestratorSettings {
            query_timeout,
            max_tokens: 8000,
            ..OrchestratorSettings::default()
        },
    )
}

#[tokio::test]
async fn happy_path_returns_the_full_response() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres)
        .with_snapshot(fixtures::users_snapshot())
        .with_query_result("SELECT COUNT(*) FROM users;", fixtures::count_result(3));
    let llm = Arc::new(FakeLlm::with_replies(vec![FakeLlmReply::sql(
        "SELECT COUNT(*) FROM users;",
    )]));

    let orchestrator = orchestrator_with(adapter, llm, Duration::from_secs(300));
    let response = orchestrator
        .run_query(
            &fixtures::postgres_params(),
            QueryRequest::new("how many users are there?"),
        )
        .await
        .expect("query should succeed");

    assert_eq!(response.sql_query, "SELECT COUNT(*) FROM users;");
    assert_eq!(response.row_count, 1);
    assert_eq!(response.results[0]["count"], serde_json::json!(3));
    assert_eq!(response.retry_count, 0);
    assert!(response.session_id.is_some());
}

#[tokio::test]
async fn timeout_cancels_and_stops_further_llm_calls() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres)
        .with_snapshot(fixtures::users_snapshot())
        .with_default_result(fixtures::count_result(3));

    // Every LLM call blocks far beyond the deadline.
    let llm = Arc::new(FakeLlm::always(FakeLlmReply::Slow {
        delay: Duration::from_millis(400),
        sql: "SELECT COUNT(*) FROM users;".to_string(),
    }));

    let orchestrator = orchestrator_with(adapter.clone(), llm.clone(), Duration::from_millis(100));
    let result = orchestrator
        .run_query(
            &fixtures::postgres_params(),
            QueryRequest::new("how many users are there?").with_max_retries(5),
        )
        .await;

    assert!(matches!(result, Err(QueryFailure::Timeout { .. })));

    // Let the abandoned worker hit its cancellation checkpoint.
    tokio::time::sleep(Duration::from_millis(600)).await;

    // The in-flight call finished, but the cancelled agent never made
    // another one, and nothing reached the database.
    assert_eq!(llm.call_count(), 1);
    assert!(adapter.stats().executed.is_empty());
}

#[tokio::test]
async fn timeout_releases_the_pool_handle() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres)
        .with_snapshot(fixtures::users_snapshot());
    let llm = Arc::new(FakeLlm::always(FakeLlmReply::Slow {
        delay: Duration::from_millis(300),
        sql: "SELECT 1".to_string(),
    }));

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(FakeAdapterFactory::new(adapter)));
    let pools = Arc::new(PoolManager::new(registry, PoolConfig::default()));
    let sessions = Arc::new(SessionRegistry::new(Duration::from_secs(3600)));

    let orchestrator = QueryOrchestrator::new(
        llm as Arc<dyn LlmCapability>,
        pools.clone(),
        sessions,
        Arc::new(SemanticHintsProvider::disabled()),
        OrchestratorSettings {
            query_timeout: Duration::from_millis(100),
            ..OrchestratorSettings::default()
        },
    );

    let params = fixtures::postgres_params();
    let result = orchestrator
        .run_query(&params, QueryRequest::new("anything"))
        .await;
    assert!(matches!(result, Err(QueryFailure::Timeout { .. })));

    // Once the worker unwinds past its checkpoint, the drop guard has
    // returned the adapter to the pool.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let (open, checked_out) = pools.pool_stats(&params).expect("pool exists");
    assert_eq!(checked_out, 0);
    assert!(open >= 1);
}

#[tokio::test]
async fn exhaustion_surfaces_last_sql_and_error_chain() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres)
        .with_snapshot(fixtures::users_snapshot())
        .with_default_error("column \"nope\" does not exist");
    let llm = Arc::new(FakeLlm::always(FakeLlmReply::sql("SELECT nope FROM users")));

    let orchestrator = orchestrator_with(adapter, llm, Duration::from_secs(300));
    let result = orchestrator
        .run_query(
            &fixtures::postgres_params(),
            QueryRequest::new("how many users?").with_max_retries(2),
        )
        .await;

    match result {
        Err(QueryFailure::Exhausted {
            sql_query,
            retry_count,
            errors,
        }) => {
            assert_eq!(sql_query, "SELECT nope FROM users");
            assert_eq!(retry_count, 3);
            assert!(!errors.is_empty());
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn adapter_failure_before_the_agent_is_surfaced_directly() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres)
        .with_snapshot(fixtures::users_snapshot())
        .with_connect_error("connection refused");
    let llm = Arc::new(FakeLlm::new());

    let orchestrator = orchestrator_with(adapter, llm, Duration::from_secs(300));
    let result = orchestrator
        .run_query(&fixtures::postgres_params(), QueryRequest::new("anything"))
        .await;

    assert!(matches!(result, Err(QueryFailure::Adapter(_))));
}

#[tokio::test]
async fn session_reuse_serves_schema_from_cache() {
    let adapter = FakeAdapter::new(DatabaseKind::Postgres)
        .with_snapshot(fixtures::users_snapshot())
        .with_default_result(fixtures::count_result(3));
    let llm = Arc::new(FakeLlm::always(FakeLlmReply::sql(
        "SELECT COUNT(*) FROM users;",
    )));

    let orchestrator = orchestrator_with(adapter, llm, Duration::from_secs(300));
    let params = fixtures::postgres_params();

    let first = orchestrator
        .run_query(&params, QueryRequest::new("how many users?"))
        .await
        .expect("first query succeeds");
    let session_id = first.session_id.expect("session id assigned");

    let second = orchestrator
        .run_query(
            &params,
            QueryRequest::new("how many users again?").with_session(session_id),
        )
        .await
        .expect("second query succeeds");

    assert_eq!(second.session_id, Some(session_id));
}
