use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlsage_agent::{AgentInput, SqlAgent};
use sqlsage_context::ContextBuilder;
use sqlsage_core::{
    CancelToken, ConnectionParams, PoolManager, SchemaSnapshot, SessionRegistry,
};
use sqlsage_hints::SemanticHintsProvider;
use sqlsage_llm::LlmCapability;

use crate::api::{QueryFailure, QueryRequest, QueryResponse};

/// Tunables the orchestrator reads per request.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub query_timeout: Duration,
    pub max_tokens: usize,
    pub context_strategy: String,
    pub schema_cache_ttl: Duration,
    /// Applied when the request does not name its own retry budget.
    pub default_max_retries: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(300),
            max_tokens: 4000,
            context_strategy: "auto".to_string(),
            schema_cache_ttl: Duration::from_secs(3600),
            default_max_retries: 3,
        }
    }
}

/// Runs agent invocations on blocking workers under a hard deadline.
///
/// A blocking adapter call can never stall the async request loop: the
/// agent runs inside `spawn_blocking`, and on timeout the cancel token
/// stops it at its next suspension point while the caller already has
/// its `Timeout` answer. Checked-out pool handles return through their
/// drop guards when the worker finishes.
pub struct QueryOrchestrator {
    llm: Arc<dyn LlmCapability>,
    pools: Arc<PoolManager>,
    sessions: Arc<SessionRegistry>,
    hints: Arc<SemanticHintsProvider>,
    settings: OrchestratorSettings,
}

impl QueryOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmCapability>,
        pools: Arc<PoolManager>,
        sessions: Arc<SessionRegistry>,
        hints: Arc<SemanticHintsProvider>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            llm,
            pools,
            sessions,
            hints,
            settings,
        }
    }

    /// Answer one natural-language question against one database.
    pub async fn run_query(
        &self,
        params: &ConnectionParams,
        request: QueryRequest,
    ) -> Result<QueryResponse, QueryFailure> {
        let started = Instant::now();

        let session = self
            .sessions
            .get_or_create(request.session_id, params);
        let session_id = session.session_id;

        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();

        let llm = self.llm.clone();
        let pools = self.pools.clone();
        let sessions = self.sessions.clone();
        let hints = self.hints.clone();
        let params = params.clone();
        let settings = self.settings.clone();
        let question = request.question.clone();
        let schema_name = request.schema_name.clone();

        let max_retries = request
            .max_retries
            .unwrap_or(self.settings.default_max_retries);

        let input = {
            let mut input = AgentInput::new(request.question.clone(), max_retries);
            if let Some(schema) = &request.schema_name {
                input = input.with_target_schema(schema.clone());
            }
            input.with_history(
                request
                    .conversation_history
                    .into_iter()
                    .map(Into::into)
                    .collect(),
            )
        };

        // Everything that can block, introspection included, runs on
        // the worker so the request loop never stalls and the deadline
        // covers the whole query.
        let worker = tokio::task::spawn_blocking(move || {
            let adapter = pools.acquire(&params)?;

            let snapshot = resolve_snapshot(
                &sessions,
                &*adapter,
                session_id,
                schema_name.as_deref(),
                settings.schema_cache_ttl,
            )?;

            let context = ContextBuilder::new(settings.max_tokens, &settings.context_strategy);
            let connection_id = sqlsage_core::pool_key(&params);

            let agent = SqlAgent::new(
                llm.as_ref(),
                &*adapter,
                hints.as_ref(),
                &context,
                &connection_id,
                schema_name.as_deref(),
            );

            Ok::<_, sqlsage_core::DbError>(agent.run(input, snapshot, &worker_cancel))
            // `adapter` drops here, returning the handle to its pool on
            // every path, including cancellation.
        });

        let outcome = match tokio::time::timeout(self.settings.query_timeout, worker).await {
            Ok(joined) => match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(db_error)) => return Err(QueryFailure::Adapter(db_error)),
                Err(join_error) => {
                    return Err(QueryFailure::Config(format!(
                        "agent worker failed: {}",
                        join_error
                    )));
                }
            },
            Err(_) => {
                cancel.cancel();
                let elapsed = started.elapsed().as_secs_f64();
                log::warn!(
                    "Query timed out after {:.0}s: {}",
                    elapsed,
                    question
                );
                return Err(QueryFailure::Timeout {
                    elapsed_secs: elapsed,
                });
            }
        };

        if outcome.cancelled {
            return Err(QueryFailure::Timeout {
                elapsed_secs: started.elapsed().as_secs_f64(),
            });
        }

        if !outcome.success {
            return Err(QueryFailure::Exhausted {
                sql_query: outcome.sql_query,
                retry_count: outcome.retry_count,
                errors: outcome.errors_encountered,
            });
        }

        Ok(QueryResponse::from_outcome(
            question,
            outcome,
            Some(session_id),
        ))
    }

}

/// Session cache first, then the adapter's own cached introspection.
fn resolve_snapshot(
    sessions: &SessionRegistry,
    adapter: &dyn sqlsage_core::DatabaseAdapter,
    session_id: uuid::Uuid,
    schema_name: Option<&str>,
    ttl: Duration,
) -> Result<SchemaSnapshot, sqlsage_core::DbError> {
    if let Some(cached) = sessions.cached_schema(session_id, ttl) {
        log::debug!("[SCHEMA] Session cache hit for {}", session_id);
        return Ok(cached);
    }

    let snapshot = match schema_name {
        Some(schema) => adapter.schema_snapshot(schema)?,
        None => adapter.database_snapshot()?,
    };

    sessions.cache_schema(session_id, snapshot.clone());
    Ok(snapshot)
}
