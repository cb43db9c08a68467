use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use sqlsage_core::{
    AdapterRegistry, AppConfig, ConnectionParams, DbError, PoolConfig, PoolManager,
    SessionRegistry,
};
use sqlsage_driver_mysql::MySqlAdapterFactory;
use sqlsage_driver_oracle::OracleAdapterFactory;
use sqlsage_driver_postgres::PostgresAdapterFactory;
use sqlsage_driver_sqlite::SqliteAdapterFactory;
use sqlsage_hints::{
    export_artifacts, ExportFormat, InMemoryQueryStore, OntologyGenerator, QueryMemory,
    SemanticHintsProvider,
};
use sqlsage_llm::LlmService;

use crate::orchestrator::{OrchestratorSettings, QueryOrchestrator};
use crate::sweeper::Sweeper;

/// Process-scoped application state.
///
/// Built once at startup; the registries live for the process and the
/// LLM binding swaps atomically on config reload. Everything is exposed
/// through this struct rather than module-level globals.
pub struct AppContext {
    config: RwLock<AppConfig>,
    pools: Arc<PoolManager>,
    sessions: Arc<SessionRegistry>,
    llm: Arc<LlmService>,
    hints: Arc<SemanticHintsProvider>,
    sweeper: Option<Sweeper>,
}

impl AppContext {
    /// Wire drivers, registries, and bindings from a configuration.
    pub fn new(config: AppConfig) -> Result<Self, DbError> {
        let ttl = config.cache.schema_cache_ttl();

        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(PostgresAdapterFactory::new(ttl)));
        registry.register(Arc::new(MySqlAdapterFactory::new(ttl)));
        registry.register(Arc::new(OracleAdapterFactory::new(ttl)));
        registry.register(Arc::new(SqliteAdapterFactory::new(ttl)));

        let pool_config = PoolConfig {
            idle_timeout: config.general.pool_idle_timeout(),
            ..PoolConfig::default()
        };

        let pools = Arc::new(PoolManager::new(registry, pool_config));
        let sessions = Arc::new(SessionRegistry::new(config.general.session_idle_timeout()));

        let llm = Arc::new(
            LlmService::from_config(&config.llm)
                .map_err(|e| DbError::ConfigInvalid(e.to_string()))?,
        );

        let memory: Option<Arc<dyn QueryMemory>> = if config.rag.enabled {
            Some(Arc::new(InMemoryQueryStore::new()))
        } else {
            None
        };

        // The Neo4j wire protocol lives behind the GraphStore seam; with
        // no external store plugged in, an enabled graph stream serves
        // insights from the in-process schema graph.
        let mut hints_provider =
            SemanticHintsProvider::new(None, None, memory, config.rag.clone());
        if config.neo4j.enabled && config.neo4j.include_in_context {
            hints_provider = hints_provider.with_graph_fallback();
        }
        let hints = Arc::new(hints_provider);

        let mut context = Self {
            config: RwLock::new(config),
            pools: pools.clone(),
            sessions: sessions.clone(),
            llm,
            hints,
            sweeper: None,
        };
        context.sweeper = Some(Sweeper::start(pools, sessions));

        Ok(context)
    }

    pub fn pools(&self) -> &Arc<PoolManager> {
        &self.pools
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn hints(&self) -> &Arc<SemanticHintsProvider> {
        &self.hints
    }

    /// Build an orchestrator reflecting the current configuration.
    pub fn orchestrator(&self) -> QueryOrchestrator {
        let config = self.read_config();

        QueryOrchestrator::new(
            self.llm.clone(),
            self.pools.clone(),
            self.sessions.clone(),
            self.hints.clone(),
            OrchestratorSettings {
                query_timeout: config.general.query_timeout(),
                max_tokens: config.llm.max_tokens,
                context_strategy: config.llm.context_strategy.clone(),
                schema_cache_ttl: config.cache.schema_cache_ttl(),
                default_max_retries: config.general.max_retry_attempts,
            },
        )
    }

    /// Run dynamic ontology generation for one connection.
    ///
    /// Introspects the database, extracts concepts through the LLM in
    /// batches, installs the registry into the hints provider, and
    /// writes the configured artifacts. Returns the artifact paths.
    pub fn generate_ontology(
        &self,
        params: &ConnectionParams,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, DbError> {
        let config = self.read_config();
        if !config.ontology.dynamic_generation.enabled {
            return Err(DbError::ConfigInvalid(
                "ontology.dynamic_generation.enabled is false".to_string(),
            ));
        }

        let adapter = self.pools.acquire(params)?;
        let snapshot = adapter.database_snapshot()?;
        drop(adapter);

        let generator = OntologyGenerator::new(self.llm.as_ref());
        let registry = generator
            .generate(&snapshot)
            .map_err(|e| DbError::ConfigInvalid(format!("ontology generation failed: {}", e)))?;

        let registry = Arc::new(registry);
        self.hints.set_ontology(registry.clone());

        let connection_id = sqlsage_core::pool_key(params);
        let format = ExportFormat::parse(&config.ontology.dynamic_generation.export_format);

        export_artifacts(
            &registry,
            output_dir,
            &connection_id,
            format,
            sqlsage_core::chrono::Utc::now(),
        )
        .map_err(DbError::IoError)
    }

    /// Apply a new configuration.
    ///
    /// The LLM binding is replaced atomically; registries keep their
    /// identities so live sessions and pools survive the reload.
    pub fn reload(&self, config: AppConfig) -> Result<(), DbError> {
        self.llm
            .reload(&config.llm)
            .map_err(|e| DbError::ConfigInvalid(e.to_string()))?;

        let mut slot = match self.config.write() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };
        *slot = config;

        log::info!("Configuration reloaded");
        Ok(())
    }

    pub fn read_config(&self) -> AppConfig {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// Stop background work and close every pool.
    pub fn shutdown(&mut self) {
        if let Some(mut sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        self.pools.close_all();
        log::info!("Application context shut down");
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
