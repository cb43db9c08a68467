use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DbError;

/// Application configuration, persisted as JSON under the user config
/// directory. Every field has a default so a missing or partial file is
/// never fatal; reload swaps the derived bindings atomically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub neo4j: Neo4jConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub ontology: OntologyConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: `openai`, `vllm`, or `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    /// Endpoint for self-hosted providers (vLLM, Ollama).
    #[serde(default)]
    pub api_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Context window budget; drives the context strategy.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// `auto`, `concise`, `semi`, `expanded`, or `large`.
    #[serde(default = "default_context_strategy")]
    pub context_strategy: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: String::new(),
            api_key: String::new(),
            api_url: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context_strategy: default_context_strategy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub include_in_context: bool,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    #[serde(default = "default_neo4j_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            include_in_context: true,
            uri: String::new(),
            username: String::new(),
            password: String::new(),
            database: String::new(),
            connect_timeout_secs: default_neo4j_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_collection")]
    pub collection_name: String,
    #[serde(default)]
    pub embedding_model: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            collection_name: default_collection(),
            embedding_model: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OntologyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub dynamic_generation: DynamicOntologyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicOntologyConfig {
    #[serde(default)]
    pub enabled: bool,
    /// `yml`, `owl`, or `both`.
    #[serde(default = "default_export_format")]
    pub export_format: String,
}

impl Default for DynamicOntologyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            export_format: default_export_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_schema_ttl")]
    pub schema_cache_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            schema_cache_ttl_secs: default_schema_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn schema_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_max_retries")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_pool_idle")]
    pub pool_idle_timeout_secs: u64,
    #[serde(default = "default_session_idle")]
    pub session_idle_timeout_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retries(),
            query_timeout_secs: default_query_timeout(),
            pool_idle_timeout_secs: default_pool_idle(),
            session_idle_timeout_secs: default_session_idle(),
        }
    }
}

impl GeneralConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> usize {
    4000
}

fn default_context_strategy() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

fn default_neo4j_timeout() -> u64 {
    5
}

fn default_top_k() -> usize {
    3
}

fn default_similarity_threshold() -> f64 {
    0.7
}

fn default_collection() -> String {
    "query_history".to_string()
}

fn default_export_format() -> String {
    "both".to_string()
}

fn default_schema_ttl() -> u64 {
    3600
}

fn default_max_retries() -> u32 {
    3
}

fn default_query_timeout() -> u64 {
    300
}

fn default_pool_idle() -> u64 {
    30 * 60
}

fn default_session_idle() -> u64 {
    60 * 60
}

/// Loads and saves the config file.
pub struct AppConfigStore {
    path: PathBuf,
}

impl AppConfigStore {
    pub fn new() -> Result<Self, DbError> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            DbError::IoError(std::io::Error::other("Could not find config directory"))
        })?;

        let app_dir = config_dir.join("sqlsage");
        fs::create_dir_all(&app_dir).map_err(DbError::IoError)?;

        Ok(Self {
            path: app_dir.join("config.json"),
        })
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<AppConfig, DbError> {
        if !self.path.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.path).map_err(DbError::IoError)?;
        serde_json::from_str(&content).map_err(|e| DbError::ConfigInvalid(e.to_string()))
    }

    pub fn save(&self, config: &AppConfig) -> Result<(), DbError> {
        let content = serde_json::to_string_pretty(config)
            .map_err(|e| DbError::ConfigInvalid(e.to_string()))?;
        fs::write(&self.path, content).map_err(DbError::IoError)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.general.max_retry_attempts, 3);
        assert_eq!(config.general.query_timeout(), Duration::from_secs(300));
        assert_eq!(
            config.general.pool_idle_timeout(),
            Duration::from_secs(1800)
        );
        assert_eq!(
            config.general.session_idle_timeout(),
            Duration::from_secs(3600)
        );
        assert_eq!(config.cache.schema_cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.rag.top_k, 3);
        assert!((config.rag.similarity_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.neo4j.connect_timeout_secs, 5);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"llm": {"provider": "ollama"}}"#).unwrap();

        let store = AppConfigStore::at_path(path);
        let config = store.load().unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.context_strategy, "auto");
        assert_eq!(config.general.max_retry_attempts, 3);
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = AppConfigStore::at_path(dir.path().join("config.json"));

        let mut config = AppConfig::default();
        config.rag.enabled = true;
        config.llm.max_tokens = 8000;
        store.save(&config).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.rag.enabled);
        assert_eq!(loaded.llm.max_tokens, 8000);
    }

    #[test]
    fn malformed_file_is_config_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        let store = AppConfigStore::at_path(path);
        assert!(matches!(store.load(), Err(DbError::ConfigInvalid(_))));
    }
}
