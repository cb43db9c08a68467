use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use sqlsage_core::{DatabaseKind, LlmConfig};
use thiserror::Error;

use crate::provider::LlmClient;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport failure: connect, timeout, TLS.
    #[error("LLM request failed: {0}")]
    Http(String),

    /// Vendor returned a non-success status.
    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Vendor answered, but nothing in the reply parses as SQL.
    #[error("LLM returned invalid SQL: {preview}")]
    InvalidSql { preview: String },

    /// Vendor answered, but nothing in the reply parses as JSON.
    #[error("LLM returned invalid JSON: {preview}")]
    InvalidJson { preview: String },

    /// Provider binding is missing or misconfigured.
    #[error("LLM not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Inputs for one SQL generation round-trip.
#[derive(Debug, Clone)]
pub struct SqlGenerationRequest {
    pub question: String,
    /// Prompt context assembled by the context builder (schema, errors,
    /// hints). Interpolated into the provider's system prompt.
    pub schema_context: String,
    pub history: Vec<ChatMessage>,
    pub database_type: DatabaseKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlGeneration {
    pub sql: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// The single capability the agent depends on.
pub trait LlmCapability: Send + Sync {
    /// Generate SQL for a question. The returned `sql` starts with a
    /// statement keyword; anything else is an `InvalidSql` error.
    fn generate_sql(&self, req: &SqlGenerationRequest) -> Result<SqlGeneration, LlmError>;

    /// Generate an arbitrary JSON value from a chat exchange.
    fn generate_structured(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<serde_json::Value, LlmError>;
}

/// Process-scoped LLM binding with atomic reload.
///
/// Readers take the read lock only long enough to clone the `Arc`, so a
/// reload never observes a half-configured client.
pub struct LlmService {
    client: RwLock<Arc<LlmClient>>,
}

impl LlmService {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: RwLock::new(Arc::new(LlmClient::from_config(config)?)),
        })
    }

    pub fn reload(&self, config: &LlmConfig) -> Result<(), LlmError> {
        let fresh = Arc::new(LlmClient::from_config(config)?);
        let mut slot = match self.client.write() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };
        *slot = fresh;
        log::info!("LLM binding reloaded: provider={}", config.provider);
        Ok(())
    }

    fn current(&self) -> Arc<LlmClient> {
        match self.client.read() {
            Ok(guard) => guard.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }
}

impl LlmCapability for LlmService {
    fn generate_sql(&self, req: &SqlGenerationRequest) -> Result<SqlGeneration, LlmError> {
        self.current().generate_sql(req)
    }

    fn generate_structured(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<serde_json::Value, LlmError> {
        self.current().generate_structured(messages, max_tokens)
    }
}
