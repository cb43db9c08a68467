use serde::{Deserialize, Serialize};
use sqlsage_agent::AgentOutcome;
use sqlsage_core::DbError;
use sqlsage_llm::ChatMessage;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
}

impl From<ConversationTurn> for ChatMessage {
    fn from(turn: ConversationTurn) -> Self {
        ChatMessage {
            role: turn.role,
            content: turn.content,
        }
    }
}

/// One natural-language query request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
    /// Falls back to `general.max_retry_attempts` when absent.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Restrict generation to one schema; generated SQL must qualify
    /// table names with it.
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            conversation_history: Vec::new(),
            max_retries: None,
            schema_name: None,
            session_id: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_name = Some(schema.into());
        self
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Successful query response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub question: String,
    pub sql_query: String,
    pub results: Vec<serde_json::Map<String, serde_json::Value>>,
    pub columns: Vec<String>,
    pub row_count: usize,
    /// Seconds.
    pub execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub retry_count: u32,
    pub errors_encountered: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
}

impl QueryResponse {
    pub fn from_outcome(question: String, outcome: AgentOutcome, session_id: Option<Uuid>) -> Self {
        Self {
            question,
            sql_query: outcome.sql_query,
            row_count: outcome.results.len(),
            results: outcome.results,
            columns: outcome.columns,
            execution_time: outcome.execution_time.as_secs_f64(),
            explanation: outcome.explanation,
            retry_count: outcome.retry_count,
            errors_encountered: outcome.errors_encountered,
            session_id,
        }
    }
}

/// Failure envelope for one request.
///
/// Mapping onto transport status codes (400 for exhaustion and adapter
/// failures, 504 for timeouts) belongs to the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum QueryFailure {
    /// Retry budget spent without a successful execution.
    #[error("query failed after {retry_count} attempts")]
    Exhausted {
        sql_query: String,
        retry_count: u32,
        errors: Vec<String>,
    },

    /// The per-query deadline elapsed.
    #[error("query timed out after {elapsed_secs:.0}s")]
    Timeout { elapsed_secs: f64 },

    /// The adapter failed before the agent ran (connect, snapshot).
    #[error("adapter error: {0}")]
    Adapter(#[from] DbError),

    /// Configuration problem observed by this request.
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_apply_on_deserialize() {
        let request: QueryRequest =
            serde_json::from_str(r#"{"question": "how many users?"}"#).unwrap();
        assert!(request.max_retries.is_none());
        assert!(request.conversation_history.is_empty());
        assert!(request.session_id.is_none());
    }

    #[test]
    fn response_serializes_execution_time_as_seconds() {
        let outcome = AgentOutcome {
            success: true,
            sql_query: "SELECT 1".to_string(),
            results: Vec::new(),
            columns: Vec::new(),
            execution_time: std::time::Duration::from_millis(250),
            explanation: None,
            retry_count: 0,
            errors_encountered: Vec::new(),
            cancelled: false,
        };

        let response = QueryResponse::from_outcome("q".to_string(), outcome, None);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["execution_time"], serde_json::json!(0.25));
        assert_eq!(json["row_count"], serde_json::json!(0));
        assert!(json.get("explanation").is_none());
    }
}
