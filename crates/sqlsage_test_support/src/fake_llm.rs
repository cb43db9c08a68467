use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use sqlsage_llm::{ChatMessage, LlmCapability, LlmError, SqlGeneration, SqlGenerationRequest};

/// One scripted reply from the fake LLM.
#[derive(Debug, Clone)]
pub enum FakeLlmReply {
    Sql { sql: String, explanation: Option<String> },
    /// Raw text run through nothing; surfaces as `InvalidSql`.
    Invalid(String),
    /// Sleep, then return the given SQL. For timeout tests.
    Slow { delay: Duration, sql: String },
    Json(serde_json::Value),
}

impl FakeLlmReply {
    pub fn sql(sql: impl Into<String>) -> Self {
        Self::Sql {
            sql: sql.into(),
            explanation: None,
        }
    }

    pub fn sql_with_explanation(sql: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self::Sql {
            sql: sql.into(),
            explanation: Some(explanation.into()),
        }
    }
}

#[derive(Default)]
struct FakeLlmState {
    replies: VecDeque<FakeLlmReply>,
    /// Prompts seen by `generate_sql`, for assertions on context content.
    sql_requests: Vec<SqlGenerationRequest>,
    structured_requests: Vec<Vec<ChatMessage>>,
}

/// Scripted LLM: replies are consumed in order; when the script runs
/// dry the last reply repeats.
#[derive(Default)]
pub struct FakeLlm {
    state: Mutex<FakeLlmState>,
    repeat_last: Option<FakeLlmReply>,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script replies consumed first-to-last.
    pub fn with_replies(replies: Vec<FakeLlmReply>) -> Self {
        let repeat_last = replies.last().cloned();
        Self {
            state: Mutex::new(FakeLlmState {
                replies: replies.into(),
                sql_requests: Vec::new(),
                structured_requests: Vec::new(),
            }),
            repeat_last,
        }
    }

    /// Every call returns the same reply.
    pub fn always(reply: FakeLlmReply) -> Self {
        Self {
            state: Mutex::new(FakeLlmState::default()),
            repeat_last: Some(reply),
        }
    }

    pub fn sql_requests(&self) -> Vec<SqlGenerationRequest> {
        self.lock().sql_requests.clone()
    }

    pub fn call_count(&self) -> usize {
        let state = self.lock();
        state.sql_requests.len() + state.structured_requests.len()
    }

    fn next_reply(&self) -> Option<FakeLlmReply> {
        let mut state = self.lock();
        state
            .replies
            .pop_front()
            .or_else(|| self.repeat_last.clone())
    }

    fn lock(&self) -> MutexGuard<'_, FakeLlmState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }
}

impl LlmCapability for FakeLlm {
    fn generate_sql(&self, req: &SqlGenerationRequest) -> Result<SqlGeneration, LlmError> {
        self.lock().sql_requests.push(req.clone());

        match self.next_reply() {
            Some(FakeLlmReply::Sql { sql, explanation }) => Ok(SqlGeneration { sql, explanation }),
            Some(FakeLlmReply::Invalid(text)) => Err(LlmError::InvalidSql {
                preview: sqlsage_core::truncate_string_safe(&text, 200),
            }),
            Some(FakeLlmReply::Slow { delay, sql }) => {
                std::thread::sleep(delay);
                Ok(SqlGeneration {
                    sql,
                    explanation: None,
                })
            }
            Some(FakeLlmReply::Json(value)) => Err(LlmError::InvalidSql {
                preview: value.to_string(),
            }),
            None => Err(LlmError::NotConfigured("fake llm has no replies".to_string())),
        }
    }

    fn generate_structured(
        &self,
        messages: &[ChatMessage],
        _max_tokens: u32,
    ) -> Result<serde_json::Value, LlmError> {
        self.lock().structured_requests.push(messages.to_vec());

        match self.next_reply() {
            Some(FakeLlmReply::Json(value)) => Ok(value),
            Some(FakeLlmReply::Sql { sql, .. }) => Ok(serde_json::json!({ "sql": sql })),
            Some(FakeLlmReply::Slow { delay, .. }) => {
                std::thread::sleep(delay);
                Ok(serde_json::Value::Null)
            }
            Some(FakeLlmReply::Invalid(text)) => Err(LlmError::InvalidJson {
                preview: sqlsage_core::truncate_string_safe(&text, 200),
            }),
            None => Err(LlmError::NotConfigured("fake llm has no replies".to_string())),
        }
    }
}
