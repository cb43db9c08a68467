use std::time::Duration;

use sqlsage_core::SchemaSnapshot;
use sqlsage_hints::Hints;
use sqlsage_llm::ChatMessage;

/// Immutable inputs for one agent run.
#[derive(Debug, Clone)]
pub struct AgentInput {
    pub question: String,
    pub max_retries: u32,
    /// When set, generated SQL must qualify table names with this schema.
    pub target_schema: Option<String>,
    pub history: Vec<ChatMessage>,
}

impl AgentInput {
    pub fn new(question: impl Into<String>, max_retries: u32) -> Self {
        Self {
            question: question.into(),
            max_retries,
            target_schema: None,
            history: Vec::new(),
        }
    }

    pub fn with_target_schema(mut self, schema: impl Into<String>) -> Self {
        self.target_schema = Some(schema.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

/// The single mutable record threaded through the state machine.
///
/// Created per `run()`, destroyed when the outcome is produced; nothing
/// outside the running agent ever sees it.
pub struct AgentState {
    // Inputs, immutable after creation.
    pub question: String,
    pub max_retries: u32,
    pub target_schema: Option<String>,
    pub history: Vec<ChatMessage>,
    pub snapshot: SchemaSnapshot,

    // Progress.
    pub attempt: u32,
    pub sql: Option<String>,
    pub explanation: Option<String>,
    pub last_error: Option<String>,
    pub error_history: Vec<String>,
    pub hints: Option<Hints>,

    // Output.
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub columns: Vec<String>,
    pub execution_time: Duration,
    pub success: bool,
    pub cancelled: bool,
}

impl AgentState {
    pub fn new(input: AgentInput, snapshot: SchemaSnapshot) -> Self {
        Self {
            question: input.question,
            max_retries: input.max_retries,
            target_schema: input.target_schema,
            history: input.history,
            snapshot,
            attempt: 0,
            sql: None,
            explanation: None,
            last_error: None,
            error_history: Vec::new(),
            hints: None,
            rows: Vec::new(),
            columns: Vec::new(),
            execution_time: Duration::ZERO,
            success: false,
            cancelled: false,
        }
    }

    /// Record a failure: becomes `last_error` and joins the history
    /// unless it repeats the most recent entry.
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();

        if self.error_history.last() != Some(&message) {
            self.error_history.push(message.clone());
        }

        self.last_error = Some(message);
        self.success = false;
    }
}

/// Result record produced by `finalize`; the orchestrator maps it onto
/// the response or failure envelope.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub success: bool,
    pub sql_query: String,
    pub results: Vec<serde_json::Map<String, serde_json::Value>>,
    pub columns: Vec<String>,
    pub execution_time: Duration,
    pub explanation: Option<String>,
    pub retry_count: u32,
    pub errors_encountered: Vec<String>,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlsage_core::DatabaseKind;

    #[test]
    fn adjacent_duplicate_errors_collapse() {
        let snapshot = SchemaSnapshot::new("app", DatabaseKind::Postgres);
        let mut state = AgentState::new(AgentInput::new("q", 3), snapshot);

        state.record_error("boom");
        state.record_error("boom");
        state.record_error("other");
        state.record_error("boom");

        assert_eq!(state.error_history, vec!["boom", "other", "boom"]);
        assert_eq!(state.last_error.as_deref(), Some("boom"));
    }
}
