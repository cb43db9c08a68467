use sqlsage_context::ContextBuilder;
use sqlsage_core::{CancelToken, DatabaseAdapter, ErrorAnalysis, SchemaSnapshot};
use sqlsage_hints::SemanticHintsProvider;
use sqlsage_llm::{LlmCapability, SqlGenerationRequest};

use crate::analyzer::ErrorAnalyzer;
use crate::state::{AgentInput, AgentOutcome, AgentState};
use crate::validate::validate_sql;

/// States of the generation machine. `Generate` is initial, `Finalize`
/// terminal; every transition is produced by exactly one phase handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Generate,
    Validate,
    Execute,
    HandleError,
    Finalize,
}

/// Safety margin on top of the expected phase count per attempt.
const STEPS_PER_ATTEMPT: u32 = 10;

/// Drives one question through generate → validate → execute with
/// bounded retries.
///
/// The agent borrows its collaborators; it owns nothing but the
/// `AgentState` it creates per run. Only `generate` and `execute` touch
/// the outside world, and both check the cancel token first.
pub struct SqlAgent<'a> {
    llm: &'a dyn LlmCapability,
    adapter: &'a dyn DatabaseAdapter,
    hints: &'a SemanticHintsProvider,
    context: &'a ContextBuilder,
    connection_id: &'a str,
    schema_name: Option<&'a str>,
}

impl<'a> SqlAgent<'a> {
    pub fn new(
        llm: &'a dyn LlmCapability,
        adapter: &'a dyn DatabaseAdapter,
        hints: &'a SemanticHintsProvider,
        context: &'a ContextBuilder,
        connection_id: &'a str,
        schema_name: Option<&'a str>,
    ) -> Self {
        Self {
            llm,
            adapter,
            hints,
            context,
            connection_id,
            schema_name,
        }
    }

    /// Run the machine to completion.
    ///
    /// Always returns an outcome; adapter and LLM failures are consumed
    /// into the state and drive retries, they never escape.
    pub fn run(
        &self,
        input: AgentInput,
        snapshot: SchemaSnapshot,
        cancel: &CancelToken,
    ) -> AgentOutcome {
        log::info!("Starting SQL agent for question: {}", input.question);

        let step_limit = (input.max_retries + 1) * STEPS_PER_ATTEMPT;
        let mut state = AgentState::new(input, snapshot);
        let mut phase = AgentPhase::Generate;
        let mut steps = 0u32;

        while phase != AgentPhase::Finalize {
            if steps >= step_limit {
                log::warn!(
                    "State machine exceeded its step budget ({}); finalizing",
                    step_limit
                );
                state.record_error("Agent exceeded its internal step budget");
                break;
            }
            steps += 1;

            phase = match phase {
                AgentPhase::Generate => self.generate(&mut state, cancel),
                AgentPhase::Validate => self.validate(&mut state),
                AgentPhase::Execute => self.execute(&mut state, cancel),
                AgentPhase::HandleError => self.handle_error(&mut state),
                AgentPhase::Finalize => AgentPhase::Finalize,
            };
        }

        finalize(state)
    }

    fn generate(&self, state: &mut AgentState, cancel: &CancelToken) -> AgentPhase {
        if cancel.is_cancelled() {
            log::info!("Generation cancelled before LLM call");
            state.cancelled = true;
            return AgentPhase::Finalize;
        }

        log::info!(
            "Generating SQL (attempt {}/{})",
            state.attempt + 1,
            state.max_retries + 1
        );

        let hints = self.hints.gather(
            &state.question,
            &state.snapshot,
            self.connection_id,
            self.schema_name,
        );

        let schema_context = self.build_schema_context(state, &hints);
        state.hints = Some(hints);

        let request = SqlGenerationRequest {
            question: state.question.clone(),
            schema_context,
            history: state.history.clone(),
            database_type: state.snapshot.database_type,
        };

        match self.llm.generate_sql(&request) {
            Ok(generation) => {
                log::info!("Generated SQL: {}", preview(&generation.sql));
                state.sql = Some(generation.sql);
                state.explanation = generation.explanation;
                state.last_error = None;
            }
            Err(e) => {
                log::error!("LLM generation failed: {}", e);
                state.sql = None;
                // Attempt number keeps repeated identical failures
                // distinguishable in the reported history.
                state.record_error(format!(
                    "LLM generation error (attempt {}): {}",
                    state.attempt + 1,
                    e
                ));
            }
        }

        AgentPhase::Validate
    }

    /// Assemble the prompt context: schema section (focused on the
    /// error's tables when retrying), semantic hints, and the error
    /// section for attempts after the first.
    fn build_schema_context(&self, state: &AgentState, hints: &sqlsage_hints::Hints) -> String {
        let analysis: Option<ErrorAnalysis>;
        let mut focused: Vec<String> = Vec::new();

        if state.attempt > 0 {
            if let Some(error) = &state.last_error {
                let analyzer = ErrorAnalyzer::new(&state.snapshot);
                focused = analyzer.mentioned_tables(error);
                analysis = Some(analyzer.analyze(error));
            } else {
                analysis = None;
            }
        } else {
            analysis = None;
        }

        // First attempt: relevance-ranked tables under the strategy cap.
        // Retries: restrict to the tables the error cites.
        let ranked: Vec<String>;
        if focused.is_empty() {
            ranked = sqlsage_core::schema_service::relevant_tables(
                &state.snapshot,
                &state.question,
                self.context.strategy().max_schema_tables(),
            )
            .into_iter()
            .map(|t| t.full_name.clone())
            .collect();
        } else {
            ranked = Vec::new();
        }

        let focus_arg = if !focused.is_empty() {
            Some(focused.as_slice())
        } else if !ranked.is_empty() {
            Some(ranked.as_slice())
        } else {
            None
        };

        let include_samples = state.attempt == 0;
        let schema_section =
            self.context
                .build_schema_context(&state.snapshot, focus_arg, include_samples);

        let mut sections = vec![self.context.build_system_prompt(), schema_section];

        let hint_text = hints.render_for_prompt();
        if !hint_text.is_empty() {
            sections.push(hint_text);
        }

        if let (Some(error), Some(analysis)) = (&state.last_error, analysis.as_ref()) {
            let focused_slice = if focused.is_empty() {
                None
            } else {
                Some(self.context.build_schema_context(
                    &state.snapshot,
                    Some(focused.as_slice()),
                    false,
                ))
            };

            sections.push(self.context.build_error_context(
                error,
                analysis,
                state.sql.as_deref(),
                focused_slice.as_deref(),
            ));
        }

        let history_section = self.context.build_history(&state.history);
        if !history_section.is_empty() {
            sections.push(history_section);
        }

        sections.join("\n\n")
    }

    fn validate(&self, state: &mut AgentState) -> AgentPhase {
        // A failed generation already recorded its error; send it
        // straight to the retry decision instead of validating stale SQL.
        if state
            .last_error
            .as_deref()
            .map(|e| e.starts_with("LLM generation error"))
            .unwrap_or(false)
        {
            log::warn!("Skipping validation after LLM error");
            return AgentPhase::HandleError;
        }

        let sql = state.sql.clone().unwrap_or_default();

        match validate_sql(&sql, &state.question, state.target_schema.as_deref()) {
            Ok(()) => {
                state.last_error = None;
                AgentPhase::Execute
            }
            Err(e) => {
                log::warn!("Validation failed: {}", e.message());
                state.record_error(e.message());

                if e.is_fatal() {
                    AgentPhase::Finalize
                } else {
                    AgentPhase::HandleError
                }
            }
        }
    }

    fn execute(&self, state: &mut AgentState, cancel: &CancelToken) -> AgentPhase {
        if cancel.is_cancelled() {
            log::info!("Execution cancelled before database call");
            state.cancelled = true;
            return AgentPhase::Finalize;
        }

        let sql = match &state.sql {
            Some(sql) => sql.clone(),
            None => {
                state.record_error("No SQL to execute");
                return AgentPhase::HandleError;
            }
        };

        log::info!("Executing SQL");

        match self.adapter.execute(&sql) {
            Ok(output) => {
                log::info!(
                    "Query succeeded: {} rows in {:.3}s",
                    output.row_count(),
                    output.elapsed.as_secs_f64()
                );

                state.columns = output.columns;
                state.rows = output.rows;
                state.execution_time = output.elapsed;
                state.success = true;
                state.last_error = None;

                // Best-effort memory write; never blocks the result.
                self.hints.remember_success(
                    &state.question,
                    &sql,
                    state.snapshot.database_type,
                    self.schema_name,
                );

                AgentPhase::Finalize
            }
            Err(e) => {
                let message = e.native_message();
                log::error!("Query execution failed: {}", message);
                state.record_error(message);
                AgentPhase::HandleError
            }
        }
    }

    fn handle_error(&self, state: &mut AgentState) -> AgentPhase {
        state.attempt += 1;

        if state.attempt > state.max_retries {
            log::warn!(
                "Retry budget exhausted after {} attempts",
                state.attempt
            );
            AgentPhase::Finalize
        } else {
            log::info!(
                "Retrying (attempt {}/{})",
                state.attempt + 1,
                state.max_retries + 1
            );
            AgentPhase::Generate
        }
    }
}

fn finalize(state: AgentState) -> AgentOutcome {
    log::info!(
        "Finalizing: success={}, attempts={}, errors={}",
        state.success,
        state.attempt,
        state.error_history.len()
    );

    AgentOutcome {
        success: state.success,
        sql_query: state.sql.unwrap_or_default(),
        results: state.rows,
        columns: state.columns,
        execution_time: state.execution_time,
        explanation: state.explanation,
        retry_count: state.attempt,
        errors_encountered: state.error_history,
        cancelled: state.cancelled,
    }
}

fn preview(sql: &str) -> String {
    let flattened = sql.replace('\n', " ");
    sqlsage_core::truncate_string_safe(&flattened, 120)
}
