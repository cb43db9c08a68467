use sqlsage_core::{schema_service, ErrorAnalysis, SchemaSnapshot, TableDescriptor};
use sqlsage_llm::ChatMessage;

use crate::strategy::{estimate_tokens, truncate_to_tokens, ContextStrategy, TokenBudget};

/// Assembles prompt sections within a token budget.
pub struct ContextBuilder {
    strategy: ContextStrategy,
    budget: TokenBudget,
}

impl ContextBuilder {
    pub fn new(max_tokens: usize, strategy_name: &str) -> Self {
        let strategy = ContextStrategy::resolve(strategy_name, max_tokens);
        let budget = TokenBudget::new(max_tokens, strategy);

        log::debug!(
            "ContextBuilder: max_tokens={}, strategy={}, schema_budget={}, error_budget={}",
            max_tokens,
            strategy.name(),
            budget.schema,
            budget.error_context
        );

        Self { strategy, budget }
    }

    pub fn strategy(&self) -> ContextStrategy {
        self.strategy
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// The instruction preamble, escalating in detail with the strategy.
    pub fn build_system_prompt(&self) -> String {
        let prompt = match self.strategy {
            ContextStrategy::Concise => {
                "You are a SQL expert. Generate ONLY valid SQL queries.\n\
                 Rules:\n\
                 1. Return ONLY the SQL query, no explanations\n\
                 2. Use exact table and column names from the schema\n\
                 3. Use proper JOIN syntax\n\
                 4. Fix errors from previous attempts"
            }
            ContextStrategy::Semi => {
                "You are a SQL query expert. Generate accurate SQL from natural \
                 language questions.\n\n\
                 Key Rules:\n\
                 1. Return ONLY the SQL query without explanations or markdown\n\
                 2. Use EXACT table and column names from the provided schema\n\
                 3. Use explicit JOIN syntax with clear ON conditions\n\
                 4. Handle NULL values appropriately\n\
                 5. If previous attempts failed, analyze the error and fix the cause\n\
                 6. For ambiguous questions, make reasonable assumptions from the schema"
            }
            ContextStrategy::Expanded => {
                "You are an expert SQL query generator.\n\n\
                 Your Task:\n\
                 Generate precise, optimized SQL queries that answer the user's \
                 natural language questions.\n\n\
                 Core Rules:\n\
                 1. Output Format: Return ONLY the SQL query, no comments or markdown\n\
                 2. Schema Accuracy: Use EXACT table and column names from the schema\n\
                 3. JOIN Operations: Use explicit JOIN syntax with clear ON conditions\n\
                 4. Data Types: Respect column types and cast when comparing across types\n\
                 5. Error Recovery: If previous attempts failed, fix the root cause, \
                 not a variation\n\
                 6. Ambiguity: Make reasonable assumptions based on schema relationships\n\
                 7. Optimization: Avoid SELECT *, filter early with WHERE\n\n\
                 Special Considerations:\n\
                 - Handle NULL with COALESCE or IS NULL checks\n\
                 - Use appropriate aggregates (COUNT, SUM, AVG)\n\
                 - Sort results with ORDER BY when relevant"
            }
            ContextStrategy::Large => {
                "You are an expert SQL query generator with comprehensive knowledge \
                 of database best practices.\n\n\
                 Mission:\n\
                 Transform natural language questions into precise, efficient, correct \
                 SQL that executes flawlessly.\n\n\
                 Comprehensive Rules:\n\n\
                 1. Output Format:\n\
                    - Return ONLY the executable SQL query\n\
                    - No explanations, comments, or markdown\n\n\
                 2. Schema Adherence:\n\
                    - Use EXACT table and column names from the provided schema\n\
                    - Never assume columns exist; verify against the schema\n\
                    - Respect foreign key relationships\n\n\
                 3. JOIN Operations:\n\
                    - Use explicit JOIN syntax (INNER JOIN, LEFT JOIN)\n\
                    - Always specify ON conditions clearly\n\
                    - Consider relationship cardinality\n\n\
                 4. Data Types & Casting:\n\
                    - Respect column data types\n\
                    - Cast explicitly when comparing different types, e.g. \
                 column_name::INTEGER or CAST(column_name AS INTEGER)\n\n\
                 5. Error Recovery:\n\
                    - Analyze the previous error message carefully\n\
                    - Common causes: wrong column names, type mismatches, missing JOINs\n\
                    - Fix the root cause, don't just try variations\n\n\
                 6. Query Optimization:\n\
                    - Specify columns instead of SELECT *\n\
                    - Filter early with WHERE clauses\n\
                    - Prefer EXISTS over IN for subqueries when appropriate\n\n\
                 7. NULL Handling:\n\
                    - Use IS NULL / IS NOT NULL for NULL checks\n\
                    - Use COALESCE for default values\n\n\
                 8. Aggregation:\n\
                    - Use GROUP BY with aggregates, HAVING for grouped filters\n\
                    - Use DISTINCT when appropriate\n\n\
                 9. Sorting & Limiting:\n\
                    - Add ORDER BY for meaningful ordering\n\
                    - Limit rows for top-N queries\n\n\
                 10. Ambiguity Resolution:\n\
                    - Make reasonable assumptions, prefer recent and active records"
            }
        };

        truncate_to_tokens(prompt, self.budget.system_prompt)
    }

    /// Render the schema section.
    ///
    /// `focused_tables` (e.g. from an error analysis) restricts output;
    /// otherwise tables are rendered in snapshot order up to the
    /// strategy's cap.
    pub fn build_schema_context(
        &self,
        snapshot: &SchemaSnapshot,
        focused_tables: Option<&[String]>,
        include_samples: bool,
    ) -> String {
        let tables: Vec<&TableDescriptor> = match focused_tables {
            Some(names) if !names.is_empty() => {
                schema_service::focused_tables(snapshot, names)
            }
            _ => snapshot
                .tables
                .values()
                .take(self.strategy.max_schema_tables())
                .collect(),
        };

        if tables.is_empty() {
            return "No schema available.".to_string();
        }

        let rendered = match self.strategy {
            ContextStrategy::Concise => self.render_names_only(&tables),
            ContextStrategy::Semi => self.render_typed(&tables, false, false),
            ContextStrategy::Expanded => self.render_typed(&tables, true, false),
            ContextStrategy::Large => self.render_typed(&tables, true, include_samples),
        };

        truncate_to_tokens(&rendered, self.budget.schema)
    }

    fn render_names_only(&self, tables: &[&TableDescriptor]) -> String {
        let mut lines = vec!["DATABASE SCHEMA:".to_string()];

        for table in tables {
            let columns: Vec<&str> = table
                .columns
                .iter()
                .take(10)
                .map(|c| c.name.as_str())
                .collect();
            lines.push(format!("{}({})", table.full_name, columns.join(", ")));
        }

        lines.join("\n")
    }

    fn render_typed(
        &self,
        tables: &[&TableDescriptor],
        with_relationships: bool,
        with_samples: bool,
    ) -> String {
        let mut lines = vec!["DATABASE SCHEMA:".to_string(), String::new()];

        for table in tables {
            lines.push(format!("Table: {}", table.full_name));
            lines.push("Columns:".to_string());

            for column in &table.columns {
                let mut line = format!(
                    "  - {} ({}) {}",
                    column.name,
                    column.data_type,
                    if column.nullable { "NULL" } else { "NOT NULL" }
                );
                if column.primary_key {
                    line.push_str(" [PK]");
                } else if column.unique {
                    line.push_str(" [UNIQUE]");
                }
                if let Some(ref default) = column.default_value {
                    line.push_str(&format!(" DEFAULT {}", default));
                }
                lines.push(line);
            }

            if with_relationships && !table.foreign_keys.is_empty() {
                lines.push("Foreign Keys:".to_string());
                for fk in &table.foreign_keys {
                    lines.push(format!(
                        "  - {} -> {}.{}",
                        fk.column, fk.references_table, fk.references_column
                    ));
                }
            }

            if with_samples && !table.sample_rows.is_empty() {
                lines.push("Sample Rows:".to_string());
                for row in &table.sample_rows {
                    lines.push(format!("  {}", row));
                }
            }

            lines.push(String::new());
        }

        lines.join("\n")
    }

    /// Render the error-recovery section for a retry attempt.
    ///
    /// The minimal form carries the message and the first analyzer hint;
    /// wider strategies add the previous SQL, suggestions, and a
    /// focused schema slice for the cited tables.
    pub fn build_error_context(
        &self,
        error_message: &str,
        analysis: &ErrorAnalysis,
        previous_sql: Option<&str>,
        focused_schema: Option<&str>,
    ) -> String {
        let mut lines = vec![
            "PREVIOUS ATTEMPT FAILED:".to_string(),
            format!("Error: {}", error_message),
        ];

        match self.strategy {
            ContextStrategy::Concise => {
                if let Some(first) = analysis.hints.first() {
                    lines.push(first.clone());
                }
            }
            _ => {
                if let Some(sql) = previous_sql {
                    lines.push(format!("Failed SQL: {}", sql));
                }

                lines.extend(analysis.hints.iter().cloned());

                if !analysis.suggestions.is_empty() {
                    lines.push(format!(
                        "Suggested fixes: {}",
                        analysis.suggestions.join(", ")
                    ));
                }

                if let Some(slice) = focused_schema {
                    if !slice.is_empty() {
                        lines.push(String::new());
                        lines.push("Schema for the tables involved:".to_string());
                        lines.push(slice.to_string());
                    }
                }
            }
        }

        truncate_to_tokens(&lines.join("\n"), self.budget.error_context)
    }

    /// Render conversation history, newest turns kept when the budget
    /// runs out, in chronological order.
    pub fn build_history(&self, turns: &[ChatMessage]) -> String {
        if turns.is_empty() {
            return String::new();
        }

        let mut kept: Vec<String> = Vec::new();
        let mut used = estimate_tokens("CONVERSATION HISTORY:");

        for turn in turns.iter().rev() {
            let line = format!("{}: {}", turn.role, turn.content);
            let cost = estimate_tokens(&line);
            if used + cost > self.budget.conversation {
                break;
            }
            used += cost;
            kept.push(line);
        }

        if kept.is_empty() {
            return String::new();
        }

        kept.reverse();
        format!("CONVERSATION HISTORY:\n{}", kept.join("\n"))
    }
}
