use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredColumn {
    pub column: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSuggestion {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

impl JoinSuggestion {
    pub fn render(&self) -> String {
        format!(
            "{}.{} = {}.{}",
            self.from_table, self.from_column, self.to_table, self.to_column
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarQuery {
    pub question: String,
    pub sql: String,
    pub similarity: f64,
}

/// Which hint streams contributed to a `Hints` value.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HintSources {
    pub ontology: bool,
    pub graph: bool,
    pub retrieval: bool,
}

/// Merged advisory payload injected into the generation prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hints {
    pub detected_concepts: Vec<String>,
    /// Table → suggested columns, best first.
    pub suggested_columns: IndexMap<String, Vec<ScoredColumn>>,
    pub suggested_joins: Vec<JoinSuggestion>,
    pub related_tables: Vec<String>,
    pub similar_queries: Vec<SimilarQuery>,
    pub sources: HintSources,
}

impl Hints {
    pub fn is_empty(&self) -> bool {
        self.detected_concepts.is_empty()
            && self.suggested_columns.is_empty()
            && self.suggested_joins.is_empty()
            && self.related_tables.is_empty()
            && self.similar_queries.is_empty()
    }

    /// Render as prompt lines. Empty hints render as an empty string so
    /// the caller can skip the section entirely.
    pub fn render_for_prompt(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut lines = vec!["SEMANTIC HINTS:".to_string()];

        if !self.detected_concepts.is_empty() {
            lines.push(format!(
                "Detected concepts: {}",
                self.detected_concepts.join(", ")
            ));
        }

        for (table, columns) in &self.suggested_columns {
            let rendered: Vec<String> = columns
                .iter()
                .map(|c| format!("{} ({:.2})", c.column, c.confidence))
                .collect();
            lines.push(format!("Relevant columns in {}: {}", table, rendered.join(", ")));
        }

        if !self.suggested_joins.is_empty() {
            let joins: Vec<String> = self.suggested_joins.iter().map(|j| j.render()).collect();
            lines.push(format!("Likely joins: {}", joins.join("; ")));
        }

        if !self.related_tables.is_empty() {
            lines.push(format!("Related tables: {}", self.related_tables.join(", ")));
        }

        for similar in &self.similar_queries {
            lines.push(format!(
                "Similar past question ({:.2}): {}\n  SQL: {}",
                similar.similarity, similar.question, similar.sql
            ));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hints_render_nothing() {
        assert_eq!(Hints::default().render_for_prompt(), "");
        assert!(Hints::default().is_empty());
    }

    #[test]
    fn rendered_hints_carry_all_streams() {
        let mut hints = Hints::default();
        hints.detected_concepts.push("customer".to_string());
        hints.suggested_columns.insert(
            "public.users".to_string(),
            vec![ScoredColumn {
                column: "name".to_string(),
                confidence: 0.9,
            }],
        );
        hints.suggested_joins.push(JoinSuggestion {
            from_table: "orders".to_string(),
            from_column: "vendor_id".to_string(),
            to_table: "vendors".to_string(),
            to_column: "id".to_string(),
        });
        hints.similar_queries.push(SimilarQuery {
            question: "how many users?".to_string(),
            sql: "SELECT COUNT(*) FROM users".to_string(),
            similarity: 0.83,
        });

        let text = hints.render_for_prompt();
        assert!(text.contains("Detected concepts: customer"));
        assert!(text.contains("Relevant columns in public.users: name (0.90)"));
        assert!(text.contains("orders.vendor_id = vendors.id"));
        assert!(text.contains("Similar past question (0.83)"));
    }
}
