use serde::{Deserialize, Serialize};

/// Classification of a database error for retry guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingColumn,
    MissingTable,
    TypeMismatch,
    Syntax,
    Unknown,
}

/// Structured result of parsing a dialect error message.
///
/// Produced by the error analyzer, consumed by the context builder's
/// error section. `hints` is the deterministic, ordered list of lines
/// ready to paste into the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub kind: ErrorKind,
    /// Identifiers the error complains about (tables, columns).
    pub offending: Vec<String>,
    /// Replacement candidates, best first.
    pub suggestions: Vec<String>,
    /// Qualified column → data type, for type-mismatch errors.
    pub column_types: Vec<(String, String)>,
    pub hints: Vec<String>,
}

impl ErrorAnalysis {
    pub fn unknown() -> Self {
        Self {
            kind: ErrorKind::Unknown,
            offending: Vec::new(),
            suggestions: Vec::new(),
            column_types: Vec::new(),
            hints: vec![
                "Review the error message and check the SQL against the schema".to_string(),
            ],
        }
    }

    pub fn hint_text(&self) -> String {
        self.hints.join("\n")
    }
}
