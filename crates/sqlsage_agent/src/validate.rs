//! Contract checks on generated SQL, run before anything touches the
//! database.

use sqlsage_core::{
    dangerous_operation, prose_marker, question_requests, starts_with_allowed_keyword,
};

/// Why a generated statement was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Empty or whitespace-only output. Retryable.
    Empty,
    /// Does not open with an allowed statement keyword. Retryable.
    NotSql { preview: String },
    /// Contains explanatory prose instead of pure SQL. Retryable.
    Prose { marker: &'static str, preview: String },
    /// Dangerous operation the question never asked for. Fatal.
    Dangerous { keyword: &'static str },
    /// `target_schema` set but the SQL uses unqualified names. Retryable.
    MissingSchemaPrefix { schema: String },
}

impl ValidationError {
    /// Fatal errors end the request; retryable ones consume a retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ValidationError::Dangerous { .. })
    }

    pub fn message(&self) -> String {
        match self {
            ValidationError::Empty => "Empty SQL query generated by LLM".to_string(),
            ValidationError::NotSql { preview } => format!(
                "Invalid SQL: query must start with a SQL keyword (SELECT, WITH, ...), got: {}",
                preview
            ),
            ValidationError::Prose { marker, preview } => format!(
                "Invalid SQL: contains explanatory text ('{}') instead of pure SQL: {}",
                marker, preview
            ),
            ValidationError::Dangerous { keyword } => format!(
                "Query contains a {} operation the question did not request",
                keyword.to_uppercase()
            ),
            ValidationError::MissingSchemaPrefix { schema } => {
                format!("Use the schema prefix, e.g. {}.table_name", schema)
            }
        }
    }
}

/// Validate one generated statement against the question that produced
/// it.
pub fn validate_sql(
    sql: &str,
    question: &str,
    target_schema: Option<&str>,
) -> Result<(), ValidationError> {
    let trimmed = sql.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    if !starts_with_allowed_keyword(trimmed) {
        return Err(ValidationError::NotSql {
            preview: sqlsage_core::truncate_string_safe(trimmed, 50),
        });
    }

    if let Some(marker) = prose_marker(trimmed) {
        return Err(ValidationError::Prose {
            marker,
            preview: sqlsage_core::truncate_string_safe(trimmed, 100),
        });
    }

    if let Some(op) = dangerous_operation(trimmed) {
        if !question_requests(question, op) {
            return Err(ValidationError::Dangerous {
                keyword: op.keyword(),
            });
        }
    }

    if let Some(schema) = target_schema {
        let upper = trimmed.to_ascii_uppercase();
        if upper.contains("FROM") && !trimmed.to_ascii_lowercase().contains(&schema.to_ascii_lowercase())
        {
            return Err(ValidationError::MissingSchemaPrefix {
                schema: schema.to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_select_passes() {
        assert!(validate_sql("SELECT COUNT(*) FROM users;", "how many users?", None).is_ok());
    }

    #[test]
    fn empty_and_prose_are_retryable() {
        assert_eq!(validate_sql("", "q", None), Err(ValidationError::Empty));

        let err = validate_sql("I cannot help with that", "q", None).unwrap_err();
        assert!(matches!(err, ValidationError::NotSql { .. }));
        assert!(!err.is_fatal());

        let err = validate_sql(
            "SELECT * FROM users -- based on your question",
            "q",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::Prose { .. }));
    }

    #[test]
    fn unrequested_delete_is_fatal() {
        let err = validate_sql("DELETE FROM users", "how many users are there?", None).unwrap_err();
        assert!(matches!(err, ValidationError::Dangerous { keyword: "delete" }));
        assert!(err.is_fatal());
    }

    #[test]
    fn requested_delete_is_allowed() {
        assert!(validate_sql(
            "DELETE FROM users WHERE active = false",
            "please delete all inactive users",
            None
        )
        .is_ok());
    }

    #[test]
    fn keyword_inside_identifier_is_not_dangerous() {
        assert!(validate_sql(
            "SELECT last_update FROM users",
            "when was each user last updated?",
            None
        )
        .is_ok());
    }

    #[test]
    fn schema_prefix_is_enforced_when_requested() {
        let err = validate_sql("SELECT * FROM users", "q", Some("sales")).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingSchemaPrefix {
                schema: "sales".to_string()
            }
        );
        assert!(!err.is_fatal());

        assert!(validate_sql("SELECT * FROM sales.users", "q", Some("sales")).is_ok());
    }
}
