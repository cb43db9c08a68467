//! Extraction ladder for LLM replies.
//!
//! Vendors are asked for bare JSON but routinely wrap it in prose or
//! code fences. Each step of the ladder is cheaper to satisfy than the
//! last; only when every step fails does the caller see an error.

use regex::Regex;
use std::sync::OnceLock;

use crate::{LlmError, SqlGeneration};

const PREVIEW_LEN: usize = 200;

/// Parse a JSON value out of model output.
///
/// Ladder: direct parse, fenced ```json block, first `{...}`/`[...]`
/// span. Returns `None` when nothing parses.
pub fn extract_json(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Some(value);
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(block.trim()) {
            return Some(value);
        }
    }

    if let Some(span) = first_json_span(trimmed) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(span) {
            return Some(value);
        }
    }

    None
}

/// Parse a `{"sql": ..., "explanation": ...}` reply, salvaging bare SQL
/// from code fences or keyword-prefixed prose when the JSON shape is
/// missing.
pub fn extract_sql_generation(content: &str) -> Result<SqlGeneration, LlmError> {
    if let Some(value) = extract_json(content) {
        if let Some(sql) = value.get("sql").and_then(|s| s.as_str()) {
            let sql = sql.trim();
            if !sql.is_empty() {
                return Ok(SqlGeneration {
                    sql: sql.to_string(),
                    explanation: value
                        .get("explanation")
                        .and_then(|e| e.as_str())
                        .filter(|e| !e.is_empty())
                        .map(|e| e.to_string()),
                });
            }
        }
    }

    // No JSON shape; salvage raw SQL from the text.
    if let Some(sql) = salvage_sql(content) {
        return Ok(SqlGeneration {
            sql,
            explanation: None,
        });
    }

    Err(LlmError::InvalidSql {
        preview: preview(content),
    })
}

fn salvage_sql(content: &str) -> Option<String> {
    let mut text = content.trim().to_string();

    // Drop markdown fences first.
    if let Some(inner) = fenced_block(&text) {
        text = inner.trim().to_string();
    }

    // Cut leading prose up to the first statement keyword. `WITH` alone
    // is too common in prose, so it only counts in CTE shape.
    static STATEMENT_START: OnceLock<Regex> = OnceLock::new();
    let statement_start = STATEMENT_START.get_or_init(|| {
        Regex::new(
            r"(?i)\b(SELECT\b|INSERT\b|UPDATE\b|DELETE\b|CREATE\b|DROP\b|ALTER\b|WITH\s+\w+\s+AS\b)",
        )
        .expect("statement-start regex is valid")
    });

    let start = statement_start.find(&text)?.start();
    let candidate = text[start..].trim().to_string();

    if sqlsage_core::starts_with_allowed_keyword(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

fn fenced_block(content: &str) -> Option<&str> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|sql)?\s*(.*?)```").expect("fence regex is valid")
    });

    fence
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// First balanced `{...}` or `[...]` span in the text.
fn first_json_span(content: &str) -> Option<&str> {
    let bytes = content.as_bytes();
    let start = content.find(|c| c == '{' || c == '[')?;
    let (open, close) = if bytes[start] == b'{' {
        (b'{', b'}')
    } else {
        (b'[', b']')
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

pub(crate) fn preview(content: &str) -> String {
    sqlsage_core::truncate_string_safe(content.trim(), PREVIEW_LEN)
}
