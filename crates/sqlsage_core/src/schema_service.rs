//! Question-driven table selection over a schema snapshot.
//!
//! Large databases do not fit in a prompt; the agent asks this module
//! which tables matter for a question and the context builder renders
//! only those.

use crate::{SchemaSnapshot, TableDescriptor};

/// A table paired with its relevance score for a question.
#[derive(Debug, Clone)]
pub struct RankedTable<'a> {
    pub table: &'a TableDescriptor,
    pub score: f64,
}

/// Rank tables by lexical overlap between the question and the table's
/// name and columns. Name hits weigh more than column hits; ties keep
/// snapshot order so output is deterministic.
pub fn rank_tables<'a>(snapshot: &'a SchemaSnapshot, question: &str) -> Vec<RankedTable<'a>> {
    let terms = question_terms(question);

    let mut ranked: Vec<RankedTable<'a>> = snapshot
        .tables
        .values()
        .map(|table| RankedTable {
            table,
            score: score_table(table, &terms),
        })
        .collect();

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

/// Tables selected for a focused prompt: every table whose score is
/// positive, up to `max_tables`, falling back to snapshot order when the
/// question matches nothing.
pub fn relevant_tables<'a>(
    snapshot: &'a SchemaSnapshot,
    question: &str,
    max_tables: usize,
) -> Vec<&'a TableDescriptor> {
    let ranked = rank_tables(snapshot, question);
    let matched: Vec<&TableDescriptor> = ranked
        .iter()
        .filter(|r| r.score > 0.0)
        .take(max_tables)
        .map(|r| r.table)
        .collect();

    if matched.is_empty() {
        return snapshot.tables.values().take(max_tables).collect();
    }

    matched
}

/// Restrict a snapshot to named tables, resolving bare or full names.
pub fn focused_tables<'a>(
    snapshot: &'a SchemaSnapshot,
    names: &[String],
) -> Vec<&'a TableDescriptor> {
    names
        .iter()
        .filter_map(|name| snapshot.find_table(name))
        .collect()
}

fn score_table(table: &TableDescriptor, terms: &[String]) -> f64 {
    let mut score = 0.0;
    let table_tokens = identifier_tokens(&table.table_name);

    for term in terms {
        if table_tokens.iter().any(|t| t == term || t.starts_with(term.as_str())) {
            score += 3.0;
        }

        for column in &table.columns {
            let col_tokens = identifier_tokens(&column.name);
            if col_tokens.iter().any(|t| t == term || t.starts_with(term.as_str())) {
                score += 1.0;
            }
        }
    }

    score
}

fn question_terms(question: &str) -> Vec<String> {
    question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| singularize(&w.to_ascii_lowercase()))
        .filter(|w| !is_stop_word(w))
        .collect()
}

fn identifier_tokens(identifier: &str) -> Vec<String> {
    identifier
        .split(|c: char| c == '_' || c == '-')
        .filter(|p| !p.is_empty())
        .map(|p| singularize(&p.to_ascii_lowercase()))
        .collect()
}

// Crude English singularization, enough to match "users" to "user".
fn singularize(word: &str) -> String {
    if word.len() > 3 && word.ends_with("ies") {
        format!("{}y", &word[..word.len() - 3])
    } else if word.len() > 2 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "the" | "and" | "are" | "for" | "how" | "many" | "much" | "what" | "which" | "who"
            | "show" | "list" | "all" | "from" | "with" | "there" | "their" | "that" | "this"
            | "give" | "get" | "find" | "count" | "per" | "each" | "top" | "first"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColumnDescriptor, DatabaseKind};

    fn snapshot() -> SchemaSnapshot {
        let mut users = crate::TableDescriptor::new("public", "users");
        users.columns.push(column("id", "integer"));
        users.columns.push(column("name", "text"));

        let mut orders = crate::TableDescriptor::new("public", "orders");
        orders.columns.push(column("id", "integer"));
        orders.columns.push(column("total", "numeric"));
        orders.columns.push(column("vendor_id", "integer"));

        let mut audit = crate::TableDescriptor::new("public", "audit_log");
        audit.columns.push(column("id", "integer"));

        SchemaSnapshot::from_tables("app", DatabaseKind::Postgres, vec![users, orders, audit])
    }

    fn column(name: &str, data_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            default_value: None,
            primary_key: false,
            unique: false,
        }
    }

    #[test]
    fn question_term_matches_table_name() {
        let snapshot = snapshot();
        let ranked = rank_tables(&snapshot, "how many users are there?");
        assert_eq!(ranked[0].table.table_name, "users");
        assert!(ranked[0].score > 0.0);
    }

    #[test]
    fn plural_and_singular_forms_match() {
        let snapshot = snapshot();
        let ranked = rank_tables(&snapshot, "total per order");
        assert_eq!(ranked[0].table.table_name, "orders");
    }

    #[test]
    fn unmatched_question_falls_back_to_snapshot_order() {
        let snapshot = snapshot();
        let tables = relevant_tables(&snapshot, "zzz qqq", 2);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].table_name, "users");
    }

    #[test]
    fn focused_tables_resolve_bare_names() {
        let snapshot = snapshot();
        let focused = focused_tables(&snapshot, &["orders".to_string(), "nope".to_string()]);
        assert_eq!(focused.len(), 1);
        assert_eq!(focused[0].full_name, "public.orders");
    }
}
