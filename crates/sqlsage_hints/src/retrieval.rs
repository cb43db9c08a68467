//! Similar-query retrieval.
//!
//! Successful (question, SQL) pairs are remembered and retrieved by
//! cosine similarity over a deterministic hashed bag-of-tokens
//! embedding. An external vector store can replace the in-memory one
//! behind the `QueryMemory` trait.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

use sqlsage_core::DatabaseKind;

use crate::types::SimilarQuery;

/// Store of past successful queries, searchable by similarity.
pub trait QueryMemory: Send + Sync {
    /// Remember a successful pair. Best-effort: failures are logged,
    /// never surfaced to the query path.
    fn add(&self, question: &str, sql: &str, kind: DatabaseKind, schema: Option<&str>);

    /// Top-k past pairs above the similarity threshold, filtered by
    /// dialect and (when given) schema.
    fn search(
        &self,
        question: &str,
        kind: DatabaseKind,
        schema: Option<&str>,
        top_k: usize,
        threshold: f64,
    ) -> Vec<SimilarQuery>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const EMBEDDING_DIMS: usize = 256;

struct StoredQuery {
    question: String,
    sql: String,
    kind: DatabaseKind,
    schema: Option<String>,
    embedding: Vec<f32>,
}

/// In-process query memory.
#[derive(Default)]
pub struct InMemoryQueryStore {
    entries: Mutex<Vec<StoredQuery>>,
}

impl InMemoryQueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredQuery>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }
}

impl QueryMemory for InMemoryQueryStore {
    fn add(&self, question: &str, sql: &str, kind: DatabaseKind, schema: Option<&str>) {
        let mut entries = self.lock();

        // A repeated question updates the stored SQL instead of piling
        // up duplicates.
        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.kind == kind && e.question.eq_ignore_ascii_case(question))
        {
            existing.sql = sql.to_string();
            existing.schema = schema.map(str::to_string);
            return;
        }

        entries.push(StoredQuery {
            question: question.to_string(),
            sql: sql.to_string(),
            kind,
            schema: schema.map(str::to_string),
            embedding: embed(question),
        });

        log::debug!("[RAG] Stored query ({} total)", entries.len());
    }

    fn search(
        &self,
        question: &str,
        kind: DatabaseKind,
        schema: Option<&str>,
        top_k: usize,
        threshold: f64,
    ) -> Vec<SimilarQuery> {
        let needle = embed(question);
        let entries = self.lock();

        let mut scored: Vec<SimilarQuery> = entries
            .iter()
            .filter(|e| e.kind == kind)
            .filter(|e| match (schema, &e.schema) {
                (Some(wanted), Some(stored)) => wanted.eq_ignore_ascii_case(stored),
                _ => true,
            })
            .map(|e| SimilarQuery {
                question: e.question.clone(),
                sql: e.sql.clone(),
                similarity: cosine(&needle, &e.embedding) as f64,
            })
            .filter(|s| s.similarity >= threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        scored
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Hashed bag-of-tokens embedding, L2-normalized.
fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIMS];

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_ascii_lowercase())
    {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let bucket = (hasher.finish() % EMBEDDING_DIMS as u64) as usize;
        vector[bucket] += 1.0;
    }

    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }

    vector
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    // Vectors are pre-normalized, so the dot product is the cosine.
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_question_scores_near_one() {
        let store = InMemoryQueryStore::new();
        store.add(
            "how many users are there",
            "SELECT COUNT(*) FROM users",
            DatabaseKind::Postgres,
            None,
        );

        let hits = store.search(
            "how many users are there",
            DatabaseKind::Postgres,
            None,
            3,
            0.7,
        );
        assert_eq!(hits.len(), 1);
        assert!(hits[0].similarity > 0.99);
    }

    #[test]
    fn unrelated_question_falls_below_threshold() {
        let store = InMemoryQueryStore::new();
        store.add(
            "how many users are there",
            "SELECT COUNT(*) FROM users",
            DatabaseKind::Postgres,
            None,
        );

        let hits = store.search(
            "average order total by vendor region",
            DatabaseKind::Postgres,
            None,
            3,
            0.7,
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn dialect_filter_applies() {
        let store = InMemoryQueryStore::new();
        store.add(
            "count users",
            "SELECT COUNT(*) FROM users",
            DatabaseKind::Postgres,
            None,
        );

        let hits = store.search("count users", DatabaseKind::Oracle, None, 3, 0.5);
        assert!(hits.is_empty());
    }

    #[test]
    fn schema_filter_applies_when_both_sides_name_one() {
        let store = InMemoryQueryStore::new();
        store.add(
            "count users",
            "SELECT COUNT(*) FROM users",
            DatabaseKind::Postgres,
            Some("public"),
        );

        let hits = store.search("count users", DatabaseKind::Postgres, Some("sales"), 3, 0.5);
        assert!(hits.is_empty());

        let hits = store.search("count users", DatabaseKind::Postgres, Some("public"), 3, 0.5);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn repeated_question_replaces_sql() {
        let store = InMemoryQueryStore::new();
        store.add("count users", "SELECT 1", DatabaseKind::Postgres, None);
        store.add(
            "count users",
            "SELECT COUNT(*) FROM users",
            DatabaseKind::Postgres,
            None,
        );

        assert_eq!(store.len(), 1);
        let hits = store.search("count users", DatabaseKind::Postgres, None, 3, 0.5);
        assert_eq!(hits[0].sql, "SELECT COUNT(*) FROM users");
    }

    #[test]
    fn top_k_caps_results() {
        let store = InMemoryQueryStore::new();
        for i in 0..10 {
            store.add(
                &format!("count users batch {}", i),
                "SELECT COUNT(*) FROM users",
                DatabaseKind::Postgres,
                None,
            );
        }

        let hits = store.search("count users batch", DatabaseKind::Postgres, None, 3, 0.1);
        assert_eq!(hits.len(), 3);
    }
}
