use std::sync::{Arc, RwLock};

use sqlsage_core::{RagConfig, SchemaSnapshot};

use crate::graph::{GraphStore, SchemaGraph};
use crate::ontology::OntologyRegistry;
use crate::retrieval::QueryMemory;
use crate::types::{Hints, JoinSuggestion, ScoredColumn};

/// Collects the ontology, graph, and retrieval streams into one
/// `Hints` value. Every stream is optional; absent or failing streams
/// simply do not contribute.
pub struct SemanticHintsProvider {
    ontology: RwLock<Option<Arc<OntologyRegistry>>>,
    graph: Option<Arc<dyn GraphStore>>,
    /// Build an in-process graph from the snapshot when no external
    /// store is available.
    graph_fallback: bool,
    memory: Option<Arc<dyn QueryMemory>>,
    rag: RagConfig,
}

impl SemanticHintsProvider {
    pub fn new(
        ontology: Option<Arc<OntologyRegistry>>,
        graph: Option<Arc<dyn GraphStore>>,
        memory: Option<Arc<dyn QueryMemory>>,
        rag: RagConfig,
    ) -> Self {
        Self {
            ontology: RwLock::new(ontology),
            graph,
            graph_fallback: false,
            memory,
            rag,
        }
    }

    pub fn with_graph_fallback(mut self) -> Self {
        self.graph_fallback = true;
        self
    }

    pub fn disabled() -> Self {
        Self::new(None, None, None, RagConfig::default())
    }

    /// Swap in a freshly generated ontology (dynamic generation path).
    pub fn set_ontology(&self, registry: Arc<OntologyRegistry>) {
        let mut slot = match self.ontology.write() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };
        *slot = Some(registry);
    }

    pub fn memory(&self) -> Option<&Arc<dyn QueryMemory>> {
        self.memory.as_ref()
    }

    /// Gather hints for one question against one snapshot.
    ///
    /// Ontology suggestions take precedence over graph suggestions on
    /// confidence ties; similar queries come last and never influence
    /// column scores.
    pub fn gather(
        &self,
        question: &str,
        snapshot: &SchemaSnapshot,
        connection_id: &str,
        schema_name: Option<&str>,
    ) -> Hints {
        let mut hints = Hints::default();

        let ontology = {
            let slot = match self.ontology.read() {
                Ok(guard) => guard,
                Err(poison) => poison.into_inner(),
            };
            slot.clone()
        };

        if let Some(registry) = ontology {
            let tables: Vec<&str> = snapshot.table_names();
            let resolution = registry.resolve(question, &tables);

            if !resolution.detected_concepts.is_empty() {
                hints.sources.ontology = true;
                hints.detected_concepts = resolution.detected_concepts;
                hints.suggested_columns = resolution.suggested_columns;
                hints.related_tables = resolution.related_tables;
                log::debug!(
                    "[HINTS] Ontology matched concepts: {}",
                    hints.detected_concepts.join(", ")
                );
            }
        }

        let fallback_graph: Option<SchemaGraph> = match &self.graph {
            Some(store) if store.is_available() => None,
            _ if self.graph_fallback => {
                log::debug!("[HINTS] External graph unavailable, using in-process fallback");
                Some(SchemaGraph::from_snapshot(snapshot))
            }
            _ => None,
        };

        let graph: Option<&dyn GraphStore> = match (&self.graph, &fallback_graph) {
            (Some(store), _) if store.is_available() => Some(store.as_ref()),
            (_, Some(fallback)) => Some(fallback),
            _ => None,
        };

        if let Some(graph) = graph {
            let insights = graph.insights(connection_id, question);
            if !insights.is_empty() {
                hints.sources.graph = true;
            }

            for insight in insights.into_iter().take(10) {
                let columns = hints
                    .suggested_columns
                    .entry(insight.table.clone())
                    .or_default();

                match columns
                    .iter_mut()
                    .find(|c| c.column.eq_ignore_ascii_case(&insight.column))
                {
                    // Ontology entries win ties; the graph only raises
                    // a column it strictly beats.
                    Some(existing) => {
                        if insight.score > existing.confidence {
                            existing.confidence = insight.score;
                        }
                    }
                    None => columns.push(ScoredColumn {
                        column: insight.column,
                        confidence: insight.score,
                    }),
                }
            }

            let joins: Vec<JoinSuggestion> = graph.join_suggestions(connection_id, question);
            if !joins.is_empty() {
                hints.sources.graph = true;
                hints.suggested_joins = joins;
            }
        }

        if let Some(memory) = &self.memory {
            if self.rag.enabled {
                let similar = memory.search(
                    question,
                    snapshot.database_type,
                    schema_name,
                    self.rag.top_k,
                    self.rag.similarity_threshold,
                );

                if !similar.is_empty() {
                    hints.sources.retrieval = true;
                    log::debug!("[HINTS] Retrieved {} similar queries", similar.len());
                    hints.similar_queries = similar;
                }
            }
        }

        for columns in hints.suggested_columns.values_mut() {
            columns.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        hints
    }

    /// Offer a successful pair to the retrieval store, best-effort.
    pub fn remember_success(
        &self,
        question: &str,
        sql: &str,
        kind: sqlsage_core::DatabaseKind,
        schema_name: Option<&str>,
    ) {
        if !self.rag.enabled {
            return;
        }

        if let Some(memory) = &self.memory {
            memory.add(question, sql, kind, schema_name);
            log::debug!("[RAG] Remembered successful query");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SchemaGraph;
    use crate::ontology::{ColumnMapping, ConceptProperty, DomainConcept};
    use crate::retrieval::InMemoryQueryStore;
    use sqlsage_core::{ColumnDescriptor, DatabaseKind, TableDescriptor};

    fn snapshot() -> SchemaSnapshot {
        let mut users = TableDescriptor::new("public", "users");
        users.columns = vec![
            ColumnDescriptor {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                nullable: false,
                default_value: None,
                primary_key: true,
                unique: true,
            },
            ColumnDescriptor {
                name: "name".to_string(),
                data_type: "text".to_string(),
                nullable: true,
                default_value: None,
                primary_key: false,
                unique: false,
            },
        ];
        SchemaSnapshot::from_tables("app", DatabaseKind::Postgres, vec![users])
    }

    fn ontology() -> Arc<OntologyRegistry> {
        let mut registry = OntologyRegistry::new();
        registry.merge_concept(DomainConcept {
            name: "customer".to_string(),
            synonyms: vec!["user".to_string()],
            properties: vec![ConceptProperty {
                name: "name".to_string(),
                synonyms: vec![],
                column_mappings: vec![ColumnMapping {
                    table: "public.users".to_string(),
                    column: "name".to_string(),
                    confidence: 0.95,
                }],
            }],
            related: vec![],
        });
        Arc::new(registry)
    }

    #[test]
    fn all_streams_contribute_and_are_tracked() {
        let graph: Arc<dyn GraphStore> = Arc::new(SchemaGraph::from_snapshot(&snapshot()));
        let memory: Arc<dyn QueryMemory> = Arc::new(InMemoryQueryStore::new());
        memory.add(
            "how many users are there",
            "SELECT COUNT(*) FROM users",
            DatabaseKind::Postgres,
            None,
        );

        let rag = RagConfig {
            enabled: true,
            ..RagConfig::default()
        };
        let provider =
            SemanticHintsProvider::new(Some(ontology()), Some(graph), Some(memory), rag);

        let hints = provider.gather("how many users are there", &snapshot(), "conn", None);

        assert!(hints.sources.ontology);
        assert!(hints.sources.graph);
        assert!(hints.sources.retrieval);
        assert_eq!(hints.detected_concepts, vec!["customer"]);
        assert!(!hints.similar_queries.is_empty());
    }

    #[test]
    fn ontology_confidence_survives_graph_ties() {
        let graph: Arc<dyn GraphStore> = Arc::new(SchemaGraph::from_snapshot(&snapshot()));
        let provider = SemanticHintsProvider::new(
            Some(ontology()),
            Some(graph),
            None,
            RagConfig::default(),
        );

        let hints = provider.gather("user name", &snapshot(), "conn", None);
        let columns = &hints.suggested_columns["public.users"];
        let name = columns
            .iter()
            .find(|c| c.column == "name")
            .expect("name should be suggested");
        assert!(name.confidence >= 0.95);
    }

    #[test]
    fn graph_fallback_serves_insights_without_an_external_store() {
        let provider = SemanticHintsProvider::new(None, None, None, RagConfig::default())
            .with_graph_fallback();

        let hints = provider.gather("user names", &snapshot(), "conn", None);
        assert!(hints.sources.graph);
        assert!(hints.suggested_columns.contains_key("public.users"));
    }

    #[test]
    fn disabled_provider_returns_empty_hints() {
        let provider = SemanticHintsProvider::disabled();
        let hints = provider.gather("anything", &snapshot(), "conn", None);
        assert!(hints.is_empty());
    }

    #[test]
    fn rag_disabled_skips_retrieval_even_with_memory() {
        let memory: Arc<dyn QueryMemory> = Arc::new(InMemoryQueryStore::new());
        memory.add("q", "SELECT 1", DatabaseKind::Postgres, None);

        let provider =
            SemanticHintsProvider::new(None, None, Some(memory), RagConfig::default());
        let hints = provider.gather("q", &snapshot(), "conn", None);
        assert!(hints.similar_queries.is_empty());
        assert!(!hints.sources.retrieval);
    }
}
