//! Schema knowledge graph.
//!
//! `GraphStore` is the seam for an external graph database; the
//! in-process `SchemaGraph` builds a directed graph from a snapshot
//! (tables contain columns, foreign keys reference tables) and answers
//! insight queries by lexical overlap boosted along foreign-key edges.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

use sqlsage_core::SchemaSnapshot;

use crate::types::JoinSuggestion;

/// One column suggestion from the graph, with its relevance score.
#[derive(Debug, Clone)]
pub struct GraphInsight {
    pub table: String,
    pub column: String,
    pub score: f64,
    pub reason: String,
}

/// Queryable source of graph insights for a connection.
pub trait GraphStore: Send + Sync {
    fn is_available(&self) -> bool;

    /// Column suggestions for a question, best first.
    fn insights(&self, connection_id: &str, question: &str) -> Vec<GraphInsight>;

    /// Join clauses suggested by the stored relationships.
    fn join_suggestions(&self, connection_id: &str, question: &str) -> Vec<JoinSuggestion>;
}

#[derive(Debug, Clone)]
enum SchemaNode {
    Table { full_name: String },
    Column { table: String, name: String, data_type: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaEdge {
    Contains,
    References,
}

/// In-process fallback graph built from one snapshot.
pub struct SchemaGraph {
    graph: DiGraph<SchemaNode, SchemaEdge>,
    tables: HashMap<String, NodeIndex>,
}

impl SchemaGraph {
    pub fn from_snapshot(snapshot: &SchemaSnapshot) -> Self {
        let mut graph = DiGraph::new();
        let mut tables = HashMap::new();
        let mut columns: HashMap<(String, String), NodeIndex> = HashMap::new();

        for table in snapshot.tables.values() {
            let table_node = graph.add_node(SchemaNode::Table {
                full_name: table.full_name.clone(),
            });
            tables.insert(table.full_name.clone(), table_node);

            for column in &table.columns {
                let column_node = graph.add_node(SchemaNode::Column {
                    table: table.full_name.clone(),
                    name: column.name.clone(),
                    data_type: column.data_type.clone(),
                });
                graph.add_edge(table_node, column_node, SchemaEdge::Contains);
                columns.insert(
                    (table.full_name.clone(), column.name.clone()),
                    column_node,
                );
            }
        }

        // Foreign keys become edges from the referencing column to the
        // referenced table.
        for table in snapshot.tables.values() {
            for fk in &table.foreign_keys {
                let from = columns.get(&(table.full_name.clone(), fk.column.clone()));
                let to = tables.get(&fk.references_table);
                if let (Some(&from), Some(&to)) = (from, to) {
                    graph.add_edge(from, to, SchemaEdge::References);
                }
            }
        }

        log::debug!(
            "[GRAPH] Built schema graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Self { graph, tables }
    }

    fn question_tokens(question: &str) -> Vec<String> {
        question
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(|w| w.to_ascii_lowercase())
            .collect()
    }

    fn overlap_score(identifier: &str, tokens: &[String]) -> f64 {
        let parts: Vec<String> = identifier
            .split(|c: char| c == '_' || c == '.' || c == '-')
            .map(|p| p.to_ascii_lowercase())
            .collect();

        let mut score = 0.0;
        for token in tokens {
            for part in &parts {
                if part == token {
                    score += 1.0;
                } else if part.starts_with(token.as_str()) || token.starts_with(part.as_str()) {
                    score += 0.5;
                }
            }
        }
        score
    }
}

impl GraphStore for SchemaGraph {
    fn is_available(&self) -> bool {
        !self.tables.is_empty()
    }

    fn insights(&self, _connection_id: &str, question: &str) -> Vec<GraphInsight> {
        let tokens = Self::question_tokens(question);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut insights = Vec::new();

        for (full_name, &table_node) in &self.tables {
            let table_score = Self::overlap_score(full_name, &tokens);

            for column_node in self.graph.neighbors_directed(table_node, Direction::Outgoing) {
                let (name, data_type) = match &self.graph[column_node] {
                    SchemaNode::Column { name, data_type, .. } => (name, data_type),
                    SchemaNode::Table { .. } => continue,
                };

                let column_score = Self::overlap_score(name, &tokens);
                // FK columns pointing at a question-relevant table score
                // even when their own name does not match.
                let reference_bonus: f64 = self
                    .graph
                    .neighbors_directed(column_node, Direction::Outgoing)
                    .filter_map(|target| match &self.graph[target] {
                        SchemaNode::Table { full_name } => {
                            Some(Self::overlap_score(full_name, &tokens) * 0.5)
                        }
                        SchemaNode::Column { .. } => None,
                    })
                    .sum();

                let score = table_score * 0.5 + column_score + reference_bonus;
                if score > 0.0 {
                    insights.push(GraphInsight {
                        table: full_name.clone(),
                        column: name.clone(),
                        score,
                        reason: format!("{} {}", data_type, full_name),
                    });
                }
            }
        }

        insights.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        insights
    }

    fn join_suggestions(&self, _connection_id: &str, question: &str) -> Vec<JoinSuggestion> {
        let tokens = Self::question_tokens(question);
        let mut suggestions = Vec::new();

        for edge in self.graph.edge_indices() {
            if self.graph[edge] != SchemaEdge::References {
                continue;
            }

            let (from, to) = match self.graph.edge_endpoints(edge) {
                Some(endpoints) => endpoints,
                None => continue,
            };

            let (from_table, from_column) = match &self.graph[from] {
                SchemaNode::Column { table, name, .. } => (table.clone(), name.clone()),
                SchemaNode::Table { .. } => continue,
            };
            let to_table = match &self.graph[to] {
                SchemaNode::Table { full_name } => full_name.clone(),
                SchemaNode::Column { .. } => continue,
            };

            // Suggest a join only when either side matters to the question.
            let relevant = tokens.is_empty()
                || Self::overlap_score(&from_table, &tokens) > 0.0
                || Self::overlap_score(&to_table, &tokens) > 0.0;

            if relevant {
                // Referenced column defaults to the conventional key; the
                // snapshot-level FK carries the exact name, but the graph
                // only stores the table-level edge.
                suggestions.push(JoinSuggestion {
                    from_table,
                    from_column,
                    to_table,
                    to_column: "id".to_string(),
                });
            }
        }

        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlsage_core::{ColumnDescriptor, DatabaseKind, ForeignKey, TableDescriptor};

    fn snapshot() -> SchemaSnapshot {
        let mut vendors = TableDescriptor::new("public", "vendors");
        vendors.columns = vec![column("id", "integer"), column("vendor_name", "text")];

        let mut orders = TableDescriptor::new("public", "orders");
        orders.columns = vec![
            column("id", "integer"),
            column("total", "numeric"),
            column("vendor_id", "integer"),
        ];
        orders.foreign_keys = vec![ForeignKey {
            column: "vendor_id".to_string(),
            references_table: "public.vendors".to_string(),
            references_column: "id".to_string(),
            on_delete: None,
        }];

        SchemaSnapshot::from_tables("app", DatabaseKind::Postgres, vec![vendors, orders])
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
    fn question_terms_surface_matching_columns() {
        let graph = SchemaGraph::from_snapshot(&snapshot());
        let insights = graph.insights("conn-1", "total per vendor");

        assert!(!insights.is_empty());
        let top_columns: Vec<&str> = insights.iter().take(3).map(|i| i.column.as_str()).collect();
        assert!(top_columns.contains(&"total") || top_columns.contains(&"vendor_id"));
    }

    #[test]
    fn foreign_keys_become_join_suggestions() {
        let graph = SchemaGraph::from_snapshot(&snapshot());
        let joins = graph.join_suggestions("conn-1", "orders by vendor");

        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].from_table, "public.orders");
        assert_eq!(joins[0].to_table, "public.vendors");
        assert_eq!(joins[0].from_column, "vendor_id");
    }

    #[test]
    fn empty_question_yields_no_insights() {
        let graph = SchemaGraph::from_snapshot(&snapshot());
        assert!(graph.insights("conn-1", "").is_empty());
    }
}
