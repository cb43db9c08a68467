//! Semantic hints for SQL generation.
//!
//! Three optional streams feed the agent's prompt: a domain ontology
//! (static registry or dynamically generated from the schema), a schema
//! knowledge graph, and retrieval of similar past queries. Each stream
//! can be absent; the provider merges whatever is available into a
//! single `Hints` value and records which streams contributed.

mod export;
mod graph;
mod ontology;
mod provider;
mod retrieval;
mod types;

pub use export::{export_artifacts, ExportFormat};
pub use graph::{GraphInsight, GraphStore, SchemaGraph};
pub use ontology::{
    ColumnMapping, ConceptProperty, DomainConcept, OntologyGenerator, OntologyRegistry,
    OntologyResolution, ONTOLOGY_BATCH_SIZE,
};
pub use provider::SemanticHintsProvider;
pub use retrieval::{InMemoryQueryStore, QueryMemory};
pub use types::{HintSources, Hints, JoinSuggestion, ScoredColumn, SimilarQuery};
