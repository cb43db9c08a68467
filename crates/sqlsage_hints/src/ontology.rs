//! Domain ontology: named concepts with synonyms and column mappings.
//!
//! A registry can be populated statically (configuration, a previous
//! export) or generated dynamically from a schema snapshot through the
//! LLM. Generation processes tables in batches so one request never
//! carries an unbounded schema.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sqlsage_core::SchemaSnapshot;
use sqlsage_llm::{ChatMessage, LlmCapability, LlmError};

use crate::types::ScoredColumn;

/// Tables per dynamic-generation batch.
pub const ONTOLOGY_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub table: String,
    pub column: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptProperty {
    pub name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub column_mappings: Vec<ColumnMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConcept {
    pub name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub properties: Vec<ConceptProperty>,
    /// Names of related concepts.
    #[serde(default)]
    pub related: Vec<String>,
}

/// What the resolver extracted for one question.
#[derive(Debug, Clone, Default)]
pub struct OntologyResolution {
    pub detected_concepts: Vec<String>,
    /// Table → scored columns, best first.
    pub suggested_columns: IndexMap<String, Vec<ScoredColumn>>,
    pub related_tables: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OntologyRegistry {
    concepts: IndexMap<String, DomainConcept>,
}

impl OntologyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn concepts(&self) -> impl Iterator<Item = &DomainConcept> {
        self.concepts.values()
    }

    pub fn get(&self, name: &str) -> Option<&DomainConcept> {
        self.concepts.get(&name.to_ascii_lowercase())
    }

    /// Insert a concept, merging with an existing one of the same name.
    ///
    /// Same-named properties keep the mapping with the higher
    /// confidence; synonym lists are unioned. This is what makes
    /// batch-wise generation converge to one coherent registry.
    pub fn merge_concept(&mut self, concept: DomainConcept) {
        let key = concept.name.to_ascii_lowercase();

        let existing = match self.concepts.get_mut(&key) {
            Some(existing) => existing,
            None => {
                self.concepts.insert(key, concept);
                return;
            }
        };

        for synonym in concept.synonyms {
            if !existing
                .synonyms
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&synonym))
            {
                existing.synonyms.push(synonym);
            }
        }

        for related in concept.related {
            if !existing
                .related
                .iter()
                .any(|r| r.eq_ignore_ascii_case(&related))
            {
                existing.related.push(related);
            }
        }

        for property in concept.properties {
            let slot = existing
                .properties
                .iter_mut()
                .find(|p| p.name.eq_ignore_ascii_case(&property.name));

            match slot {
                Some(slot) => {
                    for mapping in property.column_mappings {
                        let known = slot.column_mappings.iter_mut().find(|m| {
                            m.table.eq_ignore_ascii_case(&mapping.table)
                                && m.column.eq_ignore_ascii_case(&mapping.column)
                        });
                        match known {
                            Some(known) => {
                                known.confidence = known.confidence.max(mapping.confidence);
                            }
                            None => slot.column_mappings.push(mapping),
                        }
                    }
                    for synonym in property.synonyms {
                        if !slot.synonyms.iter().any(|s| s.eq_ignore_ascii_case(&synonym)) {
                            slot.synonyms.push(synonym);
                        }
                    }
                }
                None => existing.properties.push(property),
            }
        }
    }

    /// Match question terms against concept names and synonyms; emit
    /// column suggestions restricted to tables present in the schema.
    pub fn resolve(&self, question: &str, available_tables: &[&str]) -> OntologyResolution {
        let question_lower = question.to_ascii_lowercase();
        let mut resolution = OntologyResolution::default();

        for concept in self.concepts.values() {
            if !concept_matches(concept, &question_lower) {
                continue;
            }

            resolution.detected_concepts.push(concept.name.clone());

            for property in &concept.properties {
                for mapping in &property.column_mappings {
                    let table_known = available_tables.iter().any(|t| {
                        t.eq_ignore_ascii_case(&mapping.table)
                            || mapping.table.to_ascii_lowercase().ends_with(
                                &format!(".{}", t.to_ascii_lowercase()),
                            )
                    });
                    if !table_known {
                        continue;
                    }

                    let columns = resolution
                        .suggested_columns
                        .entry(mapping.table.clone())
                        .or_default();

                    match columns
                        .iter_mut()
                        .find(|c| c.column.eq_ignore_ascii_case(&mapping.column))
                    {
                        Some(existing) => {
                            existing.confidence = existing.confidence.max(mapping.confidence);
                        }
                        None => columns.push(ScoredColumn {
                            column: mapping.column.clone(),
                            confidence: mapping.confidence,
                        }),
                    }
                }
            }

            for related in &concept.related {
                if !resolution
                    .related_tables
                    .iter()
                    .any(|r| r.eq_ignore_ascii_case(related))
                {
                    resolution.related_tables.push(related.clone());
                }
            }
        }

        for columns in resolution.suggested_columns.values_mut() {
            columns.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        resolution
    }
}

fn concept_matches(concept: &DomainConcept, question_lower: &str) -> bool {
    let name_hit = contains_word(question_lower, &concept.name.to_ascii_lowercase());
    if name_hit {
        return true;
    }

    concept
        .synonyms
        .iter()
        .any(|s| contains_word(question_lower, &s.to_ascii_lowercase()))
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == needle || (needle.len() > 3 && word.starts_with(needle)))
}

/// Generates a registry from a live schema through the LLM.
pub struct OntologyGenerator<'a> {
    llm: &'a dyn LlmCapability,
}

impl<'a> OntologyGenerator<'a> {
    pub fn new(llm: &'a dyn LlmCapability) -> Self {
        Self { llm }
    }

    /// Extract concepts from the snapshot, batching tables to bound the
    /// request payload. Concepts repeated across batches merge with
    /// max-confidence.
    pub fn generate(&self, snapshot: &SchemaSnapshot) -> Result<OntologyRegistry, LlmError> {
        let tables: Vec<_> = snapshot.tables.values().collect();
        let mut registry = OntologyRegistry::new();

        for (batch_index, batch) in tables.chunks(ONTOLOGY_BATCH_SIZE).enumerate() {
            log::info!(
                "[ONTOLOGY] Extracting concepts from batch {} ({} tables)",
                batch_index + 1,
                batch.len()
            );

            let mut description = String::new();
            for table in batch {
                description.push_str(&format!("Table: {}\nColumns:", table.full_name));
                for column in &table.columns {
                    description.push_str(&format!(" {} ({}),", column.name, column.data_type));
                }
                description.push('\n');
            }

            let messages = [
                ChatMessage::system(
                    "You are a data modeling expert. Given database tables, identify the \
                     business concepts they represent. Return ONLY a JSON array where each \
                     element has this shape: {\"name\": str, \"synonyms\": [str], \
                     \"properties\": [{\"name\": str, \"synonyms\": [str], \
                     \"column_mappings\": [{\"table\": str, \"column\": str, \
                     \"confidence\": float}]}], \"related\": [str]}",
                ),
                ChatMessage::user(description),
            ];

            let value = self.llm.generate_structured(&messages, 2048)?;
            let concepts: Vec<DomainConcept> = match serde_json::from_value(value) {
                Ok(concepts) => concepts,
                Err(e) => {
                    log::warn!(
                        "[ONTOLOGY] Batch {} returned malformed concepts: {}",
                        batch_index + 1,
                        e
                    );
                    continue;
                }
            };

            for concept in concepts {
                registry.merge_concept(concept);
            }
        }

        log::info!("[ONTOLOGY] Generated {} concepts", registry.len());
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer_concept(confidence: f64) -> DomainConcept {
        DomainConcept {
            name: "customer".to_string(),
            synonyms: vec!["client".to_string(), "buyer".to_string()],
            properties: vec![ConceptProperty {
                name: "name".to_string(),
                synonyms: vec![],
                column_mappings: vec![ColumnMapping {
                    table: "public.users".to_string(),
                    column: "name".to_string(),
                    confidence,
                }],
            }],
            related: vec!["orders".to_string()],
        }
    }

    #[test]
    fn merge_keeps_max_confidence() {
        let mut registry = OntologyRegistry::new();
        registry.merge_concept(customer_concept(0.6));
        registry.merge_concept(customer_concept(0.9));
        registry.merge_concept(customer_concept(0.4));

        assert_eq!(registry.len(), 1);
        let concept = registry.get("customer").unwrap();
        let mapping = &concept.properties[0].column_mappings[0];
        assert!((mapping.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn synonym_triggers_resolution() {
        let mut registry = OntologyRegistry::new();
        registry.merge_concept(customer_concept(0.8));

        let resolution = registry.resolve("list every client name", &["users"]);
        assert_eq!(resolution.detected_concepts, vec!["customer"]);
        assert!(resolution.suggested_columns.contains_key("public.users"));
        assert_eq!(resolution.related_tables, vec!["orders"]);
    }

    #[test]
    fn unknown_tables_are_filtered_out() {
        let mut registry = OntologyRegistry::new();
        registry.merge_concept(customer_concept(0.8));

        let resolution = registry.resolve("client details", &["invoices"]);
        assert_eq!(resolution.detected_concepts, vec!["customer"]);
        assert!(resolution.suggested_columns.is_empty());
    }

    #[test]
    fn no_match_yields_empty_resolution() {
        let mut registry = OntologyRegistry::new();
        registry.merge_concept(customer_concept(0.8));

        let resolution = registry.resolve("disk usage by tablespace", &["users"]);
        assert!(resolution.detected_concepts.is_empty());
    }
}
