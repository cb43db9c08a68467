//! Ontology artifact export.
//!
//! Two artifacts per connection, suffixed with a timestamp: a YAML
//! mirror of the registry and an OWL document using the W3C namespaces.
//! Both are write-only snapshots; nothing reads them back at runtime.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ontology::{DomainConcept, OntologyRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Yml,
    Owl,
    Both,
}

impl ExportFormat {
    /// Parse the configured `ontology.dynamic_generation.export_format`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "yml" | "yaml" => ExportFormat::Yml,
            "owl" => ExportFormat::Owl,
            _ => ExportFormat::Both,
        }
    }

    fn wants_yml(&self) -> bool {
        matches!(self, ExportFormat::Yml | ExportFormat::Both)
    }

    fn wants_owl(&self) -> bool {
        matches!(self, ExportFormat::Owl | ExportFormat::Both)
    }
}

#[derive(Serialize)]
struct YamlDocument<'a> {
    ontology: YamlOntology<'a>,
}

#[derive(Serialize)]
struct YamlOntology<'a> {
    generated_at: String,
    concept_count: usize,
    concepts: Vec<&'a DomainConcept>,
}

/// Write the requested artifacts into `dir`, returning the paths
/// created. File names follow
/// `{connection_id}_ontology_{YYYYmmdd_HHMMSS}.{yml,owl}`.
pub fn export_artifacts(
    registry: &OntologyRegistry,
    dir: &Path,
    connection_id: &str,
    format: ExportFormat,
    timestamp: DateTime<Utc>,
) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let stamp = timestamp.format("%Y%m%d_%H%M%S");
    let mut written = Vec::new();

    if format.wants_yml() {
        let path = dir.join(format!("{}_ontology_{}.yml", connection_id, stamp));
        let document = YamlDocument {
            ontology: YamlOntology {
                generated_at: timestamp.to_rfc3339(),
                concept_count: registry.len(),
                concepts: registry.concepts().collect(),
            },
        };

        let yaml = serde_yaml::to_string(&document)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&path, yaml)?;
        log::info!("[ONTOLOGY] Wrote {}", path.display());
        written.push(path);
    }

    if format.wants_owl() {
        let path = dir.join(format!("{}_ontology_{}.owl", connection_id, stamp));
        fs::write(&path, render_owl(registry))?;
        log::info!("[ONTOLOGY] Wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}

const ONTOLOGY_IRI: &str = "http://sqlsage.dev/ontology";

fn render_owl(registry: &OntologyRegistry) -> String {
    let mut out = String::new();

    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\"\n\
         \x20        xmlns:rdfs=\"http://www.w3.org/2000/01/rdf-schema#\"\n\
         \x20        xmlns:owl=\"http://www.w3.org/2002/07/owl#\"\n\
         \x20        xmlns:xsd=\"http://www.w3.org/2001/XMLSchema#\"\n\
         \x20        xml:base=\"{base}\">\n\
         \x20 <owl:Ontology rdf:about=\"{base}\"/>\n",
        base = ONTOLOGY_IRI
    ));

    for concept in registry.concepts() {
        let class_iri = iri_fragment(&concept.name);

        out.push_str(&format!(
            "  <owl:Class rdf:about=\"{}#{}\">\n    <rdfs:label>{}</rdfs:label>\n",
            ONTOLOGY_IRI,
            class_iri,
            xml_escape(&concept.name)
        ));
        for synonym in &concept.synonyms {
            out.push_str(&format!(
                "    <rdfs:comment>synonym: {}</rdfs:comment>\n",
                xml_escape(synonym)
            ));
        }
        out.push_str("  </owl:Class>\n");

        for property in &concept.properties {
            out.push_str(&format!(
                "  <owl:DatatypeProperty rdf:about=\"{base}#{class}_{prop}\">\n\
                 \x20   <rdfs:label>{label}</rdfs:label>\n\
                 \x20   <rdfs:domain rdf:resource=\"{base}#{class}\"/>\n\
                 \x20   <rdfs:range rdf:resource=\"http://www.w3.org/2001/XMLSchema#string\"/>\n",
                base = ONTOLOGY_IRI,
                class = class_iri,
                prop = iri_fragment(&property.name),
                label = xml_escape(&property.name),
            ));
            for mapping in &property.column_mappings {
                out.push_str(&format!(
                    "    <rdfs:comment>dbColumn: {}.{} (confidence {:.2})</rdfs:comment>\n",
                    xml_escape(&mapping.table),
                    xml_escape(&mapping.column),
                    mapping.confidence
                ));
            }
            out.push_str("  </owl:DatatypeProperty>\n");
        }

        for related in &concept.related {
            out.push_str(&format!(
                "  <owl:ObjectProperty rdf:about=\"{base}#{class}_relatedTo_{other}\">\n\
                 \x20   <rdfs:domain rdf:resource=\"{base}#{class}\"/>\n\
                 \x20   <rdfs:range rdf:resource=\"{base}#{other}\"/>\n\
                 \x20 </owl:ObjectProperty>\n",
                base = ONTOLOGY_IRI,
                class = class_iri,
                other = iri_fragment(related),
            ));
        }
    }

    out.push_str("</rdf:RDF>\n");
    out
}

fn iri_fragment(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
