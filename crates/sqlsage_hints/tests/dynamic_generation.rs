//! Dynamic ontology generation: batching, merge semantics, and export.

use sqlsage_core::{ColumnDescriptor, DatabaseKind, SchemaSnapshot, TableDescriptor};
use sqlsage_hints::{
    export_artifacts, ExportFormat, OntologyGenerator, ONTOLOGY_BATCH_SIZE,
};
use sqlsage_test_support::{FakeLlm, FakeLlmReply};

fn wide_snapshot(table_count: usize) -> SchemaSnapshot {
    let tables = (0..table_count)
        .map(|i| {
            let mut table = TableDescriptor::new("public", format!("table_{i}"));
            table.columns.push(ColumnDescriptor {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                nullable: false,
                default_value: None,
                primary_key: true,
                unique: true,
            });
            table
        })
        .collect();

    SchemaSnapshot::from_tables("app", DatabaseKind::Postgres, tables)
}

fn concept_json(confidence: f64) -> serde_json::Value {
    serde_json::json!([{
        "name": "customer",
        "synonyms": ["client"],
        "properties": [{
            "name": "name",
            "synonyms": [],
            "column_mappings": [{
                "table": "public.table_0",
                "column": "id",
                "confidence": confidence
            }]
        }],
        "related": []
    }])
}

#[test]
fn generation_batches_tables_and_merges_concepts() {
    // 25 tables → 3 batches of at most ONTOLOGY_BATCH_SIZE.
    let snapshot = wide_snapshot(25);

    let llm = FakeLlm::with_replies(vec![
        FakeLlmReply::Json(concept_json(0.4)),
        FakeLlmReply::Json(concept_json(0.9)),
        FakeLlmReply::Json(concept_json(0.6)),
    ]);

    let generator = OntologyGenerator::new(&llm);
    let registry = generator.generate(&snapshot).unwrap();

    assert_eq!(llm.call_count(), 25_usize.div_ceil(ONTOLOGY_BATCH_SIZE));
    assert_eq!(registry.len(), 1);

    // Same-named concepts merged with max confidence.
    let concept = registry.get("customer").unwrap();
    let mapping = &concept.properties[0].column_mappings[0];
    assert!((mapping.confidence - 0.9).abs() < f64::EPSILON);
}

#[test]
fn malformed_batches_are_skipped_not_fatal() {
    let snapshot = wide_snapshot(15);

    let llm = FakeLlm::with_replies(vec![
        FakeLlmReply::Json(serde_json::json!({"not": "an array"})),
        FakeLlmReply::Json(concept_json(0.7)),
    ]);

    let generator = OntologyGenerator::new(&llm);
    let registry = generator.generate(&snapshot).unwrap();

    assert_eq!(registry.len(), 1);
}

#[test]
fn generated_registry_exports_both_artifacts() {
    let snapshot = wide_snapshot(3);
    let llm = FakeLlm::with_replies(vec![FakeLlmReply::Json(concept_json(0.8))]);

    let registry = OntologyGenerator::new(&llm).generate(&snapshot).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let written = export_artifacts(
        &registry,
        dir.path(),
        "conn-abc",
        ExportFormat::Both,
        sqlsage_core::chrono::Utc::now(),
    )
    .unwrap();

    assert_eq!(written.len(), 2);
    for path in &written {
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("conn-abc_ontology_"));
    }
}
