use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::DatabaseKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    /// Referenced table as `schema.table`.
    pub references_table: String,
    pub references_column: String,
    #[serde(default)]
    pub on_delete: Option<String>,
}

/// Maximum sample rows carried per table.
pub const MAX_SAMPLE_ROWS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema_name: String,
    pub table_name: String,
    /// `schema.table`, unique within a snapshot.
    pub full_name: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub sample_rows: Vec<serde_json::Value>,
}

impl TableDescriptor {
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        let schema_name = schema_name.into();
        let table_name = table_name.into();
        let full_name = format!("{}.{}", schema_name, table_name);
        Self {
            schema_name,
            table_name,
            full_name,
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            sample_rows: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDescriptor {
    pub schema_name: String,
    pub view_name: String,
}

/// Versioned description of one database at a point in time.
///
/// The canonical internal form keys tables by `full_name`; the list form
/// only exists at the transport edge and is normalized on ingress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub database_name: String,
    pub database_type: DatabaseKind,
    pub captured_at: DateTime<Utc>,
    pub tables: IndexMap<String, TableDescriptor>,
    #[serde(default)]
    pub views: Vec<ViewDescriptor>,
}

impl SchemaSnapshot {
    pub fn new(database_name: impl Into<String>, database_type: DatabaseKind) -> Self {
        Self {
            database_name: database_name.into(),
            database_type,
            captured_at: Utc::now(),
            tables: IndexMap::new(),
            views: Vec::new(),
        }
    }

    /// Normalize a list of descriptors into the canonical map form.
    ///
    /// Duplicate `full_name`s keep the first occurrence; empty column
    /// types are patched to `text` so downstream consumers can rely on
    /// the non-empty invariant.
    pub fn from_tables(
        database_name: impl Into<String>,
        database_type: DatabaseKind,
        tables: Vec<TableDescriptor>,
    ) -> Self {
        let mut snapshot = Self::new(database_name, database_type);
        for table in tables {
            snapshot.insert_table(table);
        }
        snapshot
    }

    pub fn insert_table(&mut self, mut table: TableDescriptor) {
        if self.tables.contains_key(&table.full_name) {
            log::warn!(
                "[SCHEMA] Duplicate table {} dropped during normalization",
                table.full_name
            );
            return;
        }

        for column in &mut table.columns {
            if column.data_type.is_empty() {
                column.data_type = "text".to_string();
            }
        }

        table.sample_rows.truncate(MAX_SAMPLE_ROWS);
        self.tables.insert(table.full_name.clone(), table);
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Look up a table by full name, bare name, or case-insensitive match.
    pub fn find_table(&self, name: &str) -> Option<&TableDescriptor> {
        if let Some(table) = self.tables.get(name) {
            return Some(table);
        }

        self.tables
            .values()
            .find(|t| t.table_name.eq_ignore_ascii_case(name) || t.full_name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables
            .values()
            .map(|t| t.table_name.as_str())
            .collect()
    }

    /// Age of the snapshot, for cache TTL decisions.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.captured_at
    }
}
