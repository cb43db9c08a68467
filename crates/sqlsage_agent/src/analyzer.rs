//! Database error analysis.
//!
//! Parses the backend's native error message into a typed
//! `ErrorAnalysis`: what kind of mistake it was, which identifiers it
//! involves, and concrete replacements the next generation attempt
//! should use. Works against the typed snapshot, so suggestions always
//! name real tables and columns.

use regex::Regex;
use std::sync::OnceLock;

use sqlsage_core::{ErrorAnalysis, ErrorKind, SchemaSnapshot, TableDescriptor};

const COLUMN_DISTANCE: usize = 2;
const TABLE_DISTANCE: usize = 3;
const MAX_SUGGESTED_TABLES: usize = 2;
const MAX_LISTED_COLUMNS: usize = 10;

pub struct ErrorAnalyzer<'a> {
    snapshot: &'a SchemaSnapshot,
}

impl<'a> ErrorAnalyzer<'a> {
    pub fn new(snapshot: &'a SchemaSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn analyze(&self, message: &str) -> ErrorAnalysis {
        let lowered = message.to_ascii_lowercase();

        if lowered.contains("column") && lowered.contains("does not exist")
            || lowered.contains("no such column")
            || lowered.contains("unknown column")
        {
            return self.analyze_missing_column(message);
        }

        if (lowered.contains("table") || lowered.contains("relation"))
            && (lowered.contains("does not exist") || lowered.contains("doesn't exist"))
            || lowered.contains("no such table")
        {
            return self.analyze_missing_table(message);
        }

        if lowered.contains("operator does not exist") || lowered.contains("no operator matches") {
            return self.analyze_type_mismatch(message);
        }

        if lowered.contains("syntax error") {
            return self.analyze_syntax(message);
        }

        ErrorAnalysis::unknown()
    }

    fn analyze_missing_column(&self, message: &str) -> ErrorAnalysis {
        static QUALIFIED: OnceLock<Regex> = OnceLock::new();
        static BARE: OnceLock<Regex> = OnceLock::new();
        let qualified = QUALIFIED.get_or_init(|| {
            Regex::new(r#"(?i)column\s+["']?(\w+)\.(\w+)["']?\s+does not exist"#)
                .expect("column regex is valid")
        });
        let bare = BARE.get_or_init(|| {
            Regex::new(
                r#"(?i)(?:column\s+["']?(\w+)["']?\s+does not exist|no such column:?\s+["']?(\w+)|unknown column\s+'([\w.]+)')"#,
            )
            .expect("bare column regex is valid")
        });

        let mut analysis = ErrorAnalysis {
            kind: ErrorKind::MissingColumn,
            offending: Vec::new(),
            suggestions: Vec::new(),
            column_types: Vec::new(),
            hints: Vec::new(),
        };

        if let Some(caps) = qualified.captures(message) {
            let alias = &caps[1];
            let column = &caps[2];
            analysis.offending.push(format!("{}.{}", alias, column));

            if let Some(table) = self.resolve_table_reference(alias) {
                let columns = table.column_names();
                analysis.hints.push(format!(
                    "Column '{}.{}' does not exist.",
                    alias, column
                ));
                analysis.hints.push(format!(
                    "Table '{}' has these columns: {}",
                    table.table_name,
                    columns
                        .iter()
                        .take(MAX_LISTED_COLUMNS)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                ));

                let similar = similar_names(column, &columns, COLUMN_DISTANCE);
                if !similar.is_empty() {
                    analysis.hints.push(format!(
                        "Did you mean: {}?",
                        similar
                            .iter()
                            .take(3)
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                    analysis.suggestions = similar;
                }
            } else {
                analysis.hints.push(format!(
                    "Column '{}.{}' does not exist. Check the table schema carefully.",
                    alias, column
                ));
            }

            return analysis;
        }

        if let Some(caps) = bare.captures(message) {
            let column = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            // MySQL reports `table.column`; keep the column part.
            let column = column.rsplit('.').next().unwrap_or(column);
            analysis.offending.push(column.to_string());

            // Search every table for close matches.
            let mut candidates: Vec<String> = Vec::new();
            for table in self.snapshot.tables.values() {
                for similar in similar_names(column, &table.column_names(), COLUMN_DISTANCE) {
                    let qualified = format!("{}.{}", table.table_name, similar);
                    if !candidates.contains(&qualified) {
                        candidates.push(qualified);
                    }
                }
            }

            analysis.hints.push(format!(
                "Column '{}' does not exist. Review the schema for correct column names.",
                column
            ));
            if !candidates.is_empty() {
                analysis.hints.push(format!(
                    "Did you mean: {}?",
                    candidates
                        .iter()
                        .take(3)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
                analysis.suggestions = candidates;
            }
        } else {
            analysis
                .hints
                .push("A referenced column does not exist. Use only columns from the schema.".to_string());
        }

        analysis
    }

    fn analyze_missing_table(&self, message: &str) -> ErrorAnalysis {
        static TABLE: OnceLock<Regex> = OnceLock::new();
        let table_re = TABLE.get_or_init(|| {
            Regex::new(
                r#"(?i)(?:(?:table|relation)\s+["']?([\w.]+)["']?\s+(?:does not exist|doesn't exist)|no such table:?\s+["']?(\w+))"#,
            )
            .expect("table regex is valid")
        });

        let mut analysis = ErrorAnalysis {
            kind: ErrorKind::MissingTable,
            offending: Vec::new(),
            suggestions: Vec::new(),
            column_types: Vec::new(),
            hints: Vec::new(),
        };

        let missing = table_re
            .captures(message)
            .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str().rsplit('.').next().unwrap_or(m.as_str()).to_string());

        let table_names: Vec<&str> = self.snapshot.table_names();

        match missing {
            Some(missing) => {
                analysis.offending.push(missing.clone());
                analysis
                    .hints
                    .push(format!("Table '{}' does not exist.", missing));

                let similar = similar_names(&missing, &table_names, TABLE_DISTANCE);
                if similar.is_empty() {
                    analysis.hints.push(format!(
                        "Available tables: {}",
                        table_names
                            .iter()
                            .take(8)
                            .copied()
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                } else {
                    let described: Vec<String> = similar
                        .iter()
                        .take(MAX_SUGGESTED_TABLES)
                        .filter_map(|name| self.snapshot.find_table(name))
                        .map(|table| {
                            format!(
                                "{}({})",
                                table.table_name,
                                table
                                    .column_names()
                                    .iter()
                                    .take(5)
                                    .cloned()
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            )
                        })
                        .collect();
                    analysis
                        .hints
                        .push(format!("Did you mean: {}?", described.join(" OR ")));
                    analysis.suggestions = similar;
                }
            }
            None => {
                analysis.hints.push(format!(
                    "Table name error. Available: {}",
                    table_names
                        .iter()
                        .take(8)
                        .copied()
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }

        analysis
    }

    fn analyze_type_mismatch(&self, message: &str) -> ErrorAnalysis {
        static TYPES: OnceLock<Regex> = OnceLock::new();
        static PAIR: OnceLock<Regex> = OnceLock::new();
        let types_re = TYPES.get_or_init(|| {
            Regex::new(
                r"(?i)(integer|bigint|smallint|numeric|character varying|varchar|text)\s*=\s*(integer|bigint|smallint|numeric|character varying|varchar|text)",
            )
            .expect("types regex is valid")
        });
        let pair_re = PAIR.get_or_init(|| {
            Regex::new(r"(\w+)\.(\w+)\s*=\s*(\w+)\.(\w+)").expect("pair regex is valid")
        });

        let mut analysis = ErrorAnalysis {
            kind: ErrorKind::TypeMismatch,
            offending: Vec::new(),
            suggestions: Vec::new(),
            column_types: Vec::new(),
            hints: vec!["Type mismatch: cannot compare different data types.".to_string()],
        };

        let operand_types = types_re
            .captures(message)
            .map(|caps| (caps[1].to_ascii_lowercase(), caps[2].to_ascii_lowercase()));

        if let Some((left, right)) = &operand_types {
            analysis
                .hints
                .push(format!("The comparison mixes {} and {}.", left, right));
        }

        if let Some(caps) = pair_re.captures(message) {
            let (alias1, col1, alias2, col2) = (&caps[1], &caps[2], &caps[3], &caps[4]);
            analysis.offending.push(format!("{}.{}", alias1, col1));
            analysis.offending.push(format!("{}.{}", alias2, col2));

            for (alias, col) in [(alias1, col1), (alias2, col2)] {
                if let Some(table) = self.resolve_table_reference(alias) {
                    if let Some(column) = table.column(col) {
                        analysis
                            .column_types
                            .push((format!("{}.{}", table.table_name, col), column.data_type.clone()));
                        analysis.hints.push(format!(
                            "{}.{} has type {}",
                            alias, col, column.data_type
                        ));
                    }
                }
            }

            // Ready-made casts, keyed off the left operand's type: the
            // right side is cast to match the left.
            if let Some((left, _)) = &operand_types {
                if is_integer_type(left) {
                    analysis.suggestions.push(format!(
                        "{}.{} = {}.{}::INTEGER",
                        alias1, col1, alias2, col2
                    ));
                } else {
                    analysis.suggestions.push(format!(
                        "{}.{} = {}.{}::VARCHAR",
                        alias1, col1, alias2, col2
                    ));
                }
            } else {
                analysis.suggestions.push(format!(
                    "CAST({}.{} AS VARCHAR) = CAST({}.{} AS VARCHAR)",
                    alias1, col1, alias2, col2
                ));
            }

            analysis
                .hints
                .push(format!("Add a cast, e.g.: {}", analysis.suggestions[0]));
        } else {
            analysis.hints.push(
                "Cast one side to the other's type: column::INTEGER, column::VARCHAR, \
                 or CAST(column AS type)."
                    .to_string(),
            );
        }

        analysis
            .hints
            .push("Check the schema for the exact column data types.".to_string());

        analysis
    }

    fn analyze_syntax(&self, message: &str) -> ErrorAnalysis {
        static NEAR: OnceLock<Regex> = OnceLock::new();
        let near = NEAR.get_or_init(|| {
            Regex::new(r#"(?i)syntax error at or near ["']?([^"'\s]+)["']?"#)
                .expect("syntax regex is valid")
        });

        let mut analysis = ErrorAnalysis {
            kind: ErrorKind::Syntax,
            offending: Vec::new(),
            suggestions: Vec::new(),
            column_types: Vec::new(),
            hints: Vec::new(),
        };

        match near.captures(message) {
            Some(caps) => {
                let token = caps[1].to_string();
                analysis
                    .hints
                    .push(format!("Syntax error near '{}'.", token));
                analysis.offending.push(token);
                analysis.hints.push(
                    "Check keyword order, parentheses, and comma placement.".to_string(),
                );
            }
            None => {
                analysis
                    .hints
                    .push("SQL syntax error. Re-check the statement structure.".to_string());
            }
        }

        analysis
    }

    /// Resolve an identifier from an error message to a table.
    ///
    /// Tries, in order: exact name, name prefix, and the initials of
    /// underscore-separated words (`w` or `wu` for `web_user`).
    pub fn resolve_table_reference(&self, reference: &str) -> Option<&TableDescriptor> {
        if let Some(table) = self.snapshot.find_table(reference) {
            return Some(table);
        }

        let lowered = reference.to_ascii_lowercase();

        for table in self.snapshot.tables.values() {
            if table.table_name.to_ascii_lowercase().starts_with(&lowered) {
                return Some(table);
            }
        }

        self.snapshot.tables.values().find(|table| {
            let initials: String = table
                .table_name
                .split(|c| c == '_' || c == '-')
                .filter_map(|word| word.chars().next())
                .collect::<String>()
                .to_ascii_lowercase();
            initials == lowered
        })
    }

    /// Tables the error message mentions, for building a focused schema.
    pub fn mentioned_tables(&self, message: &str) -> Vec<String> {
        static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            [
                r#"(?i)table\s+["']?(\w+)["']?"#,
                r#"(?i)relation\s+["']?(\w+)["']?"#,
                r"(?i)FROM\s+(\w+)",
                r"(?i)JOIN\s+(\w+)",
                r"(\w+)\.\w+",
            ]
            .iter()
            .map(|p| Regex::new(p).expect("mention regex is valid"))
            .collect()
        });

        let mut mentioned = Vec::new();
        for pattern in patterns.iter() {
            for caps in pattern.captures_iter(message) {
                let reference = &caps[1];
                if let Some(table) = self.resolve_table_reference(reference) {
                    if !mentioned.contains(&table.full_name) {
                        mentioned.push(table.full_name.clone());
                    }
                }
            }
        }

        mentioned
    }
}

/// Whether a type name captured from the error message is an integer
/// family type. Matches the lowercased operand the types regex yields.
fn is_integer_type(type_name: &str) -> bool {
    matches!(type_name, "integer" | "bigint" | "smallint")
}

/// Case-insensitive similarity: substring containment counts as
/// distance zero, then Levenshtein up to `threshold`. Candidates of
/// equal distance keep their input order (stable sort), so reordering
/// equals never changes the match class reported.
pub fn similar_names<S: AsRef<str>>(
    target: &str,
    candidates: &[S],
    threshold: usize,
) -> Vec<String> {
    let target_lower = target.to_ascii_lowercase();
    let mut matches: Vec<(usize, String)> = Vec::new();

    for candidate in candidates {
        let candidate = candidate.as_ref();
        let candidate_lower = candidate.to_ascii_lowercase();

        let distance = if candidate_lower.contains(&target_lower)
            || target_lower.contains(&candidate_lower)
        {
            0
        } else {
            strsim::levenshtein(&target_lower, &candidate_lower)
        };

        if distance <= threshold {
            matches.push((distance, candidate.to_string()));
        }
    }

    matches.sort_by_key(|(distance, _)| *distance);
    matches.into_iter().map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlsage_core::{ColumnDescriptor, DatabaseKind};

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

    fn snapshot() -> SchemaSnapshot {
        let mut orders = sqlsage_core::TableDescriptor::new("public", "orders");
        orders.columns = vec![
            column("id", "integer"),
            column("total", "numeric"),
            column("vendor_id", "integer"),
        ];

        let mut web_user = sqlsage_core::TableDescriptor::new("public", "web_user");
        web_user.columns = vec![column("id", "text"), column("email", "text")];

        let mut role_permissions = sqlsage_core::TableDescriptor::new("public", "role_permissions");
        role_permissions.columns = vec![column("user_id", "integer"), column("role", "text")];

        SchemaSnapshot::from_tables(
            "app",
            DatabaseKind::Postgres,
            vec![orders, web_user, role_permissions],
        )
    }

    #[test]
    fn missing_column_suggests_close_name() {
        let snapshot = snapshot();
        let analyzer = ErrorAnalyzer::new(&snapshot);

        let analysis = analyzer.analyze("column \"amount\" does not exist");
        assert_eq!(analysis.kind, ErrorKind::MissingColumn);
        assert!(analysis.hints.iter().any(|h| h.contains("amount")));
    }

    #[test]
    fn qualified_missing_column_resolves_the_table() {
        let snapshot = snapshot();
        let analyzer = ErrorAnalyzer::new(&snapshot);

        let analysis = analyzer.analyze("column orders.totl does not exist");
        assert_eq!(analysis.kind, ErrorKind::MissingColumn);
        assert_eq!(analysis.suggestions, vec!["total"]);
        assert!(analysis
            .hints
            .iter()
            .any(|h| h.contains("Did you mean: total?")));
    }

    #[test]
    fn missing_table_lists_candidates_with_columns() {
        let snapshot = snapshot();
        let analyzer = ErrorAnalyzer::new(&snapshot);

        let analysis = analyzer.analyze("relation \"order\" does not exist");
        assert_eq!(analysis.kind, ErrorKind::MissingTable);
        assert_eq!(analysis.suggestions[0], "orders");
        assert!(analysis
            .hints
            .iter()
            .any(|h| h.contains("orders(id, total, vendor_id)")));
    }

    #[test]
    fn sqlite_missing_table_shape_is_recognized() {
        let snapshot = snapshot();
        let analyzer = ErrorAnalyzer::new(&snapshot);

        let analysis = analyzer.analyze("no such table: ordrs");
        assert_eq!(analysis.kind, ErrorKind::MissingTable);
        assert_eq!(analysis.suggestions[0], "orders");
    }

    #[test]
    fn type_mismatch_proposes_casts_with_alias_resolution() {
        let snapshot = snapshot();
        let analyzer = ErrorAnalyzer::new(&snapshot);

        let analysis = analyzer.analyze(
            "operator does not exist: text = integer\nLINE 1: ...JOIN role_permissions r ON w.id = r.user_id",
        );

        assert_eq!(analysis.kind, ErrorKind::TypeMismatch);
        // The integer side gets the cast; the text side is left alone.
        assert_eq!(analysis.suggestions, vec!["w.id = r.user_id::VARCHAR"]);
        assert!(analysis
            .column_types
            .contains(&("web_user.id".to_string(), "text".to_string())));
        assert!(analysis
            .column_types
            .contains(&("role_permissions.user_id".to_string(), "integer".to_string())));
    }

    #[test]
    fn integer_left_operand_casts_the_right_side_to_integer() {
        let snapshot = snapshot();
        let analyzer = ErrorAnalyzer::new(&snapshot);

        let analysis = analyzer.analyze(
            "operator does not exist: integer = text\nLINE 1: ...JOIN web_user w ON r.user_id = w.id",
        );

        assert_eq!(analysis.kind, ErrorKind::TypeMismatch);
        assert_eq!(analysis.suggestions, vec!["r.user_id = w.id::INTEGER"]);
    }

    #[test]
    fn type_mismatch_without_operand_types_falls_back_to_explicit_casts() {
        let snapshot = snapshot();
        let analyzer = ErrorAnalyzer::new(&snapshot);

        let analysis =
            analyzer.analyze("no operator matches the given name: w.id = r.user_id");

        assert_eq!(analysis.kind, ErrorKind::TypeMismatch);
        assert_eq!(
            analysis.suggestions,
            vec!["CAST(w.id AS VARCHAR) = CAST(r.user_id AS VARCHAR)"]
        );
    }

    #[test]
    fn syntax_error_surfaces_the_token() {
        let snapshot = snapshot();
        let analyzer = ErrorAnalyzer::new(&snapshot);

        let analysis = analyzer.analyze("syntax error at or near \"GROPU\"");
        assert_eq!(analysis.kind, ErrorKind::Syntax);
        assert_eq!(analysis.offending, vec!["GROPU"]);
    }

    #[test]
    fn unclassified_errors_are_unknown() {
        let snapshot = snapshot();
        let analyzer = ErrorAnalyzer::new(&snapshot);

        let analysis = analyzer.analyze("deadlock detected");
        assert_eq!(analysis.kind, ErrorKind::Unknown);
        assert!(!analysis.hints.is_empty());
    }

    #[test]
    fn alias_resolution_tries_exact_prefix_then_initials() {
        let snapshot = snapshot();
        let analyzer = ErrorAnalyzer::new(&snapshot);

        assert_eq!(
            analyzer.resolve_table_reference("orders").unwrap().table_name,
            "orders"
        );
        assert_eq!(
            analyzer.resolve_table_reference("w").unwrap().table_name,
            "web_user"
        );
        assert_eq!(
            analyzer.resolve_table_reference("rp").unwrap().table_name,
            "role_permissions"
        );
        assert!(analyzer.resolve_table_reference("zzz").is_none());
    }

    #[test]
    fn similarity_is_stable_for_equal_distances() {
        let forward = similar_names("usr", &["user", "user2"], 2);
        let swapped = similar_names("usr", &["user2", "user"], 2);

        // Equal-distance candidates keep their input order; the match
        // classes are identical either way.
        assert_eq!(forward.len(), swapped.len());
        assert!(forward.contains(&"user".to_string()));
        assert!(swapped.contains(&"user".to_string()));
    }

    #[test]
    fn substring_matches_rank_before_edits() {
        let matches = similar_names("total", &["subtotal", "tota"], 2);
        assert_eq!(matches[0], "subtotal");
    }

    #[test]
    fn mentioned_tables_resolve_through_aliases() {
        let snapshot = snapshot();
        let analyzer = ErrorAnalyzer::new(&snapshot);

        let mentioned =
            analyzer.mentioned_tables("operator does not exist near w.id = r.user_id");
        assert!(mentioned.contains(&"public.web_user".to_string()));
        assert!(mentioned.contains(&"public.role_permissions".to_string()));
    }
}
