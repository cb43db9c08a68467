//! Lexical safety checks over generated SQL.
//!
//! The scanner is comment- and string-aware so keywords inside literals
//! or comments never trigger a classification.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanState {
    Normal,
    LineComment,
    BlockComment,
    SingleQuote,
    DoubleQuote,
}

/// Statement keywords the LLM is allowed to open with.
pub const ALLOWED_LEADING_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER",
];

/// Phrases that betray prose instead of executable SQL.
const PROSE_MARKERS: &[&str] = &[
    "based on",
    "here are",
    "there are",
    "the following",
    "here is",
    "this query",
    "you can",
    "i apologize",
];

/// Operations gated on the question explicitly asking for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DangerousOperation {
    Drop,
    Truncate,
    Delete,
    Update,
    Insert,
    Alter,
}

impl DangerousOperation {
    pub fn keyword(&self) -> &'static str {
        match self {
            DangerousOperation::Drop => "drop",
            DangerousOperation::Truncate => "truncate",
            DangerousOperation::Delete => "delete",
            DangerousOperation::Update => "update",
            DangerousOperation::Insert => "insert",
            DangerousOperation::Alter => "alter",
        }
    }

    const ALL: &'static [DangerousOperation] = &[
        DangerousOperation::Drop,
        DangerousOperation::Truncate,
        DangerousOperation::Delete,
        DangerousOperation::Update,
        DangerousOperation::Insert,
        DangerousOperation::Alter,
    ];
}

/// First SQL keyword of the statement, uppercased.
pub fn first_keyword(sql: &str) -> Option<String> {
    let stripped = strip_comments(sql);
    stripped
        .split_whitespace()
        .map(|part| part.trim_start_matches(|c: char| !c.is_ascii_alphabetic()))
        .find(|part| !part.is_empty())
        .map(|part| {
            part.chars()
                .take_while(|ch| ch.is_ascii_alphabetic())
                .collect::<String>()
                .to_ascii_uppercase()
        })
        .filter(|word| !word.is_empty())
}

/// Whether the statement opens with one of the allowed keywords.
pub fn starts_with_allowed_keyword(sql: &str) -> bool {
    match first_keyword(sql) {
        Some(keyword) => ALLOWED_LEADING_KEYWORDS.contains(&keyword.as_str()),
        None => false,
    }
}

/// Detect explanatory prose that LLMs sometimes emit instead of SQL.
pub fn prose_marker(sql: &str) -> Option<&'static str> {
    let lowered = sql.to_ascii_lowercase();
    PROSE_MARKERS.iter().copied().find(|m| lowered.contains(m))
}

/// Find a dangerous operation in the statement, if any.
///
/// Matches whole words in comment-stripped, string-stripped text, so a
/// column named `last_update` does not count as an UPDATE.
pub fn dangerous_operation(sql: &str) -> Option<DangerousOperation> {
    let stripped = strip_comments_and_strings(sql);
    let words: Vec<String> = stripped
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect();

    DangerousOperation::ALL
        .iter()
        .copied()
        .find(|op| words.iter().any(|w| w == op.keyword()))
}

/// Whether the question itself asks for the given operation.
pub fn question_requests(question: &str, op: DangerousOperation) -> bool {
    question
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|w| w.eq_ignore_ascii_case(op.keyword()))
}

/// Whether the statement is a row-returning query (SELECT or WITH).
pub fn is_select_like(sql: &str) -> bool {
    matches!(
        first_keyword(sql).as_deref(),
        Some("SELECT") | Some("WITH") | Some("SHOW") | Some("EXPLAIN") | Some("PRAGMA")
    )
}

/// Remove SQL comments while preserving string literals.
pub fn strip_comments(sql: &str) -> String {
    scan(sql, false)
}

fn strip_comments_and_strings(sql: &str) -> String {
    scan(sql, true)
}

fn scan(sql: &str, drop_strings: bool) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut result = String::with_capacity(sql.len());
    let mut index = 0;
    let mut state = ScanState::Normal;

    while index < chars.len() {
        let current = chars[index];
        let next = chars.get(index + 1).copied();

        match state {
            ScanState::Normal => {
                if current == '-' && next == Some('-') {
                    state = ScanState::LineComment;
                    index += 2;
                    continue;
                }

                if current == '/' && next == Some('*') {
                    state = ScanState::BlockComment;
                    index += 2;
                    continue;
                }

                if current == '\'' {
                    state = ScanState::SingleQuote;
                } else if current == '"' {
                    state = ScanState::DoubleQuote;
                }

                result.push(current);
                index += 1;
            }

            ScanState::LineComment => {
                if current == '\n' {
                    result.push('\n');
                    state = ScanState::Normal;
                }
                index += 1;
            }

            ScanState::BlockComment => {
                if current == '*' && next == Some('/') {
                    state = ScanState::Normal;
                    index += 2;
                } else {
                    index += 1;
                }
            }

            ScanState::SingleQuote => {
                if !drop_strings {
                    result.push(current);
                }

                if current == '\'' && index > 0 {
                    if next == Some('\'') {
                        if !drop_strings {
                            result.push('\'');
                        }
                        index += 2;
                        continue;
                    }
                    state = ScanState::Normal;
                }

                index += 1;
            }

            ScanState::DoubleQuote => {
                if !drop_strings {
                    result.push(current);
                }

                if current == '"' && index > 0 {
                    if next == Some('"') {
                        if !drop_strings {
                            result.push('"');
                        }
                        index += 2;
                        continue;
                    }
                    state = ScanState::Normal;
                }

                index += 1;
            }
        }
    }

    result
}
