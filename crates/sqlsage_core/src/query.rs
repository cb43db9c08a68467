use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Value;

/// Result of one executed statement.
///
/// Rows are ordered column→value records so the result is directly
/// JSON-encodable for the caller; drivers convert their native cells
/// through `Value::into_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl QueryOutput {
    pub fn empty(elapsed: Duration) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            elapsed,
        }
    }

    /// Build a result from positional rows, pairing values with columns.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>, elapsed: Duration) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .cloned()
                    .zip(row.into_iter().map(Value::into_json))
                    .collect()
            })
            .collect();

        Self {
            columns,
            rows,
            elapsed,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pair_columns_with_serialized_values() {
        let output = QueryOutput::from_rows(
            vec!["id".to_string(), "name".to_string()],
            vec![vec![Value::Int(1), Value::Text("ada".to_string())]],
            Duration::from_millis(12),
        );

        assert_eq!(output.row_count(), 1);
        assert_eq!(output.rows[0]["id"], serde_json::json!(1));
        assert_eq!(output.rows[0]["name"], serde_json::json!("ada"));
    }

    #[test]
    fn elapsed_round_trips_as_seconds() {
        let output = QueryOutput::empty(Duration::from_millis(1500));
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["elapsed"], serde_json::json!(1.5));

        let back: QueryOutput = serde_json::from_value(json).unwrap();
        assert_eq!(back.elapsed, Duration::from_millis(1500));
    }
}
