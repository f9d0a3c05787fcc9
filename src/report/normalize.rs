//! Row normalization
//!
//! Redash reports an ordered column list alongside rows whose field order
//! is arbitrary. Normalization rebuilds each row as an insertion-ordered
//! map keyed in column order, so the CSV header and every record line up.

use crate::error::{Error, Result};
use crate::redash::Column;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// A row whose iteration order matches the query's column order.
pub type NormalizedRow = IndexMap<String, Value>;

/// Reorder every row's fields to the given column order.
///
/// A row missing a declared column is a hard error: substituting a default
/// would silently misalign the rendered CSV. Duplicate column names
/// collapse to one entry (the later occurrence wins), matching how the
/// upstream result would be consumed as a mapping; callers should avoid
/// duplicate friendly names in the query itself.
pub fn normalize(rows: &[Map<String, Value>], columns: &[Column]) -> Result<Vec<NormalizedRow>> {
    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let mut normalized = NormalizedRow::with_capacity(columns.len());
            for column in columns {
                let value = row.get(&column.friendly_name).cloned().ok_or_else(|| {
                    Error::MissingColumn {
                        column: column.friendly_name.clone(),
                        row: index,
                    }
                })?;
                normalized.insert(column.friendly_name.clone(), value);
            }
            Ok(normalized)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns(names: &[&str]) -> Vec<Column> {
        names
            .iter()
            .map(|n| Column {
                friendly_name: n.to_string(),
            })
            .collect()
    }

    fn row(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn key_order_follows_columns_regardless_of_input_order() {
        let cols = columns(&["c1", "c2", "c3"]);
        let rows = vec![
            row(&[("c3", json!(3)), ("c1", json!(1)), ("c2", json!(2))]),
            row(&[("c2", json!("b")), ("c3", json!("c")), ("c1", json!("a"))]),
        ];
        let normalized = normalize(&rows, &cols).unwrap();
        for r in &normalized {
            let keys: Vec<&str> = r.keys().map(String::as_str).collect();
            assert_eq!(keys, vec!["c1", "c2", "c3"]);
        }
        assert_eq!(normalized[0]["c1"], json!(1));
        assert_eq!(normalized[1]["c3"], json!("c"));
    }

    #[test]
    fn missing_column_is_a_hard_error() {
        let cols = columns(&["c1", "c2"]);
        let rows = vec![
            row(&[("c1", json!(1)), ("c2", json!(2))]),
            row(&[("c1", json!(1))]),
        ];
        let err = normalize(&rows, &cols).unwrap_err();
        match err {
            Error::MissingColumn { column, row } => {
                assert_eq!(column, "c2");
                assert_eq!(row, 1);
            }
            other => panic!("expected MissingColumn, got {other}"),
        }
    }

    #[test]
    fn duplicate_column_names_collapse_to_one_entry() {
        let cols = columns(&["c1", "c1"]);
        let rows = vec![row(&[("c1", json!(1))])];
        let normalized = normalize(&rows, &cols).unwrap();
        assert_eq!(normalized[0].len(), 1);
        assert_eq!(normalized[0]["c1"], json!(1));
    }

    #[test]
    fn zero_rows_normalize_to_zero_rows() {
        let cols = columns(&["c1"]);
        assert!(normalize(&[], &cols).unwrap().is_empty());
    }
}
