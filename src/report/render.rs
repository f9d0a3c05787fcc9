//! CSV rendering
//!
//! Serializes one recipient group's rows as CSV text: a header taken from
//! the first row's key order, then one record per row. Data fields use
//! non-numeric quoting (numbers bare, everything else quoted), matching
//! what downstream spreadsheet imports expect from these reports.

use crate::error::{Error, Result};
use crate::report::normalize::NormalizedRow;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde_json::Value;

/// Render rows as CSV. Callers must special-case empty groups; rendering
/// zero rows is an internal error because there is no header to derive.
pub fn render(rows: &[NormalizedRow]) -> Result<String> {
    let first = rows
        .first()
        .ok_or_else(|| Error::Internal("Cannot render CSV for an empty row set".to_string()))?;

    let mut header_writer = WriterBuilder::new()
        .terminator(Terminator::CRLF)
        .from_writer(Vec::new());
    header_writer.write_record(first.keys())?;
    let buffer = header_writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("CSV header flush failed: {e}")))?;

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::NonNumeric)
        .terminator(Terminator::CRLF)
        .from_writer(buffer);
    for row in rows {
        writer.write_record(row.values().map(field_text))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("CSV flush failed: {e}")))?;

    String::from_utf8(bytes).map_err(|e| Error::Internal(format!("CSV is not UTF-8: {e}")))
}

/// String representation written for one cell.
fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> NormalizedRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn numbers_are_bare_and_strings_are_quoted() {
        let rows = vec![row(&[("n", json!(3)), ("s", json!("x"))])];
        let csv = render(&rows).unwrap();
        assert_eq!(csv, "n,s\r\n3,\"x\"\r\n");
    }

    #[test]
    fn booleans_and_nulls_are_quoted_strings() {
        let rows = vec![row(&[
            ("flag", json!(true)),
            ("gone", json!(null)),
            ("rate", json!(1.5)),
        ])];
        let csv = render(&rows).unwrap();
        assert_eq!(csv, "flag,gone,rate\r\n\"true\",\"\",1.5\r\n");
    }

    #[test]
    fn renders_one_record_per_row_in_order() {
        let rows = vec![
            row(&[("name", json!("Bob")), ("amount", json!(10))]),
            row(&[("name", json!("Sue")), ("amount", json!(20))]),
        ];
        let csv = render(&rows).unwrap();
        assert_eq!(csv, "name,amount\r\n\"Bob\",10\r\n\"Sue\",20\r\n");
    }

    #[test]
    fn output_round_trips_through_a_csv_parser() {
        let rows = vec![row(&[
            ("text", json!("with, comma and \"quote\"")),
            ("n", json!(7)),
        ])];
        let csv_text = render(&rows).unwrap();
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers, csv::StringRecord::from(vec!["text", "n"]));
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[0], "with, comma and \"quote\"");
        assert_eq!(&record[1], "7");
    }

    #[test]
    fn empty_row_set_is_an_error() {
        assert!(render(&[]).is_err());
    }
}
