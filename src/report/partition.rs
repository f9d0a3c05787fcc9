//! Recipient partitioning
//!
//! The destination spec is either a literal address list (direct mode,
//! selected by the presence of an `@`) or the name of a column whose value
//! picks the recipient for each row (split mode).

use crate::error::{Error, Result};
use crate::report::normalize::NormalizedRow;
use indexmap::IndexMap;
use serde_json::Value;

/// The rows destined for one outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientGroup {
    /// Literal address list (direct mode) or a partition-column value
    /// (split mode). Address trimming happens at send time.
    pub recipient_key: String,
    pub rows: Vec<NormalizedRow>,
}

/// Split rows into recipient groups.
///
/// Direct mode always yields exactly one group holding all rows, even when
/// there are none; split mode yields one group per distinct column value in
/// first-seen order, so zero rows yield zero groups. Every row lands in
/// exactly one group and keeps its source order.
pub fn partition(rows: Vec<NormalizedRow>, destination_spec: &str) -> Result<Vec<RecipientGroup>> {
    if destination_spec.trim().is_empty() {
        return Err(Error::Partition(
            "Destination spec is empty: expected an address list or a column name".to_string(),
        ));
    }

    if destination_spec.contains('@') {
        return Ok(vec![RecipientGroup {
            recipient_key: destination_spec.to_string(),
            rows,
        }]);
    }

    let mut groups: IndexMap<String, Vec<NormalizedRow>> = IndexMap::new();
    for row in rows {
        let key = row
            .get(destination_spec)
            .map(group_key)
            .unwrap_or_default();
        groups.entry(key).or_default().push(row);
    }

    Ok(groups
        .into_iter()
        .map(|(recipient_key, rows)| RecipientGroup {
            recipient_key,
            rows,
        })
        .collect())
}

fn group_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
