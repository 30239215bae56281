//! Small accessors for reading snake_case JSON rows.
//!
//! Shared by the per-entity `from_row` mappings. Missing optional columns
//! become `None`; only identity columns are allowed to fail a mapping.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Read a required Uuid column. `None` fails the whole row mapping.
pub(crate) fn uuid_field(row: &Value, column: &str) -> Option<Uuid> {
    row.get(column)?.as_str().and_then(|s| Uuid::parse_str(s).ok())
}

/// Read a string column, defaulting to empty when absent or null.
pub(crate) fn str_or_empty(row: &Value, column: &str) -> String {
    row.get(column)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

pub(crate) fn opt_str(row: &Value, column: &str) -> Option<String> {
    row.get(column)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

pub(crate) fn opt_i64(row: &Value, column: &str) -> Option<i64> {
    row.get(column).and_then(Value::as_i64)
}

pub(crate) fn bool_or_false(row: &Value, column: &str) -> bool {
    row.get(column).and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn str_vec(row: &Value, column: &str) -> Vec<String> {
    row.get(column)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Parse an RFC 3339 `created_at` column. Unparseable timestamps fall back
/// to the Unix epoch so a single bad row cannot sink a whole fetch.
pub(crate) fn timestamp_or_epoch(row: &Value, column: &str) -> DateTime<Utc> {
    row.get(column)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH)
}
