//! Sample rows: literal data captured from `INSERT` statements or supplied by the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single literal cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl SampleValue {
    /// Numeric literal as written; falls back to text for numbers JSON cannot carry.
    pub fn number_from_literal(literal: &str) -> Self {
        match literal.parse::<serde_json::Number>() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Text(literal.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Column name (lowercased) → value.
pub type SampleRow = BTreeMap<String, SampleValue>;

/// Sample rows per table, keyed by lowercased table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleRows(BTreeMap<String, Vec<SampleRow>>);

impl SampleRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Rows for `table` (case-insensitive). Empty when none were captured.
    pub fn rows(&self, table: &str) -> &[SampleRow] {
        self.0
            .get(&table.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    /// Append a row, keeping at most `limit` rows per table. Returns false when the row was dropped.
    pub fn push(&mut self, table: &str, row: SampleRow, limit: usize) -> bool {
        let rows = self.0.entry(table.to_ascii_lowercase()).or_default();
        if rows.len() >= limit {
            return false;
        }
        rows.push(row);
        true
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Lowercase table and column keys so lookups match canonical names.
    pub fn normalized(self) -> Self {
        let mut out = BTreeMap::new();
        for (table, rows) in self.0 {
            let rows: Vec<SampleRow> = rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|(k, v)| (k.to_ascii_lowercase(), v))
                        .collect()
                })
                .collect();
            out.entry(table.to_ascii_lowercase())
                .or_insert_with(Vec::new)
                .extend(rows);
        }
        Self(out)
    }

    /// Merge `explicit` over `self`: a table present in `explicit` replaces
    /// whatever was captured for it.
    pub fn merged_with(mut self, explicit: SampleRows) -> Self {
        for (table, rows) in explicit.normalized().0 {
            self.0.insert(table, rows);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, SampleValue)]) -> SampleRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_push_respects_limit() {
        let mut rows = SampleRows::new();
        assert!(rows.push("T", row(&[("a", SampleValue::Bool(true))]), 1));
        assert!(!rows.push("t", row(&[("a", SampleValue::Bool(false))]), 1));
        assert_eq!(rows.row_count("t"), 1);
    }

    #[test]
    fn test_explicit_rows_replace_captured_rows_per_table() {
        let mut captured = SampleRows::new();
        captured.push("customers", row(&[("name", SampleValue::Text("a".into()))]), 20);
        captured.push("products", row(&[("sku", SampleValue::Text("p".into()))]), 20);

        let explicit: SampleRows =
            serde_json::from_str(r#"{"Customers": [{"Name": "x"}, {"Name": null}]}"#).unwrap();
        let merged = captured.merged_with(explicit);

        assert_eq!(merged.row_count("customers"), 2);
        assert_eq!(merged.rows("customers")[1]["name"], SampleValue::Null);
        assert_eq!(merged.row_count("products"), 1);
    }

    #[test]
    fn test_untagged_values_deserialize_by_shape() {
        let r: SampleRow = serde_json::from_str(r#"{"a": 1.5, "b": "x", "c": false, "d": null}"#)
            .unwrap();
        assert!(matches!(r["a"], SampleValue::Number(_)));
        assert_eq!(r["b"], SampleValue::Text("x".into()));
        assert_eq!(r["c"], SampleValue::Bool(false));
        assert!(r["d"].is_null());
        assert_eq!(SampleValue::number_from_literal("42").to_string(), "42");
    }
}
