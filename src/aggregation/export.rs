//! Export records produced by a collection pass

use super::functions::AggregationType;
use crate::types::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;

/// One exported bucket: key values followed by resolved aggregates
///
/// Columns are ordered as in [`BucketLayout::columns`](super::BucketLayout::columns).
/// Aggregate columns are named `{field}_{aggregation}`, e.g. `latency_ms_min`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    columns: Vec<(Arc<str>, Value)>,
}

impl ExportRecord {
    pub(crate) fn new(columns: Vec<(Arc<str>, Value)>) -> Self {
        Self { columns }
    }

    /// Value of a column
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name.as_ref() == column)
            .map(|(_, value)| value)
    }

    /// Value of a key field
    pub fn key_value(&self, field: &str) -> Option<&Value> {
        self.get(field)
    }

    /// Resolved aggregate of a field
    pub fn aggregate(&self, field: &str, aggregation: AggregationType) -> Option<i64> {
        let column = format!("{}_{}", field, aggregation.name());
        self.get(&column).and_then(Value::as_i64)
    }

    /// Iterate `(column, value)` pairs in export order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_ref(), value))
    }

    /// Column names in export order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_ref()).collect()
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the record has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Convert to a JSON object, preserving column order in the output text
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for ExportRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name.as_ref(), value)?;
        }
        map.end()
    }
}
