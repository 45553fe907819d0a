//! Composite statistics keys
//!
//! A key is the frozen set of key-field values of one entry. Parts are kept
//! sorted by field name, so two keys built from the same pairs in a different
//! order are equal. The hash is computed once in [`KeyBuilder::build`] and
//! reused for every map probe.

use crate::types::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Immutable composite key identifying one aggregation group
#[derive(Debug, Clone)]
pub struct StatisticsKey {
    parts: Box<[(Arc<str>, Value)]>,
    hash: u64,
}

impl StatisticsKey {
    /// Start building a key
    pub fn builder() -> KeyBuilder {
        KeyBuilder::new()
    }

    /// Value of a key field, if present
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.parts
            .binary_search_by(|(name, _)| name.as_ref().cmp(field))
            .ok()
            .map(|idx| &self.parts[idx].1)
    }

    /// Check whether the key has a field
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Number of key fields
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// True for the key of an entry type without key fields
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Iterate `(field, value)` pairs in field-name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.parts.iter().map(|(name, value)| (name.as_ref(), value))
    }

    /// Cached hash value
    pub fn hash_value(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for StatisticsKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.parts == other.parts
    }
}

impl Eq for StatisticsKey {}

impl Hash for StatisticsKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for StatisticsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, "}}")
    }
}

impl Serialize for StatisticsKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.parts.len()))?;
        for (name, value) in self.parts.iter() {
            map.serialize_entry(name.as_ref(), value)?;
        }
        map.end()
    }
}

/// Builder accumulating key parts in any order
#[derive(Debug, Default)]
pub struct KeyBuilder {
    parts: Vec<(Arc<str>, Value)>,
}

impl KeyBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Create a builder sized for `capacity` fields
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            parts: Vec::with_capacity(capacity),
        }
    }

    /// Add a part; a later value for the same field replaces the earlier one
    pub fn with_part(mut self, field: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.push(field, value);
        self
    }

    /// Add a part in place
    pub fn push(&mut self, field: impl Into<Arc<str>>, value: impl Into<Value>) {
        self.parts.push((field.into(), value.into()));
    }

    /// Freeze the key and compute its hash
    pub fn build(mut self) -> StatisticsKey {
        // Stable sort keeps insertion order among equal names; reversing
        // before dedup keeps the last write for each field.
        self.parts.reverse();
        self.parts.sort_by(|a, b| a.0.cmp(&b.0));
        self.parts.dedup_by(|a, b| a.0 == b.0);

        let mut hasher = DefaultHasher::new();
        for (name, value) in &self.parts {
            name.hash(&mut hasher);
            value.hash(&mut hasher);
        }

        StatisticsKey {
            parts: self.parts.into_boxed_slice(),
            hash: hasher.finish(),
        }
    }
}
