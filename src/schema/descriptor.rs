//! Entry and field descriptors
//!
//! Descriptors are the input of the schema compiler. They say which fields
//! of an entry type form the key and which are aggregated, and carry the
//! accessor closures used to read field values from an entry.

use crate::aggregation::{AggregationType, Representation};
use crate::types::{EntryTypeId, Value, ValueType};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Reads one field from a type-erased entry
///
/// Returns `None` when the entry carries no value for the field.
pub type Accessor = Arc<dyn Fn(&dyn Any) -> Option<Value> + Send + Sync>;

/// Description of a single entry field
///
/// # Example
///
/// ```rust
/// use stataggr::aggregation::AggregationType;
/// use stataggr::schema::FieldDescriptor;
/// use stataggr::types::ValueType;
///
/// struct Request {
///     region: String,
///     latency_ms: i64,
/// }
///
/// let region = FieldDescriptor::key("region", ValueType::String)
///     .with_getter(|r: &Request| r.region.clone());
/// let latency = FieldDescriptor::aggregated(
///     "latency_ms",
///     ValueType::Int64,
///     [AggregationType::Min, AggregationType::Average],
/// )
/// .with_getter(|r: &Request| r.latency_ms);
///
/// assert!(region.is_key());
/// assert!(latency.is_aggregated());
/// ```
#[derive(Clone)]
pub struct FieldDescriptor {
    name: String,
    value_type: ValueType,
    key: bool,
    aggregations: Option<Vec<AggregationType>>,
    expression: Option<String>,
    representation: Option<Representation>,
    accessor: Option<Accessor>,
}

impl FieldDescriptor {
    /// Describe a key field
    pub fn key(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            key: true,
            aggregations: None,
            expression: None,
            representation: None,
            accessor: None,
        }
    }

    /// Describe an aggregated field
    pub fn aggregated(
        name: impl Into<String>,
        value_type: ValueType,
        aggregations: impl IntoIterator<Item = AggregationType>,
    ) -> Self {
        Self {
            name: name.into(),
            value_type,
            key: false,
            aggregations: Some(aggregations.into_iter().collect()),
            expression: None,
            representation: None,
            accessor: None,
        }
    }

    /// Mark the field as a key field as well
    pub fn as_key(mut self) -> Self {
        self.key = true;
        self
    }

    /// Add aggregations to the field
    pub fn with_aggregations(
        mut self,
        aggregations: impl IntoIterator<Item = AggregationType>,
    ) -> Self {
        self.aggregations
            .get_or_insert_with(Vec::new)
            .extend(aggregations);
        self
    }

    /// Transform raw values through a named expression before use
    pub fn with_expression(mut self, tag: impl Into<String>) -> Self {
        self.expression = Some(tag.into());
        self
    }

    /// Request a storage representation for the field's aggregator slots
    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = Some(representation);
        self
    }

    /// Read the field through a typed accessor
    ///
    /// The accessor is only invoked for entries of type `T`.
    pub fn with_accessor<T, F>(mut self, accessor: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> Option<Value> + Send + Sync + 'static,
    {
        self.accessor = Some(Arc::new(move |entry: &dyn Any| {
            entry.downcast_ref::<T>().and_then(&accessor)
        }));
        self
    }

    /// Read the field through a typed getter that always yields a value
    pub fn with_getter<T, V, F>(self, getter: F) -> Self
    where
        T: Any,
        V: Into<Value>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.with_accessor(move |entry: &T| Some(getter(entry).into()))
    }

    /// Read the field through a type-erased accessor
    pub fn with_raw_accessor(mut self, accessor: Accessor) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared value type
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// True if the field is part of the key
    pub fn is_key(&self) -> bool {
        self.key
    }

    /// True if the field is aggregated
    pub fn is_aggregated(&self) -> bool {
        self.aggregations.is_some()
    }

    /// Requested aggregations, empty for pure key fields
    pub fn aggregations(&self) -> &[AggregationType] {
        self.aggregations.as_deref().unwrap_or(&[])
    }

    /// Expression tag, if any
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    /// Requested representation, if any
    pub fn representation(&self) -> Option<Representation> {
        self.representation
    }

    /// Accessor, if one was supplied
    pub fn accessor(&self) -> Option<&Accessor> {
        self.accessor.as_ref()
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("key", &self.key)
            .field("aggregations", &self.aggregations)
            .field("expression", &self.expression)
            .field("representation", &self.representation)
            .field("has_accessor", &self.accessor.is_some())
            .finish()
    }
}

/// Statistics name, entry type and ordered field descriptors
#[derive(Debug, Clone)]
pub struct EntryDescriptor {
    statistics_name: String,
    entry_type: EntryTypeId,
    fields: Vec<FieldDescriptor>,
}

impl EntryDescriptor {
    /// Create a descriptor
    pub fn new(
        statistics_name: impl Into<String>,
        entry_type: EntryTypeId,
        fields: Vec<FieldDescriptor>,
    ) -> Self {
        Self {
            statistics_name: statistics_name.into(),
            entry_type,
            fields,
        }
    }

    /// Statistics name
    pub fn statistics_name(&self) -> &str {
        &self.statistics_name
    }

    /// Entry type
    pub fn entry_type(&self) -> EntryTypeId {
        self.entry_type
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
}

/// A Rust type usable as a statistics entry
///
/// # Example
///
/// ```rust
/// use stataggr::aggregation::AggregationType;
/// use stataggr::schema::{FieldDescriptor, StatisticsEntry};
/// use stataggr::types::ValueType;
///
/// struct CacheHit {
///     cache: String,
///     bytes: i64,
/// }
///
/// impl StatisticsEntry for CacheHit {
///     fn fields() -> Vec<FieldDescriptor> {
///         vec![
///             FieldDescriptor::key("cache", ValueType::String)
///                 .with_getter(|e: &CacheHit| e.cache.clone()),
///             FieldDescriptor::aggregated("bytes", ValueType::Int64, [AggregationType::Sum])
///                 .with_getter(|e: &CacheHit| e.bytes),
///         ]
///     }
/// }
///
/// assert_eq!(CacheHit::statistics_name(), "CacheHit");
/// ```
pub trait StatisticsEntry: Any + Send + Sync + Sized {
    /// Ordered field descriptors of this entry type
    fn fields() -> Vec<FieldDescriptor>;

    /// Statistics name entries of this type are aggregated under
    fn statistics_name() -> String {
        EntryTypeId::of::<Self>().short_name().to_string()
    }
}
