//! Core data types used throughout the aggregation engine
//!
//! # Key Types
//!
//! - **`Value`**: A single field value read from a statistics entry
//! - **`ValueType`**: The declared type of an entry field
//! - **`EntryTypeId`**: Identity of a concrete entry type
//!
//! # Example
//!
//! ```rust
//! use stataggr::types::{Value, ValueType};
//!
//! let latency = Value::from(42i64);
//! assert_eq!(latency.value_type(), ValueType::Int64);
//! assert_eq!(latency.cardinality(), 1);
//!
//! let hosts = Value::from(vec![Value::from("a"), Value::from("b")]);
//! assert_eq!(hosts.cardinality(), 2);
//! ```

use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

// ============================================================================
// Value
// ============================================================================

/// Field value read from a statistics entry
///
/// Values are used both as key parts and as aggregation input. Floats compare
/// and hash by their bit pattern so that a value can always serve as a key.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 64-bit floating point value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// UTF-8 string value
    String(String),
    /// Ordered collection of values
    List(Vec<Value>),
    /// String-keyed map of values
    Map(BTreeMap<String, Value>),
    /// Raw byte array
    Bytes(Vec<u8>),
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        self.value_type().name()
    }

    /// Get the value type this value belongs to
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int32,
            Value::Long(_) => ValueType::Int64,
            Value::Float(_) => ValueType::Float64,
            Value::Bool(_) => ValueType::Boolean,
            Value::String(_) => ValueType::String,
            Value::List(_) => ValueType::Collection,
            Value::Map(_) => ValueType::Map,
            Value::Bytes(_) => ValueType::Bytes,
        }
    }

    /// Try to get as i64 (widens 32-bit integers)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Number of elements this value contributes to a COUNT
    ///
    /// Collections, maps and byte arrays count their length; anything else
    /// counts as a single occurrence.
    pub fn cardinality(&self) -> usize {
        match self {
            Value::List(items) => items.len(),
            Value::Map(entries) => entries.len(),
            Value::Bytes(bytes) => bytes.len(),
            _ => 1,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(v) => v.hash(state),
            Value::Long(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Bool(v) => v.hash(state),
            Value::String(v) => v.hash(state),
            Value::List(v) => v.hash(state),
            Value::Map(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "\"{}\"", v),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

// ============================================================================
// ValueType
// ============================================================================

/// Declared type of an entry field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point
    Float64,
    /// Boolean
    Boolean,
    /// UTF-8 string
    String,
    /// Ordered collection
    Collection,
    /// String-keyed map
    Map,
    /// Byte array
    Bytes,
}

impl ValueType {
    /// Get the type name
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::Float64 => "float64",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
            ValueType::Collection => "collection",
            ValueType::Map => "map",
            ValueType::Bytes => "bytes",
        }
    }

    /// Parse from a type name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "int32" | "int" | "integer" => Some(ValueType::Int32),
            "int64" | "long" => Some(ValueType::Int64),
            "float64" | "float" | "double" => Some(ValueType::Float64),
            "boolean" | "bool" => Some(ValueType::Boolean),
            "string" | "str" => Some(ValueType::String),
            "collection" | "list" => Some(ValueType::Collection),
            "map" => Some(ValueType::Map),
            "bytes" => Some(ValueType::Bytes),
            _ => None,
        }
    }

    /// True for the signed integer types MIN/MAX/SUM/AVERAGE operate on
    pub fn is_signed_integer(&self) -> bool {
        matches!(self, ValueType::Int32 | ValueType::Int64)
    }

    /// Check whether a value is acceptable for a field of this type
    ///
    /// 64-bit integer fields accept 32-bit values; 32-bit fields accept
    /// 64-bit values and leave the range check to the caller.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::Int32 | ValueType::Int64 => {
                matches!(value, Value::Int(_) | Value::Long(_))
            }
            _ => value.value_type() == *self,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// EntryTypeId
// ============================================================================

/// Identity of a concrete statistics entry type
#[derive(Debug, Clone, Copy)]
pub struct EntryTypeId {
    id: TypeId,
    name: &'static str,
}

impl EntryTypeId {
    /// Identity of `T`
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Underlying `TypeId`
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

impl PartialEq for EntryTypeId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntryTypeId {}

impl Hash for EntryTypeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for EntryTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Strip the module path from a type name, keeping generic arguments intact
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base_end = full.find('<').unwrap_or(full.len());
    match full[..base_end].rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
