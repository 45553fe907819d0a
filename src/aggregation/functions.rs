//! Aggregation functions and their initializer policy
//!
//! Every stored aggregate is one of three commutative, associative operations
//! over signed integers: MIN, MAX and SUM. COUNT is a SUM of cardinalities and
//! AVERAGE is derived from SUM and COUNT at export time, so the order in which
//! concurrent updates land never changes the final aggregate.
//!
//! ```rust
//! use stataggr::aggregation::functions::{apply, average, initial_value};
//! use stataggr::aggregation::SimpleAggregation;
//!
//! let mut min: i64 = initial_value(SimpleAggregation::Min);
//! for v in [30, 10, 20] {
//!     min = apply(SimpleAggregation::Min, v, min);
//! }
//! assert_eq!(min, 10);
//! assert_eq!(average(7, 2), 3);
//! ```

use crate::types::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Aggregation Types
// ============================================================================

/// Aggregation requested on an entry field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    /// Smallest value seen
    Min,
    /// Largest value seen
    Max,
    /// Sum of all values
    Sum,
    /// Number of occurrences, or sum of cardinalities
    Count,
    /// SUM / COUNT, derived at export time
    Average,
}

impl AggregationType {
    /// All aggregation types in canonical export order
    pub const ALL: [AggregationType; 5] = [
        AggregationType::Min,
        AggregationType::Max,
        AggregationType::Sum,
        AggregationType::Count,
        AggregationType::Average,
    ];

    /// Lowercase name, used as export column suffix
    pub fn name(&self) -> &'static str {
        match self {
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::Sum => "sum",
            AggregationType::Count => "count",
            AggregationType::Average => "average",
        }
    }

    /// Parse from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "min" => Some(AggregationType::Min),
            "max" => Some(AggregationType::Max),
            "sum" => Some(AggregationType::Sum),
            "count" => Some(AggregationType::Count),
            "average" | "avg" | "mean" => Some(AggregationType::Average),
            _ => None,
        }
    }

    /// Check whether a field of `value_type` can carry this aggregation
    pub fn supports(&self, value_type: ValueType) -> bool {
        match self {
            AggregationType::Count => true,
            _ => value_type.is_signed_integer(),
        }
    }

    /// Aggregations this one is derived from
    pub fn dependencies(&self) -> &'static [AggregationType] {
        match self {
            AggregationType::Average => &[AggregationType::Sum, AggregationType::Count],
            _ => &[],
        }
    }

    /// The stored operation behind MIN, MAX and SUM
    pub fn simple(&self) -> Option<SimpleAggregation> {
        match self {
            AggregationType::Min => Some(SimpleAggregation::Min),
            AggregationType::Max => Some(SimpleAggregation::Max),
            AggregationType::Sum => Some(SimpleAggregation::Sum),
            AggregationType::Count | AggregationType::Average => None,
        }
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name().to_uppercase())
    }
}

/// Stored operation applied to an integer cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimpleAggregation {
    /// Keep the smaller value
    Min,
    /// Keep the larger value
    Max,
    /// Wrapping addition
    Sum,
}

impl SimpleAggregation {
    /// The aggregation type this operation implements
    pub fn aggregation_type(&self) -> AggregationType {
        match self {
            SimpleAggregation::Min => AggregationType::Min,
            SimpleAggregation::Max => AggregationType::Max,
            SimpleAggregation::Sum => AggregationType::Sum,
        }
    }
}

// ============================================================================
// Integer Semantics
// ============================================================================

/// Signed integer types the aggregation functions operate on
pub trait Integral: Copy + Ord {
    /// Smallest representable value
    const MIN: Self;
    /// Largest representable value
    const MAX: Self;
    /// Additive identity
    const ZERO: Self;

    /// Addition wrapping at the type's width
    fn wrapping_add(self, other: Self) -> Self;
}

impl Integral for i32 {
    const MIN: Self = i32::MIN;
    const MAX: Self = i32::MAX;
    const ZERO: Self = 0;

    fn wrapping_add(self, other: Self) -> Self {
        i32::wrapping_add(self, other)
    }
}

impl Integral for i64 {
    const MIN: Self = i64::MIN;
    const MAX: Self = i64::MAX;
    const ZERO: Self = 0;

    fn wrapping_add(self, other: Self) -> Self {
        i64::wrapping_add(self, other)
    }
}

/// Fold `incoming` into `current`
pub fn apply<T: Integral>(op: SimpleAggregation, incoming: T, current: T) -> T {
    match op {
        SimpleAggregation::Min => incoming.min(current),
        SimpleAggregation::Max => incoming.max(current),
        SimpleAggregation::Sum => current.wrapping_add(incoming),
    }
}

/// Identity element a fresh slot starts from
///
/// MIN starts at the largest representable value, MAX at the smallest and
/// SUM at zero, so the first update always replaces the initial value.
pub fn initial_value<T: Integral>(op: SimpleAggregation) -> T {
    match op {
        SimpleAggregation::Min => T::MAX,
        SimpleAggregation::Max => T::MIN,
        SimpleAggregation::Sum => T::ZERO,
    }
}

/// Amount a COUNT slot grows by for one value
pub fn count_increment(value: &Value) -> i64 {
    value.cardinality() as i64
}

/// AVERAGE from its SUM and COUNT slots
///
/// Truncating integer division; an empty bucket averages to zero.
pub fn average(sum: i64, count: i64) -> i64 {
    sum.checked_div(count).unwrap_or(0)
}

/// Width of the integer cells backing a field
///
/// Cells always store `i64`; the width decides initial values and where SUM
/// wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerWidth {
    /// 32-bit field
    I32,
    /// 64-bit field
    I64,
}

impl IntegerWidth {
    /// Width of a value type, if it is a signed integer
    pub fn of(value_type: ValueType) -> Option<Self> {
        match value_type {
            ValueType::Int32 => Some(IntegerWidth::I32),
            ValueType::Int64 => Some(IntegerWidth::I64),
            _ => None,
        }
    }

    /// Apply `op` at this width
    pub fn apply(self, op: SimpleAggregation, incoming: i64, current: i64) -> i64 {
        match self {
            IntegerWidth::I32 => {
                i64::from(apply::<i32>(op, incoming as i32, current as i32))
            }
            IntegerWidth::I64 => apply::<i64>(op, incoming, current),
        }
    }

    /// Initial value of `op` at this width
    pub fn initial_value(self, op: SimpleAggregation) -> i64 {
        match self {
            IntegerWidth::I32 => i64::from(initial_value::<i32>(op)),
            IntegerWidth::I64 => initial_value::<i64>(op),
        }
    }

    /// Wrap a 64-bit result back into this width
    pub fn wrap(self, value: i64) -> i64 {
        match self {
            IntegerWidth::I32 => i64::from(value as i32),
            IntegerWidth::I64 => value,
        }
    }

    /// Check that `value` is representable at this width
    pub fn contains(self, value: i64) -> bool {
        match self {
            IntegerWidth::I32 => i32::try_from(value).is_ok(),
            IntegerWidth::I64 => true,
        }
    }
}
