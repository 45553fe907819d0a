//! Error types for the aggregation engine

use crate::aggregation::AggregationType;
use thiserror::Error;

/// Main error type for the aggregation engine
#[derive(Error, Debug)]
pub enum Error {
    /// Schema problem detected while compiling a statistics name
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Bad entry submitted to an already compiled collector
    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    /// Output sink failure during statistics export
    #[error("Writer error for statistics '{statistics}': {message}")]
    Writer {
        /// Statistics name being written
        statistics: String,
        /// Failure reported by the writer
        message: String,
    },
}

/// Schema compilation errors
///
/// These are fatal for the statistics name they were raised for: the manager
/// remembers the error and replays it on every subsequent update.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Aggregation requested on a value type that cannot carry it
    #[error("Field {field} is of unsupported type {value_type} for aggregation {aggregation}")]
    UnsupportedAggregation {
        /// Field name
        field: String,
        /// Declared value type of the field
        value_type: &'static str,
        /// Requested aggregation
        aggregation: AggregationType,
    },

    /// Field declared both as a key and as an aggregated field
    #[error("Field {field} cannot be both a key and an aggregated field")]
    KeyAndAggregated {
        /// Field name
        field: String,
    },

    /// Field declared twice in the same descriptor
    #[error("Field {field} is declared more than once")]
    DuplicateField {
        /// Field name
        field: String,
    },

    /// Declared field without an accessor
    #[error("Field {field} has no accessor")]
    MissingAccessor {
        /// Field name
        field: String,
    },

    /// Aggregated field with an empty aggregation set
    #[error("Field {field} is aggregated but declares no aggregation")]
    NoAggregations {
        /// Field name
        field: String,
    },

    /// Expression tag present but blank
    #[error("Field {field} has an empty expression")]
    EmptyExpression {
        /// Field name
        field: String,
    },

    /// Expression tag on a field while no evaluator is configured
    #[error("Field {field} uses expression '{tag}' but no expression evaluator is configured")]
    NoExpressionEvaluator {
        /// Field name
        field: String,
        /// Expression tag
        tag: String,
    },

    /// Expression tag the configured evaluator does not know
    #[error("Field {field} uses unknown expression '{tag}'")]
    UnknownExpression {
        /// Field name
        field: String,
        /// Expression tag
        tag: String,
    },

    /// Descriptor source has no description for the entry type
    #[error("No descriptor registered for entry type {entry_type}")]
    UnknownEntryType {
        /// Entry type name
        entry_type: String,
    },

    /// Statistics name is empty
    #[error("Statistics name cannot be empty")]
    EmptyStatisticsName,

    /// Entry type differs from the type the statistics name was compiled for
    #[error("Statistics '{statistics}' was compiled for {expected}, got {actual}")]
    ShapeMismatch {
        /// Statistics name
        statistics: String,
        /// Entry type the collector was compiled for
        expected: String,
        /// Entry type of the rejected update
        actual: String,
    },

    /// Failure reported by the descriptor source itself
    #[error("Descriptor error: {0}")]
    Descriptor(String),

    /// Invalid engine settings
    #[error("Invalid settings: {0}")]
    Settings(String),
}

/// Per-update errors
///
/// A value error rejects a single entry and leaves the collector untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    /// Key field accessor returned no value
    #[error("Missing value for key field {field}")]
    MissingValue {
        /// Field name
        field: String,
    },

    /// Value type does not match the declared field type
    #[error("Invalid value for field {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Field name
        field: String,
        /// Declared value type
        expected: &'static str,
        /// Type of the submitted value
        actual: &'static str,
    },

    /// Integer does not fit the declared width
    #[error("Value {value} out of range for field {field} of type {value_type}")]
    OutOfRange {
        /// Field name
        field: String,
        /// Submitted value
        value: i64,
        /// Declared value type
        value_type: &'static str,
    },

    /// Expression evaluator rejected the value
    #[error("Expression '{tag}' failed on field {field}: {message}")]
    Expression {
        /// Field name
        field: String,
        /// Expression tag
        tag: String,
        /// Evaluator message
        message: String,
    },

    /// Entry is not of the type the collector was compiled for
    #[error("Entry type mismatch: expected {expected}")]
    EntryTypeMismatch {
        /// Expected entry type
        expected: String,
    },
}

/// Error returned by an expression evaluator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ExpressionError(pub String);

impl ExpressionError {
    /// Create a new expression error
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error returned by a statistics writer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct WriterError(pub String);

impl WriterError {
    /// Create a new writer error
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
