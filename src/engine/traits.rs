//! Collaborator traits consumed by the aggregation core

use crate::aggregation::ExportRecord;
use crate::error::{ConfigurationError, ExpressionError, WriterError};
use crate::schema::FieldDescriptor;
use crate::types::{EntryTypeId, Value};

// =============================================================================
// DescriptorSource Trait
// =============================================================================

/// Supplies the field descriptors of an entry type
///
/// Invoked once per statistics name, the first time the name is seen.
pub trait DescriptorSource: Send + Sync + 'static {
    /// Ordered field descriptors of `entry_type`
    fn describe(&self, entry_type: EntryTypeId) -> Result<Vec<FieldDescriptor>, ConfigurationError>;
}

// =============================================================================
// ExpressionEvaluator Trait
// =============================================================================

/// Transforms raw field values before aggregation
///
/// `evaluate` must be pure: it is called once per tagged field on every
/// update, possibly from many threads at once.
pub trait ExpressionEvaluator: Send + Sync + 'static {
    /// Apply the expression named `tag` to `value`
    fn evaluate(&self, tag: &str, value: Value) -> Result<Value, ExpressionError>;

    /// Check whether `tag` can be evaluated
    ///
    /// Consulted when a layout is compiled, so that unknown tags fail the
    /// statistics name instead of every update.
    fn supports(&self, _tag: &str) -> bool {
        true
    }
}

// =============================================================================
// StatisticsWriter Trait
// =============================================================================

/// Output sink for exported statistics
pub trait StatisticsWriter: Send + Sync + 'static {
    /// Consume the export records of one statistics name
    fn write_statistics(
        &self,
        statistics_name: &str,
        records: &[ExportRecord],
    ) -> Result<(), WriterError>;
}
