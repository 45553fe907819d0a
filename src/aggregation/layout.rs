//! Schema compiler and bucket layouts
//!
//! The compiler validates an [`EntryDescriptor`] and turns it into an
//! immutable [`BucketLayout`], which is built once per statistics name and
//! reused on every update.
//!
//! # Layout
//!
//! ```text
//! descriptor                              layout columns
//! ──────────────────────────────────      ─────────────────────────────────────
//! region      key                   ───►  region          KeyField
//! latency_ms  MIN, MAX, AVERAGE     ───►  latency_ms_min  SimpleAggregatedField(MIN)  cell a0
//!                                         latency_ms_max  SimpleAggregatedField(MAX)  cell a1
//!                                         latency_ms_sum  SimpleAggregatedField(SUM)  cell a2  (implied)
//!                                         latency_ms_count CountField                 cell a3  (implied)
//!                                         latency_ms_average AverageField(a2 / a3)
//! ```
//!
//! AVERAGE never owns a cell: it implies SUM and COUNT and is computed from
//! them on export. Columns for one field appear in canonical order
//! (min, max, sum, count, average) after all key columns.

use super::accumulator::Representation;
use super::functions::{AggregationType, IntegerWidth, SimpleAggregation};
use crate::engine::traits::ExpressionEvaluator;
use crate::error::{ConfigurationError, ValueError};
use crate::schema::{Accessor, EntryDescriptor, FieldDescriptor};
use crate::types::{EntryTypeId, Value, ValueType};
use std::any::Any;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Slots
// ============================================================================

/// Location of an aggregator cell inside a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    /// Storage representation
    pub representation: Representation,
    /// Index within the bucket's storage for that representation
    pub index: usize,
    /// Operation folded into the cell
    pub op: SimpleAggregation,
    /// Integer width of the cell
    pub width: IntegerWidth,
}

impl CellRef {
    /// Value a fresh cell starts from
    pub fn initial_value(&self) -> i64 {
        self.width.initial_value(self.op)
    }
}

/// Slot kinds of a compiled layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Key value stored verbatim, indexing [`BucketLayout::key_fields`]
    KeyField {
        /// Key field index
        key: usize,
    },
    /// MIN, MAX or SUM cell fed with the field value
    SimpleAggregatedField {
        /// Operation
        aggregation: SimpleAggregation,
        /// Backing cell
        cell: CellRef,
    },
    /// COUNT cell fed with the value's cardinality
    CountField {
        /// Backing cell
        cell: CellRef,
    },
    /// SUM / COUNT, computed on export
    AverageField {
        /// SUM cell
        sum: CellRef,
        /// COUNT cell
        count: CellRef,
    },
}

/// Export column of a layout
#[derive(Debug, Clone)]
pub struct Column {
    name: Arc<str>,
    field: Arc<str>,
    aggregation: Option<AggregationType>,
    slot: Slot,
}

impl Column {
    /// Column name in export records
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared column name
    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    /// Entry field the column is derived from
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Aggregation exported, `None` for key columns
    pub fn aggregation(&self) -> Option<AggregationType> {
        self.aggregation
    }

    /// Slot backing the column
    pub fn slot(&self) -> Slot {
        self.slot
    }
}

// ============================================================================
// Compiled Fields
// ============================================================================

/// Field reader shared by key and aggregated fields
#[derive(Clone)]
pub struct CompiledField {
    name: Arc<str>,
    value_type: ValueType,
    width: Option<IntegerWidth>,
    expression: Option<String>,
    accessor: Accessor,
}

impl CompiledField {
    fn new(descriptor: &FieldDescriptor, accessor: Accessor) -> Self {
        Self {
            name: Arc::from(descriptor.name()),
            value_type: descriptor.value_type(),
            width: IntegerWidth::of(descriptor.value_type()),
            expression: descriptor.expression().map(str::to_string),
            accessor,
        }
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared field name
    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    /// Declared value type
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Expression tag, if any
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    /// Read, transform and validate the field value of `entry`
    ///
    /// Integers are normalized to the declared width so that equal keys are
    /// built from 32-bit and 64-bit inputs alike.
    pub fn read(
        &self,
        entry: &dyn Any,
        evaluator: Option<&dyn ExpressionEvaluator>,
    ) -> Result<Option<Value>, ValueError> {
        let Some(raw) = (self.accessor)(entry) else {
            return Ok(None);
        };

        let value = match (&self.expression, evaluator) {
            (None, _) => raw,
            (Some(tag), Some(evaluator)) => {
                evaluator
                    .evaluate(tag, raw)
                    .map_err(|e| ValueError::Expression {
                        field: self.name.to_string(),
                        tag: tag.clone(),
                        message: e.to_string(),
                    })?
            }
            (Some(tag), None) => {
                return Err(ValueError::Expression {
                    field: self.name.to_string(),
                    tag: tag.clone(),
                    message: "no expression evaluator configured".to_string(),
                })
            }
        };

        if !self.value_type.matches(&value) {
            return Err(ValueError::TypeMismatch {
                field: self.name.to_string(),
                expected: self.value_type.name(),
                actual: value.type_name(),
            });
        }

        match (self.width, value.as_i64()) {
            (Some(width), Some(v)) if !width.contains(v) => Err(ValueError::OutOfRange {
                field: self.name.to_string(),
                value: v,
                value_type: self.value_type.name(),
            }),
            (Some(IntegerWidth::I32), Some(v)) => Ok(Some(Value::Int(v as i32))),
            (Some(IntegerWidth::I64), Some(v)) => Ok(Some(Value::Long(v))),
            _ => Ok(Some(value)),
        }
    }
}

impl fmt::Debug for CompiledField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledField")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("expression", &self.expression)
            .finish()
    }
}

/// Input a cell takes from a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateInput {
    /// The integer value itself
    Value,
    /// The value's cardinality
    Cardinality,
}

/// One cell update driven by an aggregated field
#[derive(Debug, Clone, Copy)]
pub struct FieldUpdate {
    /// Target cell
    pub cell: CellRef,
    /// Input taken from the field value
    pub input: UpdateInput,
}

/// Aggregated field with the cells it feeds
#[derive(Debug, Clone)]
pub struct AggregatedField {
    field: CompiledField,
    aggregations: Vec<AggregationType>,
    representation: Representation,
    updates: Vec<FieldUpdate>,
}

impl AggregatedField {
    /// Field reader
    pub fn field(&self) -> &CompiledField {
        &self.field
    }

    /// Aggregations after expansion, in canonical order
    pub fn aggregations(&self) -> &[AggregationType] {
        &self.aggregations
    }

    /// Representation of the field's cells
    pub fn representation(&self) -> Representation {
        self.representation
    }

    /// Cell updates applied for each value
    pub fn updates(&self) -> &[FieldUpdate] {
        &self.updates
    }
}

// ============================================================================
// Bucket Layout
// ============================================================================

/// Immutable layout of every bucket of one statistics name
#[derive(Debug)]
pub struct BucketLayout {
    statistics_name: Arc<str>,
    entry_type: EntryTypeId,
    key_fields: Vec<CompiledField>,
    aggregated_fields: Vec<AggregatedField>,
    columns: Vec<Column>,
    plain_initials: Vec<i64>,
    atomic_initials: Vec<i64>,
    adder_initials: Vec<i64>,
    adder_shards: usize,
    update_count: usize,
}

impl BucketLayout {
    /// Statistics name
    pub fn statistics_name(&self) -> &str {
        &self.statistics_name
    }

    /// Entry type the layout was compiled for
    pub fn entry_type(&self) -> EntryTypeId {
        self.entry_type
    }

    /// Key fields in declaration order
    pub fn key_fields(&self) -> &[CompiledField] {
        &self.key_fields
    }

    /// Aggregated fields in declaration order
    pub fn aggregated_fields(&self) -> &[AggregatedField] {
        &self.aggregated_fields
    }

    /// Export columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in export order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Initial values of the plain cells
    pub(crate) fn plain_initials(&self) -> &[i64] {
        &self.plain_initials
    }

    /// Initial values of the atomic cells
    pub(crate) fn atomic_initials(&self) -> &[i64] {
        &self.atomic_initials
    }

    /// Initial values of the adder cells
    pub(crate) fn adder_initials(&self) -> &[i64] {
        &self.adder_initials
    }

    /// Shards per adder cell
    pub fn adder_shards(&self) -> usize {
        self.adder_shards
    }

    /// Upper bound of cell updates per entry
    pub(crate) fn update_count(&self) -> usize {
        self.update_count
    }
}

// ============================================================================
// Schema Compiler
// ============================================================================

/// Compiler options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Representation for fields that do not request one
    pub default_representation: Representation,
    /// Shards per adder cell
    pub adder_shards: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            default_representation: Representation::Atomic,
            adder_shards: 16,
        }
    }
}

/// Compiles entry descriptors into bucket layouts
#[derive(Debug, Clone, Default)]
pub struct SchemaCompiler {
    options: CompilerOptions,
}

impl SchemaCompiler {
    /// Create a compiler with the given options
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    /// Compiler options
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Validate `descriptor` and compile its layout
    pub fn compile(
        &self,
        descriptor: &EntryDescriptor,
        evaluator: Option<&dyn ExpressionEvaluator>,
    ) -> Result<BucketLayout, ConfigurationError> {
        if descriptor.statistics_name().trim().is_empty() {
            return Err(ConfigurationError::EmptyStatisticsName);
        }

        let mut seen = HashSet::new();
        for field in descriptor.fields() {
            if !seen.insert(field.name()) {
                return Err(ConfigurationError::DuplicateField {
                    field: field.name().to_string(),
                });
            }
            validate_field(field, evaluator)?;
        }

        let mut builder = LayoutBuilder::new(self.options.adder_shards);

        for field in descriptor.fields().iter().filter(|f| f.is_key()) {
            let accessor = required_accessor(field)?;
            builder.add_key(CompiledField::new(field, accessor));
        }

        for field in descriptor.fields().iter().filter(|f| f.is_aggregated()) {
            let accessor = required_accessor(field)?;
            let representation = field
                .representation()
                .unwrap_or(self.options.default_representation);
            builder.add_aggregated(CompiledField::new(field, accessor), field.aggregations(), representation)?;
        }

        builder.finish(Arc::from(descriptor.statistics_name()), descriptor.entry_type())
    }
}

fn required_accessor(field: &FieldDescriptor) -> Result<Accessor, ConfigurationError> {
    field
        .accessor()
        .cloned()
        .ok_or_else(|| ConfigurationError::MissingAccessor {
            field: field.name().to_string(),
        })
}

fn validate_field(
    field: &FieldDescriptor,
    evaluator: Option<&dyn ExpressionEvaluator>,
) -> Result<(), ConfigurationError> {
    let name = || field.name().to_string();

    if field.is_key() && field.is_aggregated() {
        return Err(ConfigurationError::KeyAndAggregated { field: name() });
    }
    if !field.is_key() && field.aggregations().is_empty() {
        return Err(ConfigurationError::NoAggregations { field: name() });
    }
    if field.accessor().is_none() {
        return Err(ConfigurationError::MissingAccessor { field: name() });
    }

    if let Some(tag) = field.expression() {
        if tag.trim().is_empty() {
            return Err(ConfigurationError::EmptyExpression { field: name() });
        }
        match evaluator {
            None => {
                return Err(ConfigurationError::NoExpressionEvaluator {
                    field: name(),
                    tag: tag.to_string(),
                })
            }
            Some(evaluator) if !evaluator.supports(tag) => {
                return Err(ConfigurationError::UnknownExpression {
                    field: name(),
                    tag: tag.to_string(),
                })
            }
            Some(_) => {}
        }
    }

    for aggregation in field.aggregations() {
        if !aggregation.supports(field.value_type()) {
            return Err(ConfigurationError::UnsupportedAggregation {
                field: name(),
                value_type: field.value_type().name(),
                aggregation: *aggregation,
            });
        }
    }

    Ok(())
}

/// Expand requested aggregations with the ones they derive from
fn expand(requested: &[AggregationType]) -> Vec<AggregationType> {
    let mut set: BTreeSet<AggregationType> = requested.iter().copied().collect();
    for aggregation in requested {
        set.extend(aggregation.dependencies().iter().copied());
    }
    // BTreeSet order follows the enum declaration: min, max, sum, count, average
    set.into_iter().collect()
}

struct LayoutBuilder {
    key_fields: Vec<CompiledField>,
    aggregated_fields: Vec<AggregatedField>,
    key_columns: Vec<Column>,
    aggregate_columns: Vec<Column>,
    plain_initials: Vec<i64>,
    atomic_initials: Vec<i64>,
    adder_initials: Vec<i64>,
    adder_shards: usize,
}

impl LayoutBuilder {
    fn new(adder_shards: usize) -> Self {
        Self {
            key_fields: Vec::new(),
            aggregated_fields: Vec::new(),
            key_columns: Vec::new(),
            aggregate_columns: Vec::new(),
            plain_initials: Vec::new(),
            atomic_initials: Vec::new(),
            adder_initials: Vec::new(),
            adder_shards: adder_shards.max(1),
        }
    }

    fn add_key(&mut self, field: CompiledField) {
        self.key_columns.push(Column {
            name: Arc::clone(&field.name),
            field: Arc::clone(&field.name),
            aggregation: None,
            slot: Slot::KeyField {
                key: self.key_fields.len(),
            },
        });
        self.key_fields.push(field);
    }

    fn allocate(
        &mut self,
        representation: Representation,
        op: SimpleAggregation,
        width: IntegerWidth,
    ) -> CellRef {
        let initials = match representation {
            Representation::Plain => &mut self.plain_initials,
            Representation::Atomic => &mut self.atomic_initials,
            Representation::Adder => &mut self.adder_initials,
        };
        let cell = CellRef {
            representation,
            index: initials.len(),
            op,
            width,
        };
        initials.push(cell.initial_value());
        cell
    }

    fn add_aggregated(
        &mut self,
        field: CompiledField,
        requested: &[AggregationType],
        representation: Representation,
    ) -> Result<(), ConfigurationError> {
        let aggregations = expand(requested);
        let mut updates = Vec::with_capacity(aggregations.len());
        let mut sum = None;
        let mut count = None;

        for &aggregation in &aggregations {
            let slot = match aggregation {
                AggregationType::Min | AggregationType::Max | AggregationType::Sum => {
                    let unsupported = || ConfigurationError::UnsupportedAggregation {
                        field: field.name.to_string(),
                        value_type: field.value_type.name(),
                        aggregation,
                    };
                    let op = aggregation.simple().ok_or_else(unsupported)?;
                    let width = field.width.ok_or_else(unsupported)?;
                    let cell = self.allocate(representation, op, width);
                    if op == SimpleAggregation::Sum {
                        sum = Some(cell);
                    }
                    updates.push(FieldUpdate {
                        cell,
                        input: UpdateInput::Value,
                    });
                    Slot::SimpleAggregatedField {
                        aggregation: op,
                        cell,
                    }
                }
                AggregationType::Count => {
                    let cell =
                        self.allocate(representation, SimpleAggregation::Sum, IntegerWidth::I64);
                    count = Some(cell);
                    updates.push(FieldUpdate {
                        cell,
                        input: UpdateInput::Cardinality,
                    });
                    Slot::CountField { cell }
                }
                AggregationType::Average => match (sum, count) {
                    (Some(sum), Some(count)) => Slot::AverageField { sum, count },
                    _ => {
                        return Err(ConfigurationError::UnsupportedAggregation {
                            field: field.name.to_string(),
                            value_type: field.value_type.name(),
                            aggregation,
                        })
                    }
                },
            };

            self.aggregate_columns.push(Column {
                name: Arc::from(format!("{}_{}", field.name, aggregation.name())),
                field: Arc::clone(&field.name),
                aggregation: Some(aggregation),
                slot,
            });
        }

        self.aggregated_fields.push(AggregatedField {
            field,
            aggregations,
            representation,
            updates,
        });
        Ok(())
    }

    fn finish(
        self,
        statistics_name: Arc<str>,
        entry_type: EntryTypeId,
    ) -> Result<BucketLayout, ConfigurationError> {
        let mut columns = self.key_columns;
        columns.extend(self.aggregate_columns);

        let mut names = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !names.insert(Arc::clone(&column.name)) {
                return Err(ConfigurationError::DuplicateField {
                    field: column.name.to_string(),
                });
            }
        }

        let update_count = self
            .aggregated_fields
            .iter()
            .map(|f| f.updates.len())
            .sum();

        Ok(BucketLayout {
            statistics_name,
            entry_type,
            key_fields: self.key_fields,
            aggregated_fields: self.aggregated_fields,
            columns,
            plain_initials: self.plain_initials,
            atomic_initials: self.atomic_initials,
            adder_initials: self.adder_initials,
            adder_shards: self.adder_shards,
            update_count,
        })
    }
}
