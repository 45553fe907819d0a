//! stataggr - In-process statistics aggregation engine
//!
//! This library folds streams of typed entries into keyed aggregates with:
//! - Schemas compiled once per statistics name into flat bucket layouts
//! - MIN, MAX, SUM, COUNT and AVERAGE over 32 and 64 bit integer fields
//! - Lock-free updates from many writer threads
//! - Snapshot export with optional cleanup that never loses an update

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod types;

/// Entry descriptors and the descriptor registry
pub mod schema;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Keyed aggregation core: layouts, buckets, collectors and the manager
pub mod aggregation;

// Re-export main types
pub use aggregation::{AggregationType, ExportRecord, Representation, StatisticsKey, StatisticsManager};
pub use config::Config;
pub use engine::{
    DescriptorSource, ExpressionEvaluator, ExpressionTable, StatisticsHandler,
    StatisticsManagerBuilder, StatisticsWriter,
};
pub use error::{ConfigurationError, Error, Result, ValueError};
pub use schema::{DescriptorRegistry, FieldDescriptor, StatisticsEntry};
pub use types::{EntryTypeId, Value, ValueType};
