//! Keyed Statistics Aggregation
//!
//! This module folds a stream of entries into per-key aggregates
//! (MIN, MAX, SUM, COUNT, AVERAGE) under many concurrent writers, and
//! exports them as flat records on demand.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Entry Descriptor             │
//! │  key fields + aggregated fields     │
//! └─────────────────────────────────────┘
//!                  ↓  SchemaCompiler
//! ┌─────────────────────────────────────┐
//! │          Bucket Layout              │
//! │  cell slots + export columns        │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │     Statistics Collector            │
//! │  StatisticsKey → Bucket (DashMap)   │
//! └─────────────────────────────────────┘
//!                  ↓  collect_statistics
//! ┌─────────────────────────────────────┐
//! │         Export Records              │
//! │  key columns + aggregate columns    │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Key Components
//!
//! - **Schema Compiler**: validates descriptors once per statistics name and
//!   assigns every aggregate a cell in one of three representations
//!   - `plain`: bucket-wide mutex, cheapest memory
//!   - `atomic`: one atomic per cell, lock-free
//!   - `adder`: cache-padded shards per cell for write-heavy hot keys
//! - **Statistics Key**: ordered, hash-cached tuple of key field values
//! - **Collector**: concurrent key → bucket map with race-free bucket creation
//!   and retirement on cleanup
//! - **Manager**: lazy, at-most-once compilation of collectors by name
//!
//! # Example
//!
//! ```rust
//! use stataggr::aggregation::{AggregationType, StatisticsManager};
//! use stataggr::schema::{DescriptorRegistry, FieldDescriptor, StatisticsEntry};
//! use stataggr::types::{EntryTypeId, ValueType};
//! use std::sync::Arc;
//!
//! struct Request {
//!     region: String,
//!     latency: i32,
//! }
//!
//! impl StatisticsEntry for Request {
//!     fn fields() -> Vec<FieldDescriptor> {
//!         vec![
//!             FieldDescriptor::key("region", ValueType::String)
//!                 .with_getter(|r: &Request| r.region.clone()),
//!             FieldDescriptor::aggregated(
//!                 "latency",
//!                 ValueType::Int32,
//!                 [AggregationType::Max, AggregationType::Average],
//!             )
//!             .with_getter(|r: &Request| r.latency),
//!         ]
//!     }
//! }
//!
//! let registry = Arc::new(DescriptorRegistry::new());
//! registry.register::<Request>();
//! let manager = StatisticsManager::new(registry);
//!
//! let request = Request { region: "us".into(), latency: 10 };
//! manager
//!     .update_statistics(&request, EntryTypeId::of::<Request>(), "requests")
//!     .unwrap();
//!
//! let snapshot = manager.collect_statistics(Some("requests"), |_| true, false);
//! let record = &snapshot["requests"][0];
//! assert_eq!(record.aggregate("latency", AggregationType::Max), Some(10));
//! ```

pub mod accumulator;
pub mod bucket;
pub mod collector;
pub mod export;
pub mod functions;
pub mod key;
pub mod layout;
pub mod manager;

// Re-export main types from functions
pub use functions::{AggregationType, IntegerWidth, SimpleAggregation};

// Re-export main types from accumulator
pub use accumulator::{AtomicCell, Representation, ShardedCell};

// Re-export main types from key
pub use key::{KeyBuilder, StatisticsKey};

// Re-export main types from layout
pub use layout::{BucketLayout, CellRef, Column, CompilerOptions, SchemaCompiler, Slot};

// Re-export main types from bucket and export
pub use bucket::Bucket;
pub use export::ExportRecord;

// Re-export main types from collector and manager
pub use collector::{CollectorStatsSnapshot, StatisticsCollector};
pub use manager::{CollectorPhase, StatisticsManager};
