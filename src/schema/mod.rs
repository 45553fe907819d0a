//! Entry schema description
//!
//! Field descriptors describe how a statistics entry is split into key fields
//! and aggregated fields. The [`DescriptorRegistry`] maps entry types to their
//! descriptors and serves them to the manager on first use of a statistics
//! name.

pub mod descriptor;
pub mod registry;

pub use descriptor::{Accessor, EntryDescriptor, FieldDescriptor, StatisticsEntry};
pub use registry::DescriptorRegistry;
