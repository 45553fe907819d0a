//! Registry of entry types and their field descriptors
//!
//! The registry is the default [`DescriptorSource`]: entry types register a
//! function producing their descriptors, and the manager asks for them the
//! first time a statistics name is seen.

use super::descriptor::{FieldDescriptor, StatisticsEntry};
use crate::engine::traits::DescriptorSource;
use crate::error::ConfigurationError;
use crate::types::EntryTypeId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

type DescribeFn = Arc<dyn Fn() -> Vec<FieldDescriptor> + Send + Sync>;

/// Thread-safe descriptor registry
#[derive(Default)]
pub struct DescriptorRegistry {
    /// Descriptor functions by entry type
    entries: RwLock<HashMap<EntryTypeId, DescribeFn>>,
}

impl DescriptorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a [`StatisticsEntry`] type
    pub fn register<T: StatisticsEntry>(&self) {
        self.register_fn(EntryTypeId::of::<T>(), T::fields);
    }

    /// Register a descriptor function for an entry type
    ///
    /// A later registration for the same type replaces the earlier one.
    pub fn register_fn<F>(&self, entry_type: EntryTypeId, describe: F)
    where
        F: Fn() -> Vec<FieldDescriptor> + Send + Sync + 'static,
    {
        self.entries.write().insert(entry_type, Arc::new(describe));
    }

    /// Check if an entry type is registered
    pub fn is_registered(&self, entry_type: EntryTypeId) -> bool {
        self.entries.read().contains_key(&entry_type)
    }

    /// Get number of registered entry types
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DescriptorSource for DescriptorRegistry {
    fn describe(&self, entry_type: EntryTypeId) -> Result<Vec<FieldDescriptor>, ConfigurationError> {
        // Clone the function out so user code never runs under the lock
        let describe = self.entries.read().get(&entry_type).cloned();
        match describe {
            Some(describe) => Ok(describe()),
            None => Err(ConfigurationError::UnknownEntryType {
                entry_type: entry_type.name().to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorRegistry")
            .field("entry_types", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::AggregationType;
    use crate::types::ValueType;

    struct Login {
        user: String,
    }

    impl StatisticsEntry for Login {
        fn fields() -> Vec<FieldDescriptor> {
            vec![FieldDescriptor::key("user", ValueType::String)
                .with_getter(|e: &Login| e.user.clone())]
        }
    }

    #[test]
    fn test_register_and_describe() {
        let registry = DescriptorRegistry::new();
        assert!(registry.is_empty());

        registry.register::<Login>();
        assert!(registry.is_registered(EntryTypeId::of::<Login>()));
        assert_eq!(registry.len(), 1);

        let fields = registry.describe(EntryTypeId::of::<Login>()).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name(), "user");
    }

    #[test]
    fn test_unknown_entry_type() {
        let registry = DescriptorRegistry::new();
        let err = registry.describe(EntryTypeId::of::<Login>()).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownEntryType { .. }));
    }

    #[test]
    fn test_register_fn_replaces() {
        let registry = DescriptorRegistry::new();
        let id = EntryTypeId::of::<u64>();
        registry.register_fn(id, Vec::new);
        registry.register_fn(id, || {
            vec![FieldDescriptor::aggregated("value", ValueType::Int64, [AggregationType::Sum])
                .with_getter(|v: &u64| *v as i64)]
        });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.describe(id).unwrap().len(), 1);
    }
}
