//! Synchronous statistics handler
//!
//! The handler is the convenient front door of the engine. It registers
//! entry types on first sight, routes entries to the manager under their
//! statistics name, and hands collected snapshots to the configured writers.

use super::builder::StatisticsManagerBuilder;
use super::traits::{ExpressionEvaluator, StatisticsWriter};
use crate::aggregation::{StatisticsKey, StatisticsManager};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::schema::{DescriptorRegistry, StatisticsEntry};
use crate::types::EntryTypeId;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry point combining a manager, its registry and output writers
pub struct StatisticsHandler {
    manager: Arc<StatisticsManager>,
    registry: Arc<DescriptorRegistry>,
    writers: Vec<Arc<dyn StatisticsWriter>>,
}

impl StatisticsHandler {
    /// Create a handler around an existing manager and its registry
    ///
    /// `registry` must be the descriptor source `manager` was built with.
    pub fn new(manager: Arc<StatisticsManager>, registry: Arc<DescriptorRegistry>) -> Self {
        Self {
            manager,
            registry,
            writers: Vec::new(),
        }
    }

    /// Create a handler with its own registry and manager
    pub fn from_config(
        config: Config,
        evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    ) -> Result<Self> {
        let registry = Arc::new(DescriptorRegistry::new());
        let mut builder = StatisticsManagerBuilder::new()
            .with_descriptor_source_arc(registry.clone())
            .with_config(config);
        if let Some(evaluator) = evaluator {
            builder = builder.with_evaluator_arc(evaluator);
        }
        Ok(Self::new(Arc::new(builder.build()?), registry))
    }

    /// Add an output writer
    pub fn with_writer<W>(mut self, writer: W) -> Self
    where
        W: StatisticsWriter,
    {
        self.writers.push(Arc::new(writer));
        self
    }

    /// Underlying manager
    pub fn manager(&self) -> &Arc<StatisticsManager> {
        &self.manager
    }

    /// Descriptor registry
    pub fn registry(&self) -> &Arc<DescriptorRegistry> {
        &self.registry
    }

    /// Fold an entry into the statistics of its type
    pub fn handle<T: StatisticsEntry>(&self, entry: &T) -> Result<()> {
        let entry_type = EntryTypeId::of::<T>();
        if !self.registry.is_registered(entry_type) {
            self.registry.register::<T>();
        }
        self.manager
            .update_statistics(entry, entry_type, &T::statistics_name())
    }

    /// Collect statistics and hand them to every writer
    ///
    /// The snapshot is complete before any writer runs. A failing writer
    /// does not stop the others; the first failure is returned once all
    /// writers were called. Returns the number of records exported.
    pub fn write_statistics<F>(
        &self,
        statistics_name: Option<&str>,
        filter: F,
        cleanup: bool,
    ) -> Result<usize>
    where
        F: Fn(&StatisticsKey) -> bool,
    {
        let snapshot = self
            .manager
            .collect_statistics(statistics_name, filter, cleanup);

        let mut names: Vec<&String> = snapshot.keys().collect();
        names.sort();

        let mut exported = 0;
        let mut first_error = None;
        for name in names {
            let records = &snapshot[name];
            exported += records.len();
            for writer in &self.writers {
                if let Err(e) = writer.write_statistics(name, records) {
                    warn!(statistics = %name, error = %e, "Statistics writer failed");
                    first_error.get_or_insert_with(|| Error::Writer {
                        statistics: name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        debug!(
            exported,
            writers = self.writers.len(),
            cleanup,
            "Wrote statistics"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(exported),
        }
    }
}

impl fmt::Debug for StatisticsHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatisticsHandler")
            .field("manager", &self.manager)
            .field("registry", &self.registry)
            .field("writers", &self.writers.len())
            .finish()
    }
}
