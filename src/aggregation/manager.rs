//! Statistics manager: registry of collectors by statistics name
//!
//! Collectors are compiled lazily, on the first update for a name:
//!
//! ```text
//! UNINITIALIZED ──first update──► COMPILING ──ok──► READY   (never recompiled)
//!                                     │
//!                                     └──error──► FAILED  (error replayed on every update)
//! ```
//!
//! Lookups take a shared read lock. Compilation happens under a dedicated
//! build mutex with a second lookup after acquiring it, so there is at most
//! one compilation per name and every caller observes the same collector.

use super::collector::StatisticsCollector;
use super::export::ExportRecord;
use super::key::StatisticsKey;
use super::layout::SchemaCompiler;
use crate::engine::traits::{DescriptorSource, ExpressionEvaluator};
use crate::error::{ConfigurationError, Result};
use crate::metrics;
use crate::schema::EntryDescriptor;
use crate::types::EntryTypeId;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Lifecycle phase of a statistics name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorPhase {
    /// Never updated
    Uninitialized,
    /// Compiled and serving updates
    Ready,
    /// Compilation failed; the name is unusable
    Failed,
}

#[derive(Clone)]
enum CollectorState {
    Ready(Arc<StatisticsCollector>),
    Failed(ConfigurationError),
}

impl CollectorState {
    fn phase(&self) -> CollectorPhase {
        match self {
            CollectorState::Ready(_) => CollectorPhase::Ready,
            CollectorState::Failed(_) => CollectorPhase::Failed,
        }
    }
}

/// Routes entries to per-name collectors
pub struct StatisticsManager {
    collectors: RwLock<HashMap<String, CollectorState>>,
    build_lock: Mutex<()>,
    descriptors: Arc<dyn DescriptorSource>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    compiler: SchemaCompiler,
    initial_capacity: usize,
    metrics_enabled: bool,
}

impl StatisticsManager {
    /// Create a manager with default options
    pub fn new(descriptors: Arc<dyn DescriptorSource>) -> Self {
        Self::from_parts(descriptors, None, SchemaCompiler::default(), 0, false)
    }

    pub(crate) fn from_parts(
        descriptors: Arc<dyn DescriptorSource>,
        evaluator: Option<Arc<dyn ExpressionEvaluator>>,
        compiler: SchemaCompiler,
        initial_capacity: usize,
        metrics_enabled: bool,
    ) -> Self {
        Self {
            collectors: RwLock::new(HashMap::new()),
            build_lock: Mutex::new(()),
            descriptors,
            evaluator,
            compiler,
            initial_capacity,
            metrics_enabled,
        }
    }

    /// Fold an entry into the statistics named `statistics_name`
    ///
    /// The first update for a name compiles its collector. A compilation
    /// error is returned for that update and for every later one; an entry
    /// type other than the one the name was compiled for is rejected with
    /// [`ConfigurationError::ShapeMismatch`].
    pub fn update_statistics(
        &self,
        entry: &dyn Any,
        entry_type: EntryTypeId,
        statistics_name: &str,
    ) -> Result<()> {
        let collector = self.collector_for(statistics_name, entry_type)?;
        if collector.entry_type() != entry_type {
            warn!(
                statistics = %statistics_name,
                expected = %collector.entry_type(),
                actual = %entry_type,
                "Entry shape mismatch"
            );
            return Err(ConfigurationError::ShapeMismatch {
                statistics: statistics_name.to_string(),
                expected: collector.entry_type().name().to_string(),
                actual: entry_type.name().to_string(),
            }
            .into());
        }
        collector.update_statistics(entry)?;
        Ok(())
    }

    /// Export statistics of one name, or of every ready name
    ///
    /// Results are keyed by statistics name. A name that is unknown or
    /// failed yields no entry.
    pub fn collect_statistics<F>(
        &self,
        statistics_name: Option<&str>,
        filter: F,
        cleanup: bool,
    ) -> HashMap<String, Vec<ExportRecord>>
    where
        F: Fn(&StatisticsKey) -> bool,
    {
        let targets: Vec<Arc<StatisticsCollector>> = {
            let collectors = self.collectors.read();
            match statistics_name {
                Some(name) => match collectors.get(name) {
                    Some(CollectorState::Ready(collector)) => vec![Arc::clone(collector)],
                    _ => Vec::new(),
                },
                None => collectors
                    .values()
                    .filter_map(|state| match state {
                        CollectorState::Ready(collector) => Some(Arc::clone(collector)),
                        CollectorState::Failed(_) => None,
                    })
                    .collect(),
            }
        };

        targets
            .into_iter()
            .map(|collector| {
                let records = collector.collect_statistics(&filter, cleanup);
                (collector.name().to_string(), records)
            })
            .collect()
    }

    /// Collector of a ready statistics name
    pub fn collector(&self, statistics_name: &str) -> Option<Arc<StatisticsCollector>> {
        match self.collectors.read().get(statistics_name) {
            Some(CollectorState::Ready(collector)) => Some(Arc::clone(collector)),
            _ => None,
        }
    }

    /// Lifecycle phase of a statistics name
    pub fn phase(&self, statistics_name: &str) -> CollectorPhase {
        self.collectors
            .read()
            .get(statistics_name)
            .map(CollectorState::phase)
            .unwrap_or(CollectorPhase::Uninitialized)
    }

    /// Names of all ready collectors, sorted
    pub fn statistics_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collectors
            .read()
            .iter()
            .filter(|(_, state)| state.phase() == CollectorPhase::Ready)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn collector_for(
        &self,
        statistics_name: &str,
        entry_type: EntryTypeId,
    ) -> std::result::Result<Arc<StatisticsCollector>, ConfigurationError> {
        // Fast path: already compiled
        if let Some(state) = self.collectors.read().get(statistics_name) {
            return Self::resolve(state);
        }

        // Slow path: single builder
        let _build = self.build_lock.lock();

        // Double-check after acquiring the build lock
        if let Some(state) = self.collectors.read().get(statistics_name) {
            return Self::resolve(state);
        }

        let state = match self.build(statistics_name, entry_type) {
            Ok(collector) => {
                metrics::record_compilation(true);
                info!(
                    statistics = %statistics_name,
                    entry_type = %entry_type,
                    columns = collector.layout().columns().len(),
                    "Compiled statistics collector"
                );
                CollectorState::Ready(Arc::new(collector))
            }
            Err(e) => {
                metrics::record_compilation(false);
                warn!(
                    statistics = %statistics_name,
                    entry_type = %entry_type,
                    error = %e,
                    "Statistics compilation failed"
                );
                CollectorState::Failed(e)
            }
        };

        self.collectors
            .write()
            .insert(statistics_name.to_string(), state.clone());
        Self::resolve(&state)
    }

    fn resolve(
        state: &CollectorState,
    ) -> std::result::Result<Arc<StatisticsCollector>, ConfigurationError> {
        match state {
            CollectorState::Ready(collector) => Ok(Arc::clone(collector)),
            CollectorState::Failed(e) => Err(e.clone()),
        }
    }

    fn build(
        &self,
        statistics_name: &str,
        entry_type: EntryTypeId,
    ) -> std::result::Result<StatisticsCollector, ConfigurationError> {
        let fields = self.descriptors.describe(entry_type)?;
        let descriptor = EntryDescriptor::new(statistics_name, entry_type, fields);
        let layout = self.compiler.compile(&descriptor, self.evaluator.as_deref())?;

        let collector =
            StatisticsCollector::with_capacity(layout, self.evaluator.clone(), self.initial_capacity);
        Ok(if self.metrics_enabled {
            collector.with_metrics()
        } else {
            collector
        })
    }
}

impl fmt::Debug for StatisticsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatisticsManager")
            .field("collectors", &self.collectors.read().len())
            .field("compiler", &self.compiler)
            .field("has_evaluator", &self.evaluator.is_some())
            .finish()
    }
}
