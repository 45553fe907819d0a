//! Statistics manager builder
//!
//! Wires the descriptor source, the optional expression evaluator and the
//! configuration into a [`StatisticsManager`].

use super::traits::{DescriptorSource, ExpressionEvaluator};
use crate::aggregation::{Representation, SchemaCompiler, StatisticsManager};
use crate::config::Config;
use crate::error::{ConfigurationError, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Builder for configuring a statistics manager
pub struct StatisticsManagerBuilder {
    descriptors: Option<Arc<dyn DescriptorSource>>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    config: Config,
}

impl StatisticsManagerBuilder {
    /// Create a new manager builder
    pub fn new() -> Self {
        Self {
            descriptors: None,
            evaluator: None,
            config: Config::default(),
        }
    }

    /// Set the descriptor source
    pub fn with_descriptor_source<D>(mut self, descriptors: D) -> Self
    where
        D: DescriptorSource,
    {
        self.descriptors = Some(Arc::new(descriptors));
        self
    }

    /// Set the descriptor source from an existing Arc
    ///
    /// Use this when the caller keeps registering entry types after the
    /// manager is built.
    pub fn with_descriptor_source_arc(mut self, descriptors: Arc<dyn DescriptorSource>) -> Self {
        self.descriptors = Some(descriptors);
        self
    }

    /// Set the expression evaluator
    pub fn with_evaluator<E>(mut self, evaluator: E) -> Self
    where
        E: ExpressionEvaluator,
    {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    /// Set the expression evaluator from an existing Arc
    pub fn with_evaluator_arc(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Set engine configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Override the default representation
    pub fn with_default_representation(mut self, representation: Representation) -> Self {
        self.config.collector.default_representation = representation;
        self
    }

    /// Enable or disable Prometheus metrics
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.config.monitoring.metrics_enabled = enabled;
        self
    }

    /// Build the manager
    pub fn build(self) -> Result<StatisticsManager> {
        let descriptors = self.descriptors.ok_or_else(|| {
            ConfigurationError::Descriptor("No descriptor source configured".to_string())
        })?;

        self.config
            .validate()
            .map_err(ConfigurationError::Settings)?;

        debug!(
            representation = %self.config.collector.default_representation,
            adder_shards = self.config.collector.adder_shards,
            "Building statistics manager"
        );

        let manager = StatisticsManager::from_parts(
            descriptors,
            self.evaluator,
            SchemaCompiler::new(self.config.compiler_options()),
            self.config.collector.initial_capacity,
            self.config.monitoring.metrics_enabled,
        );

        info!(
            metrics_enabled = self.config.monitoring.metrics_enabled,
            "Statistics manager ready"
        );
        Ok(manager)
    }
}

impl Default for StatisticsManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
