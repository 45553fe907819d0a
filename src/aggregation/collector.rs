//! Statistics collector: one bucket layout plus a concurrent key→bucket map
//!
//! # Update protocol
//!
//! ```text
//! entry ──► read key fields ──► KeyBuilder::build ──┐
//!       └─► read + evaluate aggregated fields ──────┤  (buffered, nothing mutated yet)
//!                                                   ▼
//!                         buckets.get(key) ── hit ──► bucket.apply(pending)
//!                               │ miss
//!                               ▼
//!              allocate bucket, entry(key): vacant ─► insert ─► apply
//!                                           occupied ─► drop ours, apply to winner
//! ```
//!
//! All fallible work happens before the bucket is resolved, so a rejected
//! entry neither touches a slot nor leaves an empty bucket behind.

use super::bucket::{Bucket, PendingUpdate};
use super::export::ExportRecord;
use super::functions::count_increment;
use super::key::{KeyBuilder, StatisticsKey};
use super::layout::{BucketLayout, UpdateInput};
use crate::engine::traits::ExpressionEvaluator;
use crate::error::ValueError;
use crate::metrics::CollectorMetrics;
use crate::types::EntryTypeId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

// ============================================================================
// Collector Stats
// ============================================================================

/// Lock-free counters of one collector
#[derive(Debug, Default)]
pub struct CollectorStats {
    updates: AtomicU64,
    rejected: AtomicU64,
    buckets_created: AtomicU64,
    insert_races_lost: AtomicU64,
    retired_retries: AtomicU64,
    buckets_removed: AtomicU64,
    collections: AtomicU64,
}

impl CollectorStats {
    /// Take a consistent-enough snapshot for reporting
    pub fn snapshot(&self) -> CollectorStatsSnapshot {
        CollectorStatsSnapshot {
            updates: self.updates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            buckets_created: self.buckets_created.load(Ordering::Relaxed),
            insert_races_lost: self.insert_races_lost.load(Ordering::Relaxed),
            retired_retries: self.retired_retries.load(Ordering::Relaxed),
            buckets_removed: self.buckets_removed.load(Ordering::Relaxed),
            collections: self.collections.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CollectorStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStatsSnapshot {
    /// Updates applied
    pub updates: u64,
    /// Updates rejected with a value error
    pub rejected: u64,
    /// Buckets created
    pub buckets_created: u64,
    /// Bucket allocations discarded because another writer inserted first
    pub insert_races_lost: u64,
    /// Updates redirected from a bucket retired by cleanup
    pub retired_retries: u64,
    /// Buckets removed by cleanup
    pub buckets_removed: u64,
    /// Collection passes
    pub collections: u64,
}

impl fmt::Display for CollectorStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "updates={} rejected={} buckets_created={} races_lost={} retired_retries={} removed={} collections={}",
            self.updates,
            self.rejected,
            self.buckets_created,
            self.insert_races_lost,
            self.retired_retries,
            self.buckets_removed,
            self.collections
        )
    }
}

// ============================================================================
// Statistics Collector
// ============================================================================

/// Aggregates all entries of one statistics name
pub struct StatisticsCollector {
    layout: Arc<BucketLayout>,
    buckets: DashMap<StatisticsKey, Arc<Bucket>>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    stats: CollectorStats,
    metrics: Option<CollectorMetrics>,
}

impl StatisticsCollector {
    /// Create a collector for a compiled layout
    pub fn new(layout: BucketLayout, evaluator: Option<Arc<dyn ExpressionEvaluator>>) -> Self {
        Self::with_capacity(layout, evaluator, 0)
    }

    /// Create a collector with room for `capacity` buckets
    pub fn with_capacity(
        layout: BucketLayout,
        evaluator: Option<Arc<dyn ExpressionEvaluator>>,
        capacity: usize,
    ) -> Self {
        Self {
            layout: Arc::new(layout),
            buckets: DashMap::with_capacity(capacity),
            evaluator,
            stats: CollectorStats::default(),
            metrics: None,
        }
    }

    /// Record Prometheus metrics for this collector
    pub fn with_metrics(mut self) -> Self {
        self.metrics = Some(CollectorMetrics::new(self.layout.statistics_name()));
        self
    }

    /// Statistics name
    pub fn name(&self) -> &str {
        self.layout.statistics_name()
    }

    /// Entry type the collector accepts
    pub fn entry_type(&self) -> EntryTypeId {
        self.layout.entry_type()
    }

    /// Compiled layout
    pub fn layout(&self) -> &BucketLayout {
        &self.layout
    }

    /// Number of live buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Collector counters
    pub fn stats(&self) -> CollectorStatsSnapshot {
        self.stats.snapshot()
    }

    /// Fold one entry into the bucket of its key
    pub fn update_statistics(&self, entry: &dyn Any) -> Result<(), ValueError> {
        let result = self.apply_entry(entry);
        match &result {
            Ok(()) => {
                self.stats.updates.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(statistics = %self.name(), error = %e, "Rejected statistics entry");
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_update(result.is_ok());
        }
        result
    }

    fn apply_entry(&self, entry: &dyn Any) -> Result<(), ValueError> {
        let layout = &*self.layout;
        if entry.type_id() != layout.entry_type().type_id() {
            return Err(ValueError::EntryTypeMismatch {
                expected: layout.entry_type().name().to_string(),
            });
        }
        let evaluator = self.evaluator.as_deref();

        let mut key = KeyBuilder::with_capacity(layout.key_fields().len());
        for field in layout.key_fields() {
            let value = field
                .read(entry, evaluator)?
                .ok_or_else(|| ValueError::MissingValue {
                    field: field.name().to_string(),
                })?;
            key.push(Arc::clone(field.name_arc()), value);
        }
        let key = key.build();

        let mut pending: Vec<PendingUpdate> = Vec::with_capacity(layout.update_count());
        for aggregated in layout.aggregated_fields() {
            let field = aggregated.field();
            let Some(value) = field.read(entry, evaluator)? else {
                continue;
            };
            for update in aggregated.updates() {
                let incoming = match update.input {
                    UpdateInput::Value => {
                        value.as_i64().ok_or_else(|| ValueError::TypeMismatch {
                            field: field.name().to_string(),
                            expected: field.value_type().name(),
                            actual: value.type_name(),
                        })?
                    }
                    UpdateInput::Cardinality => count_increment(&value),
                };
                pending.push((update.cell, incoming));
            }
        }

        trace!(statistics = %self.name(), key = %key, cells = pending.len(), "Applying statistics entry");

        loop {
            let bucket = self.resolve(&key);
            if bucket.apply(&pending) {
                return Ok(());
            }
            // Retired by a concurrent cleanup after we resolved it. The
            // mapping is normally gone already; never retry into it.
            self.buckets
                .remove_if(&key, |_, current| Arc::ptr_eq(current, &bucket));
            self.stats.retired_retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Find the bucket of `key`, creating it on first sight
    fn resolve(&self, key: &StatisticsKey) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return Arc::clone(bucket.value());
        }

        // Allocate outside the shard lock; the entry API decides the winner
        let candidate = Arc::new(Bucket::new(&self.layout, key.clone()));
        match self.buckets.entry(key.clone()) {
            Entry::Occupied(existing) => {
                self.stats.insert_races_lost.fetch_add(1, Ordering::Relaxed);
                debug!(statistics = %self.name(), key = %key, "Lost bucket insert race");
                Arc::clone(existing.get())
            }
            Entry::Vacant(vacant) => {
                let bucket = Arc::clone(vacant.insert(candidate).value());
                self.stats.buckets_created.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics {
                    metrics.record_bucket_created();
                }
                debug!(statistics = %self.name(), key = %key, "Created bucket");
                bucket
            }
        }
    }

    /// Export every bucket whose key matches `filter`
    ///
    /// With `cleanup`, matching buckets are removed in the same pass. The
    /// filter runs while a map shard is read-locked and must not call back
    /// into this collector.
    pub fn collect_statistics<F>(&self, filter: F, cleanup: bool) -> Vec<ExportRecord>
    where
        F: Fn(&StatisticsKey) -> bool,
    {
        let start = Instant::now();

        let matching: Vec<Arc<Bucket>> = self
            .buckets
            .iter()
            .filter(|entry| filter(entry.key()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut records = Vec::with_capacity(matching.len());
        let mut removed = 0;
        for bucket in matching {
            if cleanup {
                // Only the pass that actually removes a bucket exports it
                let taken = self
                    .buckets
                    .remove_if(bucket.key(), |_, current| Arc::ptr_eq(current, &bucket));
                if taken.is_none() {
                    continue;
                }
                bucket.retire();
                removed += 1;
            }
            records.push(bucket.export(&self.layout));
        }

        self.stats.collections.fetch_add(1, Ordering::Relaxed);
        if removed > 0 {
            self.stats
                .buckets_removed
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        let elapsed = start.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_collection(cleanup, removed, elapsed.as_secs_f64());
        }
        if removed > 0 {
            info!(
                statistics = %self.name(),
                exported = records.len(),
                removed,
                elapsed_us = elapsed.as_micros() as u64,
                "Collected and removed statistics buckets"
            );
        } else {
            debug!(
                statistics = %self.name(),
                exported = records.len(),
                elapsed_us = elapsed.as_micros() as u64,
                "Collected statistics"
            );
        }

        records
    }
}

impl fmt::Debug for StatisticsCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatisticsCollector")
            .field("name", &self.name())
            .field("buckets", &self.bucket_count())
            .field("has_evaluator", &self.evaluator.is_some())
            .finish()
    }
}
