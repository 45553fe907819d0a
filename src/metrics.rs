//! Prometheus metrics for the aggregation engine
//!
//! Metric families are registered in the default registry on first use.
//! Collectors resolve their labelled handles once, at construction, so the
//! update path never performs a label lookup.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, Gauge, GaugeVec, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // === Update Counters ===

    /// Updates per statistics name and outcome
    pub static ref UPDATES_TOTAL: CounterVec = register_counter_vec!(
        "stataggr_updates_total",
        "Total statistics updates",
        &["statistics", "status"]
    ).unwrap();

    // === Bucket Lifecycle ===

    /// Buckets created on first sight of a key
    pub static ref BUCKETS_CREATED: CounterVec = register_counter_vec!(
        "stataggr_buckets_created_total",
        "Total buckets created",
        &["statistics"]
    ).unwrap();

    /// Buckets removed by cleanup
    pub static ref BUCKETS_REMOVED: CounterVec = register_counter_vec!(
        "stataggr_buckets_removed_total",
        "Total buckets removed by cleanup",
        &["statistics"]
    ).unwrap();

    /// Buckets currently held per statistics name
    pub static ref ACTIVE_BUCKETS: GaugeVec = register_gauge_vec!(
        "stataggr_active_buckets",
        "Number of live buckets",
        &["statistics"]
    ).unwrap();

    // === Collection ===

    /// Collection passes per statistics name
    pub static ref COLLECTIONS_TOTAL: CounterVec = register_counter_vec!(
        "stataggr_collections_total",
        "Total collection passes",
        &["statistics", "cleanup"]
    ).unwrap();

    /// Collection pass duration
    pub static ref COLLECT_DURATION: HistogramVec = register_histogram_vec!(
        "stataggr_collect_duration_seconds",
        "Collection pass latency in seconds",
        &["statistics"],
        vec![0.0001, 0.001, 0.01, 0.1, 1.0]
    ).unwrap();

    // === Compilation ===

    /// Layout compilations by outcome
    pub static ref COMPILATIONS_TOTAL: CounterVec = register_counter_vec!(
        "stataggr_compilations_total",
        "Total bucket layout compilations",
        &["status"]
    ).unwrap();
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Metrics contain invalid UTF-8: {}", e))
}

/// Record a layout compilation
#[inline]
pub fn record_compilation(success: bool) {
    let status = if success { "success" } else { "error" };
    COMPILATIONS_TOTAL.with_label_values(&[status]).inc();
}

/// Labelled metric handles of one collector
#[derive(Debug, Clone)]
pub struct CollectorMetrics {
    updates_ok: Counter,
    updates_failed: Counter,
    buckets_created: Counter,
    buckets_removed: Counter,
    active_buckets: Gauge,
    collections: Counter,
    cleanups: Counter,
    collect_duration: Histogram,
}

impl CollectorMetrics {
    /// Resolve handles for `statistics`
    pub fn new(statistics: &str) -> Self {
        Self {
            updates_ok: UPDATES_TOTAL.with_label_values(&[statistics, "success"]),
            updates_failed: UPDATES_TOTAL.with_label_values(&[statistics, "error"]),
            buckets_created: BUCKETS_CREATED.with_label_values(&[statistics]),
            buckets_removed: BUCKETS_REMOVED.with_label_values(&[statistics]),
            active_buckets: ACTIVE_BUCKETS.with_label_values(&[statistics]),
            collections: COLLECTIONS_TOTAL.with_label_values(&[statistics, "false"]),
            cleanups: COLLECTIONS_TOTAL.with_label_values(&[statistics, "true"]),
            collect_duration: COLLECT_DURATION.with_label_values(&[statistics]),
        }
    }

    /// Record an update outcome
    #[inline]
    pub fn record_update(&self, success: bool) {
        if success {
            self.updates_ok.inc();
        } else {
            self.updates_failed.inc();
        }
    }

    /// Record a bucket creation
    #[inline]
    pub fn record_bucket_created(&self) {
        self.buckets_created.inc();
        self.active_buckets.inc();
    }

    /// Record a collection pass
    pub fn record_collection(&self, cleanup: bool, removed: usize, duration_secs: f64) {
        if cleanup {
            self.cleanups.inc();
        } else {
            self.collections.inc();
        }
        if removed > 0 {
            self.buckets_removed.inc_by(removed as f64);
            self.active_buckets.sub(removed as f64);
        }
        self.collect_duration.observe(duration_secs);
    }
}
