//! Integration tests for keyed statistics aggregation
//!
//! Exercises the public surface end to end:
//! 1. Aggregate resolution across keys
//! 2. Configuration failures and their stickiness
//! 3. Collection, filtering and cleanup
//! 4. Handler fan-out to writers

use parking_lot::Mutex;
use stataggr::aggregation::{AggregationType, CollectorPhase, ExportRecord, Representation};
use stataggr::engine::{ExpressionTable, StatisticsHandler, StatisticsManagerBuilder, StatisticsWriter};
use stataggr::error::{ConfigurationError, Error, ExpressionError, ValueError, WriterError};
use stataggr::schema::{DescriptorRegistry, FieldDescriptor, StatisticsEntry};
use stataggr::types::{EntryTypeId, Value, ValueType};
use stataggr::{Config, StatisticsManager};
use std::sync::Arc;

// ============================================================================
// Entry types
// ============================================================================

struct Request {
    region: &'static str,
    latency_ms: i32,
}

impl StatisticsEntry for Request {
    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::key("region", ValueType::String).with_getter(|r: &Request| r.region),
            FieldDescriptor::aggregated("latency_ms", ValueType::Int32, AggregationType::ALL)
                .with_getter(|r: &Request| r.latency_ms),
        ]
    }

    fn statistics_name() -> String {
        "requests".to_string()
    }
}

struct Batch {
    source: &'static str,
    items: Vec<i64>,
}

impl StatisticsEntry for Batch {
    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::key("source", ValueType::String).with_getter(|b: &Batch| b.source),
            FieldDescriptor::aggregated("items", ValueType::Collection, [AggregationType::Count])
                .with_getter(|b: &Batch| {
                    b.items.iter().copied().map(Value::from).collect::<Vec<Value>>()
                }),
        ]
    }
}

struct Login {
    user: &'static str,
}

impl StatisticsEntry for Login {
    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::key("host", ValueType::String).with_getter(|_: &Login| "web-1"),
            FieldDescriptor::aggregated("user", ValueType::String, [AggregationType::Min])
                .with_getter(|l: &Login| l.user),
        ]
    }
}

struct Transfer {
    account: Option<&'static str>,
    bytes: Option<i64>,
}

impl StatisticsEntry for Transfer {
    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::key("account", ValueType::String)
                .with_accessor(|t: &Transfer| t.account.map(Value::from)),
            FieldDescriptor::aggregated("bytes", ValueType::Int64, [AggregationType::Sum])
                .with_accessor(|t: &Transfer| t.bytes.map(Value::from)),
        ]
    }
}

struct Reading {
    sensor: &'static str,
    a: i64,
    b: Value,
}

impl StatisticsEntry for Reading {
    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::key("sensor", ValueType::String).with_getter(|r: &Reading| r.sensor),
            FieldDescriptor::aggregated("a", ValueType::Int64, [AggregationType::Sum])
                .with_getter(|r: &Reading| r.a),
            FieldDescriptor::aggregated("b", ValueType::Int32, [AggregationType::Sum])
                .with_getter(|r: &Reading| r.b.clone()),
        ]
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn manager_with(registry: DescriptorRegistry) -> StatisticsManager {
    StatisticsManagerBuilder::new()
        .with_descriptor_source(registry)
        .with_metrics(false)
        .build()
        .expect("manager should build")
}

fn request_manager() -> StatisticsManager {
    let registry = DescriptorRegistry::new();
    registry.register::<Request>();
    manager_with(registry)
}

fn update_request(manager: &StatisticsManager, region: &'static str, latency_ms: i32) {
    manager
        .update_statistics(
            &Request { region, latency_ms },
            EntryTypeId::of::<Request>(),
            "requests",
        )
        .expect("update should succeed");
}

fn sorted_by(records: &mut [ExportRecord], key: &str) {
    records.sort_by(|a, b| {
        let a = a.key_value(key).and_then(Value::as_str).unwrap_or_default().to_string();
        let b = b.key_value(key).and_then(Value::as_str).unwrap_or_default().to_string();
        a.cmp(&b)
    });
}

// ============================================================================
// Aggregate resolution
// ============================================================================

#[test]
fn test_region_latency_scenario() {
    let manager = request_manager();
    update_request(&manager, "us", 10);
    update_request(&manager, "us", 30);
    update_request(&manager, "eu", 7);

    let mut snapshot = manager.collect_statistics(Some("requests"), |_| true, false);
    let mut records = snapshot.remove("requests").expect("requests collected");
    assert_eq!(records.len(), 2);
    sorted_by(&mut records, "region");

    let eu = &records[0];
    assert_eq!(eu.key_value("region"), Some(&Value::from("eu")));
    assert_eq!(eu.aggregate("latency_ms", AggregationType::Min), Some(7));
    assert_eq!(eu.aggregate("latency_ms", AggregationType::Max), Some(7));
    assert_eq!(eu.aggregate("latency_ms", AggregationType::Sum), Some(7));
    assert_eq!(eu.aggregate("latency_ms", AggregationType::Count), Some(1));
    assert_eq!(eu.aggregate("latency_ms", AggregationType::Average), Some(7));

    let us = &records[1];
    assert_eq!(us.key_value("region"), Some(&Value::from("us")));
    assert_eq!(us.aggregate("latency_ms", AggregationType::Min), Some(10));
    assert_eq!(us.aggregate("latency_ms", AggregationType::Max), Some(30));
    assert_eq!(us.aggregate("latency_ms", AggregationType::Sum), Some(40));
    assert_eq!(us.aggregate("latency_ms", AggregationType::Count), Some(2));
    assert_eq!(us.aggregate("latency_ms", AggregationType::Average), Some(20));

    assert_eq!(
        us.column_names(),
        vec![
            "region",
            "latency_ms_min",
            "latency_ms_max",
            "latency_ms_sum",
            "latency_ms_count",
            "latency_ms_average",
        ]
    );
}

#[test]
fn test_average_truncates() {
    let manager = request_manager();
    update_request(&manager, "us", 1);
    update_request(&manager, "us", 2);

    let snapshot = manager.collect_statistics(None, |_| true, false);
    let record = &snapshot["requests"][0];
    assert_eq!(record.aggregate("latency_ms", AggregationType::Average), Some(1));
}

#[test]
fn test_count_of_collection_uses_length() {
    let registry = DescriptorRegistry::new();
    registry.register::<Batch>();
    let manager = manager_with(registry);

    for items in [vec![1, 2, 3], vec![4, 5, 6, 7, 8]] {
        manager
            .update_statistics(
                &Batch { source: "queue", items },
                EntryTypeId::of::<Batch>(),
                "batches",
            )
            .unwrap();
    }

    let snapshot = manager.collect_statistics(Some("batches"), |_| true, false);
    let record = &snapshot["batches"][0];
    assert_eq!(record.aggregate("items", AggregationType::Count), Some(8));
}

#[test]
fn test_missing_aggregated_value_is_skipped() {
    let registry = DescriptorRegistry::new();
    registry.register::<Transfer>();
    let manager = manager_with(registry);
    let entry_type = EntryTypeId::of::<Transfer>();

    manager
        .update_statistics(&Transfer { account: Some("a"), bytes: Some(100) }, entry_type, "transfers")
        .unwrap();
    manager
        .update_statistics(&Transfer { account: Some("a"), bytes: None }, entry_type, "transfers")
        .unwrap();

    let snapshot = manager.collect_statistics(Some("transfers"), |_| true, false);
    assert_eq!(snapshot["transfers"][0].aggregate("bytes", AggregationType::Sum), Some(100));
}

#[test]
fn test_missing_key_value_rejects_entry() {
    let registry = DescriptorRegistry::new();
    registry.register::<Transfer>();
    let manager = manager_with(registry);

    let err = manager
        .update_statistics(
            &Transfer { account: None, bytes: Some(5) },
            EntryTypeId::of::<Transfer>(),
            "transfers",
        )
        .unwrap_err();
    assert!(matches!(err, Error::Value(ValueError::MissingValue { .. })));

    // The rejected entry left no bucket behind
    let collector = manager.collector("transfers").expect("collector compiled");
    assert_eq!(collector.bucket_count(), 0);
    assert_eq!(collector.stats().rejected, 1);
}

// ============================================================================
// Configuration failures
// ============================================================================

#[test]
fn test_min_on_string_fails_at_first_update() {
    let registry = DescriptorRegistry::new();
    registry.register::<Login>();
    let manager = manager_with(registry);
    let login = Login { user: "ada" };

    assert_eq!(manager.phase("logins"), CollectorPhase::Uninitialized);
    let err = manager
        .update_statistics(&login, EntryTypeId::of::<Login>(), "logins")
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Configuration(ConfigurationError::UnsupportedAggregation {
            aggregation: AggregationType::Min,
            ..
        })
    ));
    assert_eq!(manager.phase("logins"), CollectorPhase::Failed);

    // The failure is remembered
    let again = manager
        .update_statistics(&login, EntryTypeId::of::<Login>(), "logins")
        .unwrap_err();
    assert_eq!(again.to_string(), err.to_string());
    assert!(manager.collect_statistics(Some("logins"), |_| true, false).is_empty());
    assert!(manager.statistics_names().is_empty());
}

#[test]
fn test_unregistered_entry_type() {
    let manager = manager_with(DescriptorRegistry::new());
    let err = manager
        .update_statistics(
            &Request { region: "us", latency_ms: 1 },
            EntryTypeId::of::<Request>(),
            "requests",
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Configuration(ConfigurationError::UnknownEntryType { .. })
    ));
}

#[test]
fn test_shape_mismatch_rejects_other_entry_type() {
    let registry = DescriptorRegistry::new();
    registry.register::<Request>();
    registry.register::<Batch>();
    let manager = manager_with(registry);

    update_request(&manager, "us", 10);
    let err = manager
        .update_statistics(
            &Batch { source: "queue", items: vec![1] },
            EntryTypeId::of::<Batch>(),
            "requests",
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Configuration(ConfigurationError::ShapeMismatch { .. })
    ));
    assert_eq!(manager.phase("requests"), CollectorPhase::Ready);
}

#[test]
fn test_bad_value_rejects_whole_entry() {
    let registry = DescriptorRegistry::new();
    registry.register::<Reading>();
    let manager = manager_with(registry);
    let update = |a: i64, b: Value| {
        manager.update_statistics(
            &Reading { sensor: "s1", a, b },
            EntryTypeId::of::<Reading>(),
            "readings",
        )
    };

    update(1, Value::Int(2)).unwrap();

    let err = update(100, Value::from("zz")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Value error: Invalid value for field b: expected int32, got string"
    );
    assert!(matches!(err, Error::Value(ValueError::TypeMismatch { .. })));

    let err = update(100, Value::Long(i64::from(i32::MAX) + 1)).unwrap_err();
    assert!(matches!(err, Error::Value(ValueError::OutOfRange { .. })));

    let snapshot = manager.collect_statistics(Some("readings"), |_| true, false);
    let record = &snapshot["readings"][0];
    assert_eq!(record.aggregate("a", AggregationType::Sum), Some(1));
    assert_eq!(record.aggregate("b", AggregationType::Sum), Some(2));
    assert_eq!(manager.collector("readings").unwrap().stats().rejected, 2);
}

#[test]
fn test_expression_failure_rejects_entry() {
    let registry = DescriptorRegistry::new();
    registry.register_fn(EntryTypeId::of::<Request>(), || {
        vec![
            FieldDescriptor::key("region", ValueType::String).with_getter(|r: &Request| r.region),
            FieldDescriptor::aggregated("latency_ms", ValueType::Int32, [AggregationType::Max])
                .with_getter(|r: &Request| r.latency_ms)
                .with_expression("non_negative"),
        ]
    });
    let evaluator = ExpressionTable::new().with("non_negative", |value| match value.as_i64() {
        Some(v) if v >= 0 => Ok(value),
        _ => Err(ExpressionError::new("negative latency")),
    });
    let manager = StatisticsManagerBuilder::new()
        .with_descriptor_source(registry)
        .with_evaluator(evaluator)
        .with_metrics(false)
        .build()
        .unwrap();

    update_request(&manager, "us", 5);
    let err = manager
        .update_statistics(
            &Request { region: "us", latency_ms: -1 },
            EntryTypeId::of::<Request>(),
            "requests",
        )
        .unwrap_err();
    assert!(matches!(err, Error::Value(ValueError::Expression { .. })));

    let snapshot = manager.collect_statistics(Some("requests"), |_| true, false);
    assert_eq!(snapshot["requests"][0].aggregate("latency_ms", AggregationType::Max), Some(5));
}

// ============================================================================
// Collection and cleanup
// ============================================================================

#[test]
fn test_collect_without_cleanup_is_repeatable() {
    let manager = request_manager();
    update_request(&manager, "us", 10);
    update_request(&manager, "eu", 20);

    let mut first = manager.collect_statistics(None, |_| true, false).remove("requests").unwrap();
    let mut second = manager.collect_statistics(None, |_| true, false).remove("requests").unwrap();
    sorted_by(&mut first, "region");
    sorted_by(&mut second, "region");
    assert_eq!(first, second);
}

#[test]
fn test_cleanup_removes_only_matching_buckets() {
    let manager = request_manager();
    update_request(&manager, "us", 10);
    update_request(&manager, "eu", 20);

    let only_us = |key: &stataggr::StatisticsKey| key.get("region") == Some(&Value::from("us"));
    let collected = manager.collect_statistics(Some("requests"), only_us, true);
    assert_eq!(collected["requests"].len(), 1);

    let rest = manager.collect_statistics(Some("requests"), |_| true, false);
    assert_eq!(rest["requests"].len(), 1);
    assert_eq!(rest["requests"][0].key_value("region"), Some(&Value::from("eu")));

    // A fresh update after cleanup starts from scratch
    update_request(&manager, "us", 3);
    let mut records = manager.collect_statistics(None, |_| true, false).remove("requests").unwrap();
    sorted_by(&mut records, "region");
    assert_eq!(records[1].aggregate("latency_ms", AggregationType::Count), Some(1));
    assert_eq!(records[1].aggregate("latency_ms", AggregationType::Sum), Some(3));
}

#[test]
fn test_unknown_name_collects_nothing() {
    let manager = request_manager();
    assert!(manager.collect_statistics(Some("nope"), |_| true, true).is_empty());
}

#[test]
fn test_export_record_json() {
    let manager = request_manager();
    update_request(&manager, "us", 4);
    let snapshot = manager.collect_statistics(None, |_| true, false);
    let json = snapshot["requests"][0].to_json().unwrap();
    assert!(json.starts_with(r#"{"region":"us","latency_ms_min":4"#));
}

#[test]
fn test_representations_agree() {
    for representation in [Representation::Plain, Representation::Atomic, Representation::Adder] {
        let registry = DescriptorRegistry::new();
        registry.register::<Request>();
        let manager = StatisticsManagerBuilder::new()
            .with_descriptor_source(registry)
            .with_default_representation(representation)
            .with_metrics(false)
            .build()
            .unwrap();

        for latency in [-5, 12, 40, 3] {
            update_request(&manager, "us", latency);
        }
        let snapshot = manager.collect_statistics(None, |_| true, false);
        let record = &snapshot["requests"][0];
        assert_eq!(record.aggregate("latency_ms", AggregationType::Min), Some(-5), "{representation}");
        assert_eq!(record.aggregate("latency_ms", AggregationType::Max), Some(40), "{representation}");
        assert_eq!(record.aggregate("latency_ms", AggregationType::Sum), Some(50), "{representation}");
        assert_eq!(record.aggregate("latency_ms", AggregationType::Average), Some(12), "{representation}");
    }
}

// ============================================================================
// Handler
// ============================================================================

#[derive(Clone, Default)]
struct RecordingWriter {
    batches: Arc<Mutex<Vec<(String, Vec<ExportRecord>)>>>,
}

impl StatisticsWriter for RecordingWriter {
    fn write_statistics(&self, statistics_name: &str, records: &[ExportRecord]) -> Result<(), WriterError> {
        self.batches
            .lock()
            .push((statistics_name.to_string(), records.to_vec()));
        Ok(())
    }
}

struct RejectingWriter;

impl StatisticsWriter for RejectingWriter {
    fn write_statistics(&self, _: &str, _: &[ExportRecord]) -> Result<(), WriterError> {
        Err(WriterError::new("sink unavailable"))
    }
}

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.monitoring.metrics_enabled = false;
    config
}

#[test]
fn test_handler_writes_every_statistics_name() {
    let recorder = RecordingWriter::default();
    let handler = StatisticsHandler::from_config(quiet_config(), None)
        .unwrap()
        .with_writer(recorder.clone());

    handler.handle(&Request { region: "us", latency_ms: 8 }).unwrap();
    handler.handle(&Batch { source: "queue", items: vec![1, 2] }).unwrap();

    assert_eq!(handler.write_statistics(None, |_| true, false).unwrap(), 2);

    let batches = recorder.batches.lock();
    let names: Vec<&str> = batches.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["Batch", "requests"]);
    assert_eq!(batches[0].1[0].aggregate("items", AggregationType::Count), Some(2));
}

#[test]
fn test_handler_reports_writer_failure_after_all_writers() {
    let recorder = RecordingWriter::default();
    let handler = StatisticsHandler::from_config(quiet_config(), None)
        .unwrap()
        .with_writer(RejectingWriter)
        .with_writer(recorder.clone());

    handler.handle(&Request { region: "eu", latency_ms: 1 }).unwrap();
    let err = handler.write_statistics(Some("requests"), |_| true, true).unwrap_err();
    match err {
        Error::Writer { statistics, message } => {
            assert_eq!(statistics, "requests");
            assert_eq!(message, "sink unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(recorder.batches.lock().len(), 1);
}

#[test]
fn test_handler_surfaces_configuration_errors() {
    let handler = StatisticsHandler::from_config(quiet_config(), None).unwrap();
    let err = handler.handle(&Login { user: "ada" }).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(handler.manager().phase("Login"), CollectorPhase::Failed);
}
