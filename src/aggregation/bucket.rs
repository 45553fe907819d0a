//! Buckets: the mutable aggregate record of one key
//!
//! A bucket stores its cells in three arrays, one per representation. Plain
//! cells share a single mutex that an update takes once for all of them;
//! atomic and adder cells are updated without locking.
//!
//! Every update also holds the bucket's retirement gate for reading. The
//! gate is a sharded lock, so concurrent readers of a hot key touch only
//! their own shard. A cleanup pass removes the bucket from the store and then retires it under
//! the write side of the gate, which waits for in-flight updates to land. An
//! update that arrives after retirement sees the flag and is redirected to a
//! fresh bucket, so no update is lost across a cleanup.

use super::accumulator::{finish, AtomicCell, Representation, ShardedCell};
use super::export::ExportRecord;
use super::functions::average;
use super::key::StatisticsKey;
use super::layout::{BucketLayout, CellRef, Slot};
use crate::types::Value;
use crossbeam_utils::sync::ShardedLock;
use parking_lot::{Mutex, MutexGuard};
use std::sync::PoisonError;

/// Pending cell update: target cell and incoming value
pub(crate) type PendingUpdate = (CellRef, i64);

/// Aggregates of one distinct key
#[derive(Debug)]
pub struct Bucket {
    key: StatisticsKey,
    retired: ShardedLock<bool>,
    plain: Mutex<Box<[i64]>>,
    atomics: Box<[AtomicCell]>,
    adders: Box<[ShardedCell]>,
}

impl Bucket {
    /// Allocate a bucket with every cell at its initial value
    pub(crate) fn new(layout: &BucketLayout, key: StatisticsKey) -> Self {
        let shards = layout.adder_shards();
        Self {
            key,
            retired: ShardedLock::new(false),
            plain: Mutex::new(layout.plain_initials().into()),
            atomics: layout
                .atomic_initials()
                .iter()
                .map(|&initial| AtomicCell::new(initial))
                .collect(),
            adders: layout
                .adder_initials()
                .iter()
                .map(|&initial| ShardedCell::new(shards, initial))
                .collect(),
        }
    }

    /// Key of the bucket
    pub fn key(&self) -> &StatisticsKey {
        &self.key
    }

    /// True once the bucket was removed by a cleanup
    pub fn is_retired(&self) -> bool {
        *self.retired.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply buffered updates; returns `false` if the bucket is retired
    pub(crate) fn apply(&self, updates: &[PendingUpdate]) -> bool {
        // A panicking updater cannot leave the flag half-written
        let retired = self.retired.read().unwrap_or_else(PoisonError::into_inner);
        if *retired {
            return false;
        }

        let mut plain: Option<MutexGuard<'_, Box<[i64]>>> = None;
        for &(cell, incoming) in updates {
            match cell.representation {
                Representation::Plain => {
                    let cells = plain.get_or_insert_with(|| self.plain.lock());
                    let current = cells[cell.index];
                    cells[cell.index] = cell.width.apply(cell.op, incoming, current);
                }
                Representation::Atomic => {
                    self.atomics[cell.index].update(cell.op, cell.width, incoming)
                }
                Representation::Adder => {
                    self.adders[cell.index].update(cell.op, cell.width, incoming)
                }
            }
        }
        true
    }

    /// Close the gate; waits for updates currently applying
    pub(crate) fn retire(&self) {
        *self.retired.write().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Snapshot the bucket as an export record
    pub(crate) fn export(&self, layout: &BucketLayout) -> ExportRecord {
        let plain = self.plain.lock();
        let load = |cell: CellRef| -> i64 {
            match cell.representation {
                Representation::Plain => finish(cell.op, cell.width, plain[cell.index]),
                Representation::Atomic => self.atomics[cell.index].load(cell.op, cell.width),
                Representation::Adder => self.adders[cell.index].load(cell.op, cell.width),
            }
        };

        let mut columns = Vec::with_capacity(layout.columns().len());
        for column in layout.columns() {
            let value = match column.slot() {
                Slot::KeyField { .. } => match self.key.get(column.field()) {
                    Some(value) => value.clone(),
                    None => continue,
                },
                Slot::SimpleAggregatedField { cell, .. } | Slot::CountField { cell } => {
                    Value::Long(load(cell))
                }
                Slot::AverageField { sum, count } => Value::Long(average(load(sum), load(count))),
            };
            columns.push((column.name_arc().clone(), value));
        }
        ExportRecord::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{AggregationType, KeyBuilder, SchemaCompiler};
    use crate::schema::{EntryDescriptor, FieldDescriptor};
    use crate::types::{EntryTypeId, ValueType};

    struct Sample;

    fn layout(representation: Representation) -> BucketLayout {
        let descriptor = EntryDescriptor::new(
            "samples",
            EntryTypeId::of::<Sample>(),
            vec![
                FieldDescriptor::key("host", ValueType::String).with_getter(|_: &Sample| "a"),
                FieldDescriptor::aggregated(
                    "value",
                    ValueType::Int64,
                    [AggregationType::Max, AggregationType::Average],
                )
                .with_representation(representation)
                .with_getter(|_: &Sample| 1i64),
            ],
        );
        SchemaCompiler::default().compile(&descriptor, None).unwrap()
    }

    fn updates(layout: &BucketLayout, value: i64) -> Vec<PendingUpdate> {
        layout.aggregated_fields()[0]
            .updates()
            .iter()
            .map(|u| match u.input {
                crate::aggregation::layout::UpdateInput::Value => (u.cell, value),
                crate::aggregation::layout::UpdateInput::Cardinality => (u.cell, 1),
            })
            .collect()
    }

    #[test]
    fn test_apply_and_export_each_representation() {
        for representation in [
            Representation::Plain,
            Representation::Atomic,
            Representation::Adder,
        ] {
            let layout = layout(representation);
            let key = KeyBuilder::new().with_part("host", "a").build();
            let bucket = Bucket::new(&layout, key);

            for value in [4, 9, 2] {
                assert!(bucket.apply(&updates(&layout, value)));
            }

            let record = bucket.export(&layout);
            assert_eq!(record.key_value("host"), Some(&Value::from("a")));
            assert_eq!(record.aggregate("value", AggregationType::Max), Some(9));
            assert_eq!(record.aggregate("value", AggregationType::Sum), Some(15));
            assert_eq!(record.aggregate("value", AggregationType::Count), Some(3));
            assert_eq!(record.aggregate("value", AggregationType::Average), Some(5));
        }
    }

    #[test]
    fn test_fresh_bucket_exports_initial_values() {
        let layout = layout(Representation::Atomic);
        let bucket = Bucket::new(&layout, KeyBuilder::new().with_part("host", "a").build());
        let record = bucket.export(&layout);
        assert_eq!(record.aggregate("value", AggregationType::Max), Some(i64::MIN));
        assert_eq!(record.aggregate("value", AggregationType::Count), Some(0));
        assert_eq!(record.aggregate("value", AggregationType::Average), Some(0));
    }

    #[test]
    fn test_retired_bucket_rejects_updates() {
        let layout = layout(Representation::Plain);
        let bucket = Bucket::new(&layout, KeyBuilder::new().with_part("host", "a").build());
        assert!(bucket.apply(&updates(&layout, 1)));
        bucket.retire();
        assert!(bucket.is_retired());
        assert!(!bucket.apply(&updates(&layout, 100)));
        assert_eq!(
            bucket.export(&layout).aggregate("value", AggregationType::Max),
            Some(1)
        );
    }

    #[test]
    fn test_retire_waits_for_concurrent_adder_updates() {
        use std::sync::Arc;
        use std::thread;

        let layout = Arc::new(layout(Representation::Adder));
        let bucket = Arc::new(Bucket::new(
            &layout,
            KeyBuilder::new().with_part("host", "a").build(),
        ));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let layout = Arc::clone(&layout);
                let bucket = Arc::clone(&bucket);
                thread::spawn(move || {
                    let pending = updates(&layout, 1);
                    let mut applied = 0i64;
                    while bucket.apply(&pending) {
                        applied += 1;
                        if applied == 10_000 {
                            break;
                        }
                    }
                    applied
                })
            })
            .collect();

        thread::yield_now();
        bucket.retire();
        let applied: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // Every update accepted by the gate is visible after retirement
        let record = bucket.export(&layout);
        assert_eq!(record.aggregate("value", AggregationType::Count), Some(applied));
        assert_eq!(record.aggregate("value", AggregationType::Sum), Some(applied));
        assert!(!bucket.apply(&updates(&layout, 1)));
    }
}
