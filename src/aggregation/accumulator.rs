//! Concurrency-safe storage for aggregator slots
//!
//! A slot is stored in one of three representations:
//!
//! ```text
//! ┌──────────┬───────────────────────────────┬──────────────────────────────┐
//! │ Plain    │ i64 behind the bucket's lock  │ one short lock per update    │
//! │ Atomic   │ AtomicI64                     │ fetch_add / CAS retry loop   │
//! │ Adder    │ N cache-padded AtomicI64      │ per-thread shard, fold on    │
//! │          │                               │ read                         │
//! └──────────┴───────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! SUM cells always accumulate with 64-bit wrapping addition and are wrapped
//! to the field width when read. Wrapping addition is commutative at every
//! width, so the low 32 bits of a 64-bit sum equal the 32-bit wrapping sum.

use super::functions::{IntegerWidth, SimpleAggregation};
use crossbeam_utils::CachePadded;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

/// Storage representation of an aggregator slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// Plain integer guarded by the bucket lock
    Plain,
    /// Single atomic cell
    #[default]
    Atomic,
    /// Sharded accumulator folded on read
    Adder,
}

impl Representation {
    /// Get the representation name
    pub fn name(&self) -> &'static str {
        match self {
            Representation::Plain => "plain",
            Representation::Atomic => "atomic",
            Representation::Adder => "adder",
        }
    }

    /// Parse from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "plain" | "primitive" => Some(Representation::Plain),
            "atomic" => Some(Representation::Atomic),
            "adder" | "accumulator" => Some(Representation::Adder),
            _ => None,
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Normalize a raw cell value for export
pub(crate) fn finish(op: SimpleAggregation, width: IntegerWidth, raw: i64) -> i64 {
    match op {
        SimpleAggregation::Sum => width.wrap(raw),
        SimpleAggregation::Min | SimpleAggregation::Max => raw,
    }
}

/// Fold `incoming` into a shared cell
#[inline]
fn update_cell(cell: &AtomicI64, op: SimpleAggregation, width: IntegerWidth, incoming: i64) {
    match op {
        SimpleAggregation::Sum => {
            // AtomicI64::fetch_add wraps on overflow
            cell.fetch_add(incoming, Ordering::Relaxed);
        }
        SimpleAggregation::Min | SimpleAggregation::Max => {
            let mut current = cell.load(Ordering::Relaxed);
            loop {
                let updated = width.apply(op, incoming, current);
                if updated == current {
                    return;
                }
                match cell.compare_exchange_weak(
                    current,
                    updated,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return,
                    Err(actual) => current = actual,
                }
            }
        }
    }
}

// ============================================================================
// Atomic Cell
// ============================================================================

/// Single atomic aggregator cell
#[derive(Debug)]
pub struct AtomicCell(AtomicI64);

impl AtomicCell {
    /// Create a cell holding `initial`
    pub fn new(initial: i64) -> Self {
        Self(AtomicI64::new(initial))
    }

    /// Fold `incoming` into the cell
    #[inline]
    pub fn update(&self, op: SimpleAggregation, width: IntegerWidth, incoming: i64) {
        update_cell(&self.0, op, width, incoming);
    }

    /// Current aggregate
    pub fn load(&self, op: SimpleAggregation, width: IntegerWidth) -> i64 {
        finish(op, width, self.0.load(Ordering::Relaxed))
    }
}

// ============================================================================
// Sharded Adder
// ============================================================================

static NEXT_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD_INDEX: usize = NEXT_SHARD.fetch_add(1, Ordering::Relaxed);
}

#[inline]
fn shard_index() -> usize {
    SHARD_INDEX.with(|index| *index)
}

/// Sharded accumulator cell
///
/// Each thread is pinned to one shard, and each shard sits on its own cache
/// line. Writers on different threads rarely touch the same line; readers fold
/// all shards with the same operation. The result is exact for MIN, MAX and
/// SUM because all three are commutative and associative.
#[derive(Debug)]
pub struct ShardedCell {
    shards: Box<[CachePadded<AtomicI64>]>,
    mask: usize,
    initial: i64,
}

impl ShardedCell {
    /// Create a cell with `shards` shards (rounded up to a power of two)
    pub fn new(shards: usize, initial: i64) -> Self {
        let count = shards.max(1).next_power_of_two();
        let shards = (0..count)
            .map(|_| CachePadded::new(AtomicI64::new(initial)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            mask: count - 1,
            initial,
        }
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Fold `incoming` into the calling thread's shard
    #[inline]
    pub fn update(&self, op: SimpleAggregation, width: IntegerWidth, incoming: i64) {
        let shard = &self.shards[shard_index() & self.mask];
        update_cell(shard, op, width, incoming);
    }

    /// Current aggregate folded across all shards
    pub fn load(&self, op: SimpleAggregation, width: IntegerWidth) -> i64 {
        let raw = match op {
            SimpleAggregation::Sum => self
                .shards
                .iter()
                .fold(0i64, |acc, shard| acc.wrapping_add(shard.load(Ordering::Relaxed))),
            SimpleAggregation::Min | SimpleAggregation::Max => {
                self.shards.iter().fold(self.initial, |acc, shard| {
                    width.apply(op, shard.load(Ordering::Relaxed), acc)
                })
            }
        };
        finish(op, width, raw)
    }
}
