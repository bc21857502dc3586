//! Process-local adapter backed by sharded maps of atomic cells.
//!
//! [`InMemory`] keeps every persisted row in a [`DashMap`]. Each value lives in
//! its own cache-padded `AtomicU64` holding the bits of an `f64`:
//!
//! ```text
//!   DashMap<key, Cell>                     Cell = CachePadded<AtomicU64>
//!   ┌──────────────┐  shard read lock     ┌──────────────────────────────┐
//!   │ shard 0      │ ───────────────────► │ f64 bits  ◄── CAS loop (Add) │
//!   │ shard 1      │                      │           ◄── store   (Set)  │
//!   │ ...          │                      └──────────────────────────────┘
//!   └──────────────┘
//! ```
//!
//! Updates to an existing row only take the shard's read lock and merge with
//! a compare-and-swap loop, so threads hammering the same counter never block
//! each other. A missing row is created under the shard's write lock, which
//! makes "insert if absent, else merge" a single atomic step.
//!
//! State is not shared between processes; use [`Sqlite`](super::Sqlite) for
//! that.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use dashmap::DashMap;
use tracing::{info, trace};

use super::{Adapter, BucketRow, FamilyMeta, Observation, Rows, ScalarRow, ScalarUpdate, Update};
use crate::buckets::{self, BucketLabel};
use crate::error::Result;
use crate::metric::{owned, MetricKind};
use crate::snapshot::MetricFamily;

/// An `f64` accumulator merged with atomic operations.
///
/// Padded to a cache line so that hot rows sitting next to each other in a
/// shard do not bounce the same line between cores.
struct Cell(CachePadded<AtomicU64>);

impl Cell {
    fn zero() -> Self {
        Cell(CachePadded::new(AtomicU64::new(0f64.to_bits())))
    }

    #[inline]
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn merge(&self, update: Update) {
        match update {
            Update::Set(value) => self.0.store(value.to_bits(), Ordering::Relaxed),
            Update::Add(delta) => {
                let mut current = self.0.load(Ordering::Relaxed);
                loop {
                    let next = (f64::from_bits(current) + delta).to_bits();
                    match self.0.compare_exchange_weak(
                        current,
                        next,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break,
                        Err(actual) => current = actual,
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.load())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SampleKey {
    name: String,
    kind: MetricKind,
    label_names: Vec<String>,
    label_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    name: String,
    label_names: Vec<String>,
    label_values: Vec<String>,
    bucket: String,
}

type MetaKey = (String, MetricKind, Vec<String>);

/// Thread-safe, process-local storage adapter.
///
/// # Examples
///
/// ```rust
/// use registro::storage::{Adapter, InMemory, ScalarUpdate, Update};
///
/// let adapter = InMemory::new();
/// let labels = vec!["method".to_string()];
///
/// for _ in 0..3 {
///     adapter
///         .update_counter(&ScalarUpdate {
///             name: "requests",
///             help: "Total requests",
///             label_names: &labels,
///             label_values: &["GET"],
///             update: Update::Add(1.0),
///         })
///         .unwrap();
/// }
///
/// let families = adapter.collect().unwrap();
/// assert_eq!(families[0].samples[0].value, 3.0);
/// ```
#[derive(Debug, Default)]
pub struct InMemory {
    metas: DashMap<MetaKey, FamilyMeta>,
    samples: DashMap<SampleKey, Cell>,
    buckets: DashMap<BucketKey, Cell>,
}

impl InMemory {
    /// Creates an empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored value rows (samples and buckets).
    pub fn row_count(&self) -> usize {
        self.samples.len() + self.buckets.len()
    }

    fn insert_meta(
        &self,
        name: &str,
        kind: MetricKind,
        help: &str,
        label_names: &[String],
        buckets: Option<&[f64]>,
    ) {
        let key = (name.to_string(), kind, label_names.to_vec());
        if self.metas.contains_key(&key) {
            return;
        }
        self.metas.entry(key).or_insert_with(|| FamilyMeta {
            name: name.to_string(),
            kind,
            help: help.to_string(),
            label_names: label_names.to_vec(),
            buckets: buckets.map(<[f64]>::to_vec),
        });
    }

    fn update_scalar(&self, kind: MetricKind, update: &ScalarUpdate<'_>) -> Result<()> {
        self.insert_meta(update.name, kind, update.help, update.label_names, None);
        let key = SampleKey {
            name: update.name.to_string(),
            kind,
            label_names: update.label_names.to_vec(),
            label_values: owned(update.label_values),
        };
        trace!(name = update.name, %kind, update = ?update.update, "merging sample");
        merge(&self.samples, key, update.update);
        Ok(())
    }
}

/// Merges `update` into the cell at `key`, creating it at 0 if absent.
fn merge<K: Hash + Eq>(map: &DashMap<K, Cell>, key: K, update: Update) {
    if let Some(cell) = map.get(&key) {
        cell.merge(update);
        return;
    }
    map.entry(key).or_insert_with(Cell::zero).merge(update);
}

impl Adapter for InMemory {
    fn update_counter(&self, update: &ScalarUpdate<'_>) -> Result<()> {
        self.update_scalar(MetricKind::Counter, update)
    }

    fn update_gauge(&self, update: &ScalarUpdate<'_>) -> Result<()> {
        self.update_scalar(MetricKind::Gauge, update)
    }

    fn update_histogram(&self, observation: &Observation<'_>) -> Result<()> {
        self.insert_meta(
            observation.name,
            MetricKind::Histogram,
            observation.help,
            observation.label_names,
            Some(observation.buckets),
        );

        let key = |bucket: BucketLabel| BucketKey {
            name: observation.name.to_string(),
            label_names: observation.label_names.to_vec(),
            label_values: owned(observation.label_values),
            bucket: bucket.key(),
        };

        let matching = buckets::assign(observation.buckets, observation.value);
        trace!(
            name = observation.name,
            value = observation.value,
            bucket = ?matching,
            "merging observation"
        );
        merge(
            &self.buckets,
            key(BucketLabel::Sum),
            Update::Add(observation.value),
        );
        merge(&self.buckets, key(matching), Update::Add(1.0));
        Ok(())
    }

    fn collect(&self) -> Result<Vec<MetricFamily>> {
        let rows = Rows {
            families: self.metas.iter().map(|e| e.value().clone()).collect(),
            scalars: self
                .samples
                .iter()
                .map(|e| ScalarRow {
                    name: e.key().name.clone(),
                    kind: e.key().kind,
                    label_names: e.key().label_names.clone(),
                    label_values: e.key().label_values.clone(),
                    value: e.value().load(),
                })
                .collect(),
            buckets: self
                .buckets
                .iter()
                .map(|e| BucketRow {
                    name: e.key().name.clone(),
                    label_names: e.key().label_names.clone(),
                    label_values: e.key().label_values.clone(),
                    bucket: e.key().bucket.clone(),
                    value: e.value().load(),
                })
                .collect(),
        };
        Ok(rows.into_families())
    }

    fn wipe_storage(&self) -> Result<()> {
        self.samples.clear();
        self.buckets.clear();
        self.metas.clear();
        info!("in-memory metric storage wiped");
        Ok(())
    }
}
