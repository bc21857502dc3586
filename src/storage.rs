//! Storage adapters: the persistence contract behind every metric.
//!
//! An [`Adapter`] owns the persisted state of all metric families and the
//! atomic merge semantics that make it safe to share between uncoordinated
//! threads and processes. The registry and the metric handles hold no values
//! themselves; every `inc`, `set` and `observe` becomes exactly one adapter
//! call.
//!
//! # The merge contract
//!
//! Each update is a single atomic "insert if absent, else merge" against the
//! backing store, with the combinator chosen by [`Update`]:
//!
//! | Update | Effect on the stored value |
//! |--------|----------------------------|
//! | [`Update::Add`] | `value + delta` (row starts at 0) |
//! | [`Update::Set`] | `value` is replaced |
//!
//! N concurrent `Add(dᵢ)` on one key have the same net effect as one
//! `Add(Σdᵢ)`; the last `Set` to complete wins. Histogram observations are
//! always additive (see [`buckets`](crate::buckets)).
//!
//! # Available Adapters
//!
//! | Adapter | Backing store | Shared across |
//! |---------|---------------|---------------|
//! | [`InMemory`] | sharded map of atomic cells | threads |
//! | [`Sqlite`] | SQLite file (or `:memory:`) | threads and processes |
//!
//! # Persisted rows
//!
//! Adapters gather their raw rows into [`Rows`], which turns them into the
//! ordered [`MetricFamily`] list returned by [`Adapter::collect`]. Keeping the
//! assembly in one place keeps the ordering rules identical for every backend.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "testutil"))]
pub mod conformance;

pub use memory::InMemory;

#[cfg(feature = "sqlite")]
pub use sqlite::Sqlite;

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Write as _};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buckets;
use crate::error::{Error, Result};
use crate::metric::MetricKind;
use crate::snapshot::{family_order, MetricFamily, Sample};

/// How a scalar update combines with the stored value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Update {
    /// Add the delta to the stored value.
    Add(f64),
    /// Overwrite the stored value.
    Set(f64),
}

impl Update {
    /// Returns the carried number.
    pub fn value(&self) -> f64 {
        match self {
            Update::Add(v) | Update::Set(v) => *v,
        }
    }

    /// Merges this update into `current`.
    pub fn apply(&self, current: f64) -> f64 {
        match self {
            Update::Add(delta) => current + delta,
            Update::Set(value) => *value,
        }
    }
}

/// A counter or gauge update as handed to an adapter.
#[derive(Debug, Clone, Copy)]
pub struct ScalarUpdate<'a> {
    /// Qualified metric name.
    pub name: &'a str,
    /// Help text, stored only by the first update of the family.
    pub help: &'a str,
    /// Ordered label names of the family.
    pub label_names: &'a [String],
    /// Label values, positionally matching `label_names`.
    pub label_values: &'a [&'a str],
    /// The merge to perform.
    pub update: Update,
}

/// A histogram observation as handed to an adapter.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    /// Qualified metric name.
    pub name: &'a str,
    /// Help text, stored only by the first observation of the family.
    pub help: &'a str,
    /// Ordered label names of the family.
    pub label_names: &'a [String],
    /// Label values, positionally matching `label_names`.
    pub label_values: &'a [&'a str],
    /// Ascending bucket boundaries, without `+Inf`.
    pub buckets: &'a [f64],
    /// The observed value.
    pub value: f64,
}

/// The capability set every storage backend implements.
///
/// Implementations must be `Send + Sync`: one adapter is shared by every
/// handle of a registry, and several registries (or processes) may point at
/// the same backing store.
pub trait Adapter: Send + Sync + Debug {
    /// Merges a counter update. `Set` is only ever issued with 0 (reset).
    fn update_counter(&self, update: &ScalarUpdate<'_>) -> Result<()>;

    /// Merges a gauge update.
    fn update_gauge(&self, update: &ScalarUpdate<'_>) -> Result<()>;

    /// Records one histogram observation: writes the family meta once, adds
    /// the value to the `sum` row and 1 to the matching bucket row.
    fn update_histogram(&self, observation: &Observation<'_>) -> Result<()>;

    /// Returns every stored family, ordered, with histograms reconstructed.
    fn collect(&self) -> Result<Vec<MetricFamily>>;

    /// Discards all persisted state. Wiping an empty store is a no-op.
    fn wipe_storage(&self) -> Result<()>;
}

/// Meta row of a family: written by the first update, ignored afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyMeta {
    /// Qualified metric name.
    pub name: String,
    /// Metric kind.
    pub kind: MetricKind,
    /// Help text of the first update.
    pub help: String,
    /// Ordered label names.
    pub label_names: Vec<String>,
    /// Ascending boundaries (histograms only).
    pub buckets: Option<Vec<f64>>,
}

/// A persisted counter or gauge value.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarRow {
    /// Qualified metric name.
    pub name: String,
    /// Counter or gauge.
    pub kind: MetricKind,
    /// Label names of the owning family.
    pub label_names: Vec<String>,
    /// Label values of this row.
    pub label_values: Vec<String>,
    /// Accumulated value.
    pub value: f64,
}

/// A persisted, non-cumulative histogram bucket (or `sum`) value.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketRow {
    /// Qualified metric name.
    pub name: String,
    /// Label names of the owning family.
    pub label_names: Vec<String>,
    /// Label values of this group.
    pub label_values: Vec<String>,
    /// Bucket key: a boundary, `+Inf` or `sum`.
    pub bucket: String,
    /// Accumulated delta.
    pub value: f64,
}

type FamilyKey = (String, MetricKind, Vec<String>);

/// Raw rows read from a backend, ready to be assembled into families.
#[derive(Debug, Default)]
pub struct Rows {
    /// Family meta rows.
    pub families: Vec<FamilyMeta>,
    /// Counter and gauge rows.
    pub scalars: Vec<ScalarRow>,
    /// Histogram bucket rows.
    pub buckets: Vec<BucketRow>,
}

impl Rows {
    /// Assembles the rows into ordered families.
    ///
    /// Families are ordered by qualified name, label arity, label names and
    /// kind. Scalar samples are sorted by the concatenation of their label
    /// values; histogram groups by their serialized label-value tuple, each
    /// group emitting its cumulative buckets, `_count` and `_sum`. Families
    /// without any value row are left out.
    pub fn into_families(self) -> Vec<MetricFamily> {
        let mut scalars: HashMap<FamilyKey, Vec<(String, Vec<String>, f64)>> = HashMap::new();
        for row in self.scalars {
            let encoded = sort_key(&row.label_values);
            scalars
                .entry((row.name, row.kind, row.label_names))
                .or_default()
                .push((encoded, row.label_values, row.value));
        }

        let mut histograms: HashMap<FamilyKey, HistogramGroups> = HashMap::new();
        for row in self.buckets {
            let encoded = sort_key(&row.label_values);
            histograms
                .entry((row.name, MetricKind::Histogram, row.label_names))
                .or_default()
                .entry(encoded)
                .or_insert_with(|| (row.label_values, HashMap::new()))
                .1
                .insert(row.bucket, row.value);
        }

        let mut metas = self.families;
        metas.sort_by(|a, b| {
            family_order(
                (a.name.as_str(), a.label_names.as_slice(), a.kind),
                (b.name.as_str(), b.label_names.as_slice(), b.kind),
            )
        });

        let mut families = Vec::with_capacity(metas.len());
        for meta in metas {
            let key = (meta.name, meta.kind, meta.label_names);
            let samples = match meta.kind {
                MetricKind::Histogram => {
                    let boundaries = meta.buckets.as_deref().unwrap_or_default();
                    histograms
                        .remove(&key)
                        .map(|groups| {
                            groups
                                .into_values()
                                .flat_map(|(values, rows)| {
                                    buckets::reconstruct(boundaries, &values, &rows)
                                })
                                .collect()
                        })
                        .unwrap_or_default()
                }
                MetricKind::Counter | MetricKind::Gauge => scalars
                    .remove(&key)
                    .map(sorted_scalar_samples)
                    .unwrap_or_default(),
            };
            if samples.is_empty() {
                continue;
            }
            let (name, kind, label_names) = key;
            families.push(MetricFamily {
                name,
                help: meta.help,
                kind,
                label_names,
                buckets: meta.buckets,
                samples,
            });
        }
        families
    }
}

/// Histogram groups keyed (and therefore ordered) by serialized label values.
type HistogramGroups = BTreeMap<String, (Vec<String>, HashMap<String, f64>)>;

/// Orders scalar rows by the concatenation of their label values.
///
/// Rows are first put in serialized-tuple order so that rows whose
/// concatenations collide (`["ab","c"]` vs `["a","bc"]`) keep a stable order.
fn sorted_scalar_samples(mut rows: Vec<(String, Vec<String>, f64)>) -> Vec<Sample> {
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows.sort_by_cached_key(|(_, values, _)| values.concat());
    rows.into_iter()
        .map(|(_, values, value)| Sample::new("", values, value))
        .collect()
}

/// Serializes a list of strings (label names, label values) as a JSON array.
pub(crate) fn encode<T: Serialize + ?Sized>(values: &T) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}

/// Parses a JSON array written by [`encode`].
pub(crate) fn decode<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}

/// Ordering key of a label-value tuple: its JSON array with `/` escaped and
/// every non-ASCII character written as lowercase `\uXXXX` UTF-16 units.
///
/// Tuples therefore order the same way their ASCII-only JSON encodings do,
/// whatever encoding a backend stores them in.
fn sort_key(values: &[String]) -> String {
    let json = serde_json::to_string(values).unwrap_or_default();
    let mut key = String::with_capacity(json.len());
    for c in json.chars() {
        if c == '/' {
            key.push_str("\\/");
        } else if c.is_ascii() {
            key.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(key, "\\u{unit:04x}");
            }
        }
    }
    key
}

/// Selects and builds a storage adapter by name.
///
/// Accepted strings: `memory` (or `in-memory`), `sqlite::memory:` and
/// `sqlite:<path>`.
///
/// ```rust
/// use registro::storage::AdapterConfig;
///
/// let config: AdapterConfig = "memory".parse().unwrap();
/// let adapter = config.build().unwrap();
/// adapter.wipe_storage().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "adapter", rename_all = "lowercase")]
pub enum AdapterConfig {
    /// Process-local [`InMemory`] adapter.
    Memory,
    /// [`Sqlite`] adapter on `path` (`:memory:` for a private database).
    Sqlite {
        /// Data file path.
        path: PathBuf,
    },
}

impl AdapterConfig {
    /// Builds the configured adapter.
    pub fn build(&self) -> Result<Arc<dyn Adapter>> {
        match self {
            AdapterConfig::Memory => Ok(Arc::new(InMemory::new())),
            #[cfg(feature = "sqlite")]
            AdapterConfig::Sqlite { path } => Ok(Arc::new(Sqlite::new(path.clone()))),
            #[cfg(not(feature = "sqlite"))]
            AdapterConfig::Sqlite { .. } => Err(Error::InvalidConfiguration(
                "sqlite support is not compiled in (enable the `sqlite` feature)".into(),
            )),
        }
    }
}

impl FromStr for AdapterConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" | "in-memory" => Ok(AdapterConfig::Memory),
            _ => match s.strip_prefix("sqlite:") {
                Some(path) if !path.is_empty() => Ok(AdapterConfig::Sqlite {
                    path: PathBuf::from(path),
                }),
                _ => Err(Error::InvalidConfiguration(format!(
                    "unknown storage adapter `{s}` (expected `memory` or `sqlite:<path>`)"
                ))),
            },
        }
    }
}
