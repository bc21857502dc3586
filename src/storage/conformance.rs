//! Contract test suite for [`Adapter`] implementations.
//!
//! Every adapter, whether shipped with this crate or written downstream,
//! must satisfy the same merge, reconstruction and wipe semantics. Each
//! function below checks one aspect of the contract against a fresh adapter
//! and panics with a descriptive message on violation.
//!
//! # Usage
//!
//! Enable the `testutil` feature and run the suite against a factory that
//! returns an empty adapter:
//!
//! ```rust,ignore
//! use registro::storage::conformance;
//!
//! #[test]
//! fn my_adapter_conforms() {
//!     conformance::run_all(MyAdapter::new);
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | Scalars | add accumulates, set overwrites, concurrent adds are lossless |
//! | Histograms | cumulative buckets, `_count` equals `+Inf`, `_sum` is exact |
//! | Meta | help text and boundaries are write-once |
//! | Identity | families with distinct label sets never share rows |
//! | Wipe | no value rows survive, wiping twice is fine |

use super::{Adapter, Observation, ScalarUpdate, Update};
use crate::metric::MetricKind;
use crate::snapshot::MetricFamily;

const HELP: &str = "this is for testing";

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn scalar<'a>(
    name: &'a str,
    label_names: &'a [String],
    label_values: &'a [&'a str],
    update: Update,
) -> ScalarUpdate<'a> {
    ScalarUpdate {
        name,
        help: HELP,
        label_names,
        label_values,
        update,
    }
}

fn observe(adapter: &dyn Adapter, label_names: &[String], values: &[&str], buckets: &[f64], v: f64) {
    adapter
        .update_histogram(&Observation {
            name: "test_histogram",
            help: HELP,
            label_names,
            label_values: values,
            buckets,
            value: v,
        })
        .expect("update_histogram should succeed");
}

fn collect(adapter: &dyn Adapter) -> Vec<MetricFamily> {
    adapter.collect().expect("collect should succeed")
}

fn only_value(adapter: &dyn Adapter, name: &str, kind: MetricKind) -> f64 {
    let families = collect(adapter);
    let family = families
        .iter()
        .find(|f| f.name == name && f.kind == kind)
        .unwrap_or_else(|| panic!("no {kind} family named {name}: {families:?}"));
    assert_eq!(family.samples.len(), 1, "expected one sample: {family:?}");
    family.samples[0].value
}

fn suffix_values(family: &MetricFamily, suffix: &str, group: &[&str]) -> Vec<f64> {
    family
        .samples
        .iter()
        .filter(|s| s.suffix == suffix && s.label_values.iter().map(String::as_str).eq(group.iter().copied()))
        .map(|s| s.value)
        .collect()
}

/// Runs every check, each against a fresh adapter from `fresh`.
pub fn run_all<A: Adapter>(fresh: impl Fn() -> A) {
    collect_on_empty_store_is_empty(&fresh());
    counter_add_accumulates(&fresh());
    counter_concurrent_adds_are_lossless(&fresh());
    counter_set_resets(&fresh());
    gauge_set_overwrites_prior_adds(&fresh());
    gauge_accepts_negative_deltas(&fresh());
    histogram_buckets_are_cumulative(&fresh());
    histogram_sum_is_exact(&fresh());
    histogram_concurrent_observations_are_lossless(&fresh());
    histogram_meta_is_write_once(&fresh());
    scalar_meta_is_write_once(&fresh());
    label_arities_are_separate_families(&fresh());
    counters_and_gauges_do_not_share_rows(&fresh());
    wipe_removes_all_rows(&fresh());
    wipe_of_empty_store_is_noop(&fresh());
}

// ============================================================================
// Scalars
// ============================================================================

/// A store nobody wrote to collects nothing.
pub fn collect_on_empty_store_is_empty(adapter: &dyn Adapter) {
    assert!(collect(adapter).is_empty(), "fresh store must be empty");
}

/// `Add` deltas accumulate from a zero baseline.
pub fn counter_add_accumulates(adapter: &dyn Adapter) {
    let names = labels(&["foo", "bar"]);
    let values = ["lalal", "lululu"];
    for delta in [2.0, 1.0] {
        adapter
            .update_counter(&scalar("test_counter", &names, &values, Update::Add(delta)))
            .expect("update_counter should succeed");
    }
    assert_eq!(only_value(adapter, "test_counter", MetricKind::Counter), 3.0);
}

/// Concurrent `Add` calls on one key lose no update.
pub fn counter_concurrent_adds_are_lossless(adapter: &dyn Adapter) {
    const THREADS: usize = 8;
    const ITERATIONS: usize = 200;

    let names = labels(&["worker"]);
    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ITERATIONS {
                    adapter
                        .update_counter(&scalar("test_counter", &names, &["shared"], Update::Add(1.0)))
                        .expect("concurrent update_counter should succeed");
                }
            });
        }
    });
    assert_eq!(
        only_value(adapter, "test_counter", MetricKind::Counter),
        (THREADS * ITERATIONS) as f64,
        "concurrent adds must be additive"
    );
}

/// `Set(0)` resets a counter regardless of its history.
pub fn counter_set_resets(adapter: &dyn Adapter) {
    let names = labels(&[]);
    adapter
        .update_counter(&scalar("test_counter", &names, &[], Update::Add(42.0)))
        .expect("add");
    adapter
        .update_counter(&scalar("test_counter", &names, &[], Update::Set(0.0)))
        .expect("set");
    assert_eq!(only_value(adapter, "test_counter", MetricKind::Counter), 0.0);
}

/// `Set(x)` followed by collection yields exactly `x`.
pub fn gauge_set_overwrites_prior_adds(adapter: &dyn Adapter) {
    let names = labels(&["foo", "bar"]);
    let values = ["lalal", "lululu"];
    for update in [Update::Add(7.0), Update::Set(14.0), Update::Add(3.0), Update::Set(34.0)] {
        adapter
            .update_gauge(&scalar("test_gauge", &names, &values, update))
            .expect("update_gauge should succeed");
    }
    assert_eq!(only_value(adapter, "test_gauge", MetricKind::Gauge), 34.0);
}

/// Gauges move below zero.
pub fn gauge_accepts_negative_deltas(adapter: &dyn Adapter) {
    let names = labels(&[]);
    adapter
        .update_gauge(&scalar("test_gauge", &names, &[], Update::Add(-1.0)))
        .expect("update_gauge should succeed");
    assert_eq!(only_value(adapter, "test_gauge", MetricKind::Gauge), -1.0);
}

// ============================================================================
// Histograms
// ============================================================================

/// Sparse bucket deltas come back as cumulative buckets, `+Inf` equals `_count`.
pub fn histogram_buckets_are_cumulative(adapter: &dyn Adapter) {
    let names = labels(&["foo", "bar"]);
    let bounds = [0.1, 1.0, 5.0, 10.0];
    for v in [2.0, 13.0, 7.1] {
        observe(adapter, &names, &["lalal", "lululu"], &bounds, v);
    }
    observe(adapter, &names, &["gnaaha", "hihihi"], &bounds, 7.1);

    let families = collect(adapter);
    assert_eq!(families.len(), 1, "one histogram family expected");
    let family = &families[0];
    assert_eq!(family.kind, MetricKind::Histogram);
    assert_eq!(family.buckets.as_deref(), Some(&bounds[..]));

    let first = ["lalal", "lululu"];
    let buckets = suffix_values(family, "_bucket", &first);
    assert_eq!(buckets, vec![0.0, 0.0, 1.0, 2.0, 3.0]);
    assert!(buckets.windows(2).all(|w| w[0] <= w[1]), "buckets must be monotonic");
    assert_eq!(suffix_values(family, "_count", &first), vec![3.0]);

    let second = ["gnaaha", "hihihi"];
    assert_eq!(suffix_values(family, "_bucket", &second), vec![0.0, 0.0, 0.0, 1.0, 1.0]);
    assert_eq!(suffix_values(family, "_sum", &second), vec![7.1]);

    let groups: Vec<_> = family
        .samples
        .iter()
        .filter(|s| s.suffix == "_count")
        .map(|s| s.label_values[0].clone())
        .collect();
    assert_eq!(groups, vec!["gnaaha", "lalal"], "groups sorted by label values");
}

/// `_sum` is the arithmetic sum of the observations.
pub fn histogram_sum_is_exact(adapter: &dyn Adapter) {
    let names = labels(&[]);
    let bounds = crate::buckets::DEFAULT_BUCKETS;
    for v in [2.0, 13.0, 7.1] {
        observe(adapter, &names, &[], &bounds, v);
    }
    let families = collect(adapter);
    let family = &families[0];
    assert_eq!(suffix_values(family, "_sum", &[]), vec![2.0 + 13.0 + 7.1]);
    assert_eq!(suffix_values(family, "_count", &[]), vec![3.0]);
    assert_eq!(suffix_values(family, "_bucket", &[]).len(), bounds.len() + 1);
}

/// Concurrent observations lose neither counts nor sums.
pub fn histogram_concurrent_observations_are_lossless(adapter: &dyn Adapter) {
    const THREADS: usize = 4;
    const ITERATIONS: usize = 100;

    let names = labels(&[]);
    let bounds = [1.0, 2.0];
    std::thread::scope(|s| {
        for t in 0..THREADS {
            let names = &names;
            s.spawn(move || {
                for _ in 0..ITERATIONS {
                    observe(adapter, names, &[], &bounds, t as f64);
                }
            });
        }
    });

    let families = collect(adapter);
    let family = &families[0];
    // values 0 and 1 fall in le=1, 2 in le=2, 3 in +Inf
    assert_eq!(
        suffix_values(family, "_bucket", &[]),
        vec![200.0, 300.0, 400.0]
    );
    assert_eq!(suffix_values(family, "_sum", &[]), vec![600.0]);
}

// ============================================================================
// Meta
// ============================================================================

/// The first observation fixes help text and boundaries.
pub fn histogram_meta_is_write_once(adapter: &dyn Adapter) {
    let names = labels(&[]);
    adapter
        .update_histogram(&Observation {
            name: "test_histogram",
            help: "first",
            label_names: &names,
            label_values: &[],
            buckets: &[1.0],
            value: 0.5,
        })
        .expect("first observation");
    adapter
        .update_histogram(&Observation {
            name: "test_histogram",
            help: "second",
            label_names: &names,
            label_values: &[],
            buckets: &[1.0],
            value: 0.5,
        })
        .expect("second observation");

    let families = collect(adapter);
    assert_eq!(families[0].help, "first");
    assert_eq!(families[0].buckets.as_deref(), Some(&[1.0][..]));
}

/// The first scalar update fixes the help text.
pub fn scalar_meta_is_write_once(adapter: &dyn Adapter) {
    let names = labels(&[]);
    for help in ["first", "second"] {
        adapter
            .update_gauge(&ScalarUpdate {
                name: "test_gauge",
                help,
                label_names: &names,
                label_values: &[],
                update: Update::Add(1.0),
            })
            .expect("update_gauge should succeed");
    }
    let families = collect(adapter);
    assert_eq!(families[0].help, "first");
    assert_eq!(families[0].samples[0].value, 2.0);
}

// ============================================================================
// Identity
// ============================================================================

/// Same name, different label arity: separate families, ordered by arity.
pub fn label_arities_are_separate_families(adapter: &dyn Adapter) {
    let two = labels(&["foo", "bar"]);
    let one = labels(&["foo"]);
    let none = labels(&[]);

    adapter
        .update_gauge(&scalar("test_gauge", &two, &["lalal", "lululu"], Update::Set(34.0)))
        .expect("two labels");
    adapter
        .update_gauge(&scalar("test_gauge", &one, &["lalal"], Update::Set(32.0)))
        .expect("one label");
    adapter
        .update_gauge(&scalar("test_gauge", &one, &["lalab"], Update::Set(35.0)))
        .expect("one label");
    adapter
        .update_gauge(&scalar("test_gauge", &none, &[], Update::Add(-1.0)))
        .expect("no labels");

    let families = collect(adapter);
    let arities: Vec<_> = families.iter().map(|f| f.label_names.len()).collect();
    assert_eq!(arities, vec![0, 1, 2]);

    let one_label: Vec<_> = families[1]
        .samples
        .iter()
        .map(|s| (s.label_values[0].as_str(), s.value))
        .collect();
    assert_eq!(one_label, vec![("lalab", 35.0), ("lalal", 32.0)]);
}

/// A counter and a gauge with the same name and labels keep separate rows.
pub fn counters_and_gauges_do_not_share_rows(adapter: &dyn Adapter) {
    let names = labels(&[]);
    adapter
        .update_counter(&scalar("shared", &names, &[], Update::Add(1.0)))
        .expect("counter");
    adapter
        .update_gauge(&scalar("shared", &names, &[], Update::Set(10.0)))
        .expect("gauge");
    assert_eq!(only_value(adapter, "shared", MetricKind::Counter), 1.0);
    assert_eq!(only_value(adapter, "shared", MetricKind::Gauge), 10.0);
}

// ============================================================================
// Wipe
// ============================================================================

/// After a wipe, no value rows remain.
pub fn wipe_removes_all_rows(adapter: &dyn Adapter) {
    let names = labels(&[]);
    adapter
        .update_counter(&scalar("test_counter", &names, &[], Update::Add(1.0)))
        .expect("counter");
    observe(adapter, &names, &[], &[1.0], 0.5);
    assert_eq!(collect(adapter).len(), 2);

    adapter.wipe_storage().expect("wipe should succeed");
    let samples: usize = collect(adapter).iter().map(|f| f.samples.len()).sum();
    assert_eq!(samples, 0, "no samples may survive a wipe");

    // the store stays usable
    adapter
        .update_counter(&scalar("test_counter", &names, &[], Update::Add(5.0)))
        .expect("counter after wipe");
    assert_eq!(only_value(adapter, "test_counter", MetricKind::Counter), 5.0);
}

/// Wiping an empty store, twice, is not an error.
pub fn wipe_of_empty_store_is_noop(adapter: &dyn Adapter) {
    adapter.wipe_storage().expect("first wipe");
    adapter.wipe_storage().expect("second wipe");
    assert!(collect(adapter).is_empty());
}
