//! Histogram bucket assignment and cumulative reconstruction.
//!
//! Histograms are stored as **sparse, non-cumulative** per-bucket deltas:
//! an observation adds 1 to exactly one bucket row (the smallest boundary
//! greater than or equal to the value, or `+Inf`) and adds the value itself
//! to a `sum` pseudo-bucket. Both are plain additive merges, so concurrent
//! observers never need to touch every boundary above the value.
//!
//! The cumulative `_bucket{le=...}` series that scrapers expect is rebuilt at
//! collection time by [`reconstruct`], which walks the boundaries in ascending
//! order with a running total.
//!
//! ```text
//!   boundaries   0.1    1     5     10    +Inf
//!   stored rows   -     -     1     1     1        (observations 2, 7.1, 13)
//!   emitted       0     0     1     2     3        _count 3
//! ```
//!
//! # Examples
//!
//! ```rust
//! use registro::buckets::{assign, BucketLabel};
//!
//! let bounds = [0.1, 1.0, 5.0, 10.0];
//! assert_eq!(assign(&bounds, 2.0), BucketLabel::Boundary(5.0));
//! assert_eq!(assign(&bounds, 5.0), BucketLabel::Boundary(5.0));
//! assert_eq!(assign(&bounds, 13.0), BucketLabel::Inf);
//! ```

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::snapshot::Sample;

/// Boundaries used when a histogram is registered without explicit buckets.
pub const DEFAULT_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

/// Row key and `le` value of the unbounded bucket.
pub const INF: &str = "+Inf";

/// Row key of the pseudo-bucket accumulating observed values.
pub const SUM: &str = "sum";

/// Label name reserved for bucket boundaries.
pub const LE: &str = "le";

/// Returns [`DEFAULT_BUCKETS`] as a vector.
pub fn default_buckets() -> Vec<f64> {
    DEFAULT_BUCKETS.to_vec()
}

/// Returns `count` boundaries starting at `start`, each `width` apart.
///
/// ```rust
/// use registro::buckets::linear_buckets;
///
/// assert_eq!(linear_buckets(1.0, 2.0, 3).unwrap(), vec![1.0, 3.0, 5.0]);
/// ```
pub fn linear_buckets(start: f64, width: f64, count: usize) -> Result<Vec<f64>> {
    if count == 0 {
        return Err(Error::InvalidConfiguration(
            "linear buckets need a count of at least 1".into(),
        ));
    }
    if !start.is_finite() || !width.is_finite() || width <= 0.0 {
        return Err(Error::InvalidConfiguration(format!(
            "linear buckets need a finite start and a positive width, got start {start}, width {width}"
        )));
    }
    Ok((0..count).map(|i| start + width * i as f64).collect())
}

/// Returns `count` boundaries starting at `start`, each `factor` times the previous.
///
/// ```rust
/// use registro::buckets::exponential_buckets;
///
/// assert_eq!(exponential_buckets(1.0, 2.0, 4).unwrap(), vec![1.0, 2.0, 4.0, 8.0]);
/// ```
pub fn exponential_buckets(start: f64, factor: f64, count: usize) -> Result<Vec<f64>> {
    if count == 0 {
        return Err(Error::InvalidConfiguration(
            "exponential buckets need a count of at least 1".into(),
        ));
    }
    if !start.is_finite() || start <= 0.0 {
        return Err(Error::InvalidConfiguration(format!(
            "exponential buckets need a positive start, got {start}"
        )));
    }
    if !factor.is_finite() || factor <= 1.0 {
        return Err(Error::InvalidConfiguration(format!(
            "exponential buckets need a factor greater than 1, got {factor}"
        )));
    }
    let mut bucket = start;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(bucket);
        bucket *= factor;
    }
    Ok(out)
}

/// Rejects boundary lists that are empty, non-finite or not strictly ascending,
/// and label sets that use the reserved `le` name.
pub fn validate(name: &str, buckets: &[f64], label_names: &[String]) -> Result<()> {
    if buckets.is_empty() {
        return Err(Error::InvalidConfiguration(format!(
            "histogram `{name}` must have at least one bucket"
        )));
    }
    if let Some(b) = buckets.iter().find(|b| !b.is_finite()) {
        return Err(Error::InvalidConfiguration(format!(
            "histogram `{name}` has non-finite bucket {b}; +Inf is implicit"
        )));
    }
    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::InvalidConfiguration(format!(
            "histogram `{name}` buckets must be in strictly increasing order"
        )));
    }
    if label_names.iter().any(|l| l == LE) {
        return Err(Error::InvalidConfiguration(format!(
            "histogram `{name}` cannot have a label named `{LE}`"
        )));
    }
    Ok(())
}

/// The bucket row an observation is merged into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BucketLabel {
    /// A registered, finite boundary.
    Boundary(f64),
    /// The implicit unbounded bucket.
    Inf,
    /// The pseudo-bucket accumulating observed values.
    Sum,
}

impl BucketLabel {
    /// Returns the textual row key (`"0.1"`, `"+Inf"`, `"sum"`).
    pub fn key(&self) -> String {
        match self {
            BucketLabel::Boundary(b) => format_value(*b),
            BucketLabel::Inf => INF.to_string(),
            BucketLabel::Sum => SUM.to_string(),
        }
    }
}

/// Finds the smallest boundary `b` with `value <= b`, or [`BucketLabel::Inf`].
///
/// `buckets` must be ascending, as guaranteed by [`validate`].
pub fn assign(buckets: &[f64], value: f64) -> BucketLabel {
    let idx = buckets.partition_point(|b| *b < value);
    match buckets.get(idx) {
        Some(b) => BucketLabel::Boundary(*b),
        None => BucketLabel::Inf,
    }
}

/// Rebuilds the exposition samples of one `(histogram, label values)` group.
///
/// `rows` maps bucket keys (see [`BucketLabel::key`]) to their stored delta
/// counts, plus the `sum` pseudo-bucket. Missing rows count as zero. The output
/// is one cumulative `_bucket` sample per boundary, then `+Inf`, then `_count`
/// (equal to the `+Inf` bucket) and `_sum`.
pub fn reconstruct(
    buckets: &[f64],
    label_values: &[String],
    rows: &HashMap<String, f64>,
) -> Vec<Sample> {
    let mut samples = Vec::with_capacity(buckets.len() + 3);
    let mut acc = 0.0;

    let boundaries = buckets
        .iter()
        .map(|b| BucketLabel::Boundary(*b))
        .chain(std::iter::once(BucketLabel::Inf));

    for bucket in boundaries {
        let key = bucket.key();
        acc += rows.get(&key).copied().unwrap_or(0.0);
        samples.push(Sample::new("_bucket", label_values.to_vec(), acc).with_label(LE, key));
    }

    samples.push(Sample::new("_count", label_values.to_vec(), acc));
    let sum = rows.get(SUM).copied().unwrap_or(0.0);
    samples.push(Sample::new("_sum", label_values.to_vec(), sum));
    samples
}

/// Formats a value as the shortest string that round-trips the `f64`.
///
/// Magnitudes below `1e-4` or from `1e21` up switch to exponent notation with
/// a signed, two-digit exponent (`1.5e-09`, `1e+21`). Infinities render as
/// `+Inf` / `-Inf` and NaN as `NaN`, as the text exposition format expects.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { INF.to_string() } else { "-Inf".to_string() };
    }
    if value == 0.0 {
        return format!("{value}");
    }

    // `{:e}` yields the shortest round-tripping mantissa, e.g. `1.5e-9`
    let scientific = format!("{value:e}");
    let Some((mantissa, exp)) = scientific.split_once('e') else {
        return format!("{value}");
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return format!("{value}");
    };
    if (-4..21).contains(&exp) {
        format!("{value}")
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn values(samples: &[Sample], suffix: &str) -> Vec<f64> {
        samples
            .iter()
            .filter(|s| s.suffix == suffix)
            .map(|s| s.value)
            .collect()
    }

    #[test]
    fn test_assign_boundaries() {
        let bounds = [0.1, 1.0, 5.0, 10.0];
        assert_eq!(assign(&bounds, -3.0), BucketLabel::Boundary(0.1));
        assert_eq!(assign(&bounds, 0.1), BucketLabel::Boundary(0.1));
        assert_eq!(assign(&bounds, 0.11), BucketLabel::Boundary(1.0));
        assert_eq!(assign(&bounds, 7.1), BucketLabel::Boundary(10.0));
        assert_eq!(assign(&bounds, 10.0), BucketLabel::Boundary(10.0));
        assert_eq!(assign(&bounds, 10.5), BucketLabel::Inf);
    }

    #[test]
    fn test_bucket_keys() {
        assert_eq!(BucketLabel::Boundary(1.0).key(), "1");
        assert_eq!(BucketLabel::Boundary(0.1).key(), "0.1");
        assert_eq!(BucketLabel::Boundary(7.5).key(), "7.5");
        assert_eq!(BucketLabel::Inf.key(), "+Inf");
        assert_eq!(BucketLabel::Sum.key(), "sum");
    }

    #[test]
    fn test_reconstruct_cumulative() {
        // observations 2, 13, 7.1
        let stored = rows(&[("5", 1.0), ("10", 1.0), ("+Inf", 1.0), ("sum", 22.1)]);
        let labels = vec!["lalal".to_string(), "lululu".to_string()];
        let samples = reconstruct(&[0.1, 1.0, 5.0, 10.0], &labels, &stored);

        assert_eq!(values(&samples, "_bucket"), vec![0.0, 0.0, 1.0, 2.0, 3.0]);
        assert_eq!(values(&samples, "_count"), vec![3.0]);
        assert_eq!(values(&samples, "_sum"), vec![22.1]);

        let les: Vec<_> = samples.iter().filter_map(|s| s.extra_label(LE)).collect();
        assert_eq!(les, vec!["0.1", "1", "5", "10", "+Inf"]);
        assert!(samples.iter().all(|s| s.label_values == labels));
    }

    #[test]
    fn test_reconstruct_order() {
        let samples = reconstruct(&[1.0], &[], &rows(&[("1", 2.0), ("sum", 1.0)]));
        let suffixes: Vec<_> = samples.iter().map(|s| s.suffix.as_str()).collect();
        assert_eq!(suffixes, vec!["_bucket", "_bucket", "_count", "_sum"]);
    }

    #[test]
    fn test_reconstruct_missing_rows() {
        let samples = reconstruct(&[1.0, 2.0], &[], &HashMap::new());
        assert!(samples.iter().all(|s| s.value == 0.0));
        assert_eq!(samples.len(), 5);
    }

    #[test]
    fn test_reconstruct_monotonic() {
        let stored = rows(&[("0.005", 4.0), ("0.5", 2.0), ("7.5", 9.0), ("+Inf", 1.0)]);
        let samples = reconstruct(&DEFAULT_BUCKETS, &[], &stored);
        let buckets = values(&samples, "_bucket");
        assert!(buckets.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(buckets.last(), values(&samples, "_count").first());
        assert_eq!(values(&samples, "_count"), vec![16.0]);
    }

    #[test]
    fn test_validate() {
        let no_labels: Vec<String> = Vec::new();
        assert!(validate("h", &[0.1, 1.0], &no_labels).is_ok());
        assert!(validate("h", &[], &no_labels).is_err());
        assert!(validate("h", &[1.0, 0.1], &no_labels).is_err());
        assert!(validate("h", &[1.0, 1.0], &no_labels).is_err());
        assert!(validate("h", &[1.0, f64::INFINITY], &no_labels).is_err());
        assert!(validate("h", &[f64::NAN], &no_labels).is_err());
        assert!(validate("h", &[1.0], &["le".to_string()]).is_err());
    }

    #[test]
    fn test_default_buckets_are_valid() {
        assert!(validate("h", &default_buckets(), &[]).is_ok());
        assert_eq!(DEFAULT_BUCKETS.len(), 14);
        assert_eq!(DEFAULT_BUCKETS.last(), Some(&10.0));
    }

    #[test]
    fn test_linear_and_exponential() {
        assert_eq!(linear_buckets(0.0, 0.5, 3).unwrap(), vec![0.0, 0.5, 1.0]);
        assert!(linear_buckets(0.0, 0.0, 3).is_err());
        assert!(linear_buckets(0.0, 1.0, 0).is_err());
        assert_eq!(
            exponential_buckets(0.5, 3.0, 3).unwrap(),
            vec![0.5, 1.5, 4.5]
        );
        assert!(exponential_buckets(0.0, 2.0, 3).is_err());
        assert!(exponential_buckets(1.0, 1.0, 3).is_err());
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(3.0), "3");
        assert_eq!(format_value(-1.0), "-1");
        assert_eq!(format_value(22.1), "22.1");
        assert_eq!(format_value(0.005), "0.005");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(f64::NAN), "NaN");
    }

    #[test]
    fn test_format_value_exponent() {
        assert_eq!(format_value(1e21), "1e+21");
        assert_eq!(format_value(1e300), "1e+300");
        assert_eq!(format_value(-2.5e22), "-2.5e+22");
        assert_eq!(format_value(1.5e-9), "1.5e-09");
        assert_eq!(format_value(0.00001), "1e-05");
        assert_eq!(format_value(f64::MIN_POSITIVE), "2.2250738585072014e-308");

        // plain notation inside the window
        assert_eq!(format_value(0.0001), "0.0001");
        assert_eq!(format_value(1e20), "100000000000000000000");
        assert_eq!(format_value(1000000.0), "1000000");
        assert_eq!(format_value(0.0), "0");
    }

    #[test]
    fn test_small_exponential_bucket_keys() {
        let bounds = exponential_buckets(1e-9, 10.0, 3).unwrap();
        let keys: Vec<_> = bounds.iter().map(|b| BucketLabel::Boundary(*b).key()).collect();
        assert_eq!(keys, vec!["1e-09", "1e-08", "1e-07"]);

        let stored = rows(&[("1e-08", 2.0), ("+Inf", 1.0)]);
        let samples = reconstruct(&bounds, &[], &stored);
        assert_eq!(values(&samples, "_bucket"), vec![0.0, 2.0, 2.0, 3.0]);
    }
}
