//! Snapshot types returned by collection.
//!
//! [`MetricFamily`] is the unit produced by
//! [`Adapter::collect`](crate::storage::Adapter::collect) and consumed by the
//! observers. A [`Snapshot`] bundles the families of one collection pass with
//! an optional timestamp. All types serialise with serde, so a snapshot can be
//! shipped over HTTP, written to a file or handed to another process.
//!
//! # Examples
//!
//! ```rust
//! use registro::metric::MetricKind;
//! use registro::snapshot::{MetricFamily, Sample, Snapshot};
//!
//! let family = MetricFamily {
//!     name: "requests".to_string(),
//!     help: "Total requests".to_string(),
//!     kind: MetricKind::Counter,
//!     label_names: vec!["method".to_string()],
//!     buckets: None,
//!     samples: vec![Sample::new("", vec!["GET".to_string()], 3.0)],
//! };
//!
//! let snapshot = Snapshot::new(vec![family]);
//! assert_eq!(snapshot.get("requests").unwrap().samples[0].value, 3.0);
//! ```

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::metric::MetricKind;

/// One data point of a metric family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Appended to the family name: empty for scalars, `_bucket`, `_count`
    /// or `_sum` for histograms.
    pub suffix: String,
    /// Values positionally matching the family's label names.
    pub label_values: Vec<String>,
    /// Sample-specific labels rendered after the family labels (`le`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_labels: Vec<(String, String)>,
    /// The numeric value.
    pub value: f64,
}

impl Sample {
    /// Creates a sample without extra labels.
    pub fn new(suffix: impl Into<String>, label_values: Vec<String>, value: f64) -> Self {
        Self {
            suffix: suffix.into(),
            label_values,
            extra_labels: Vec::new(),
            value,
        }
    }

    /// Adds a sample-specific label.
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_labels.push((name.into(), value.into()));
        self
    }

    /// Returns the value of a sample-specific label.
    pub fn extra_label(&self, name: &str) -> Option<&str> {
        self.extra_labels
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A metric family with its help text and ordered samples.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricFamily {
    /// Qualified name (`namespace_name`).
    pub name: String,
    /// Help text of the first registration.
    pub help: String,
    /// Metric kind.
    pub kind: MetricKind,
    /// Ordered label names.
    pub label_names: Vec<String>,
    /// Ascending bucket boundaries without `+Inf` (histograms only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<f64>>,
    /// Samples in exposition order.
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    /// Returns the first sample with the given suffix and label values.
    pub fn sample(&self, suffix: &str, label_values: &[&str]) -> Option<&Sample> {
        self.samples
            .iter()
            .find(|s| s.suffix == suffix && same_values(&s.label_values, label_values))
    }

    /// Global family order: qualified name, label arity, label names, kind.
    pub fn order(&self, other: &Self) -> Ordering {
        family_order(
            (self.name.as_str(), self.label_names.as_slice(), self.kind),
            (other.name.as_str(), other.label_names.as_slice(), other.kind),
        )
    }
}

fn same_values(stored: &[String], wanted: &[&str]) -> bool {
    stored.len() == wanted.len() && stored.iter().zip(wanted).all(|(a, b)| a.as_str() == *b)
}

/// Compares two `(name, label names, kind)` family keys.
pub(crate) fn family_order(
    a: (&str, &[String], MetricKind),
    b: (&str, &[String], MetricKind),
) -> Ordering {
    a.0.cmp(b.0)
        .then_with(|| a.1.len().cmp(&b.1.len()))
        .then_with(|| a.1.cmp(b.1))
        .then_with(|| a.2.cmp(&b.2))
}

/// The families gathered by one collection pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Optional timestamp in milliseconds since Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    /// Families in collection order.
    pub families: Vec<MetricFamily>,
}

impl Snapshot {
    /// Creates a snapshot without a timestamp.
    pub fn new(families: Vec<MetricFamily>) -> Self {
        Self {
            timestamp_ms: None,
            families,
        }
    }

    /// Creates a snapshot stamped with `timestamp_ms`.
    pub fn with_timestamp(families: Vec<MetricFamily>, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            families,
        }
    }

    /// Finds the first family with the given qualified name.
    pub fn get(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    /// Returns the total number of samples across all families.
    pub fn sample_count(&self) -> usize {
        self.families.iter().map(|f| f.samples.len()).sum()
    }
}

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub(crate) fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(name: &str, labels: &[&str], kind: MetricKind) -> MetricFamily {
        MetricFamily {
            name: name.to_string(),
            help: "help".to_string(),
            kind,
            label_names: labels.iter().map(|l| l.to_string()).collect(),
            buckets: None,
            samples: Vec::new(),
        }
    }

    #[test]
    fn test_order_by_arity_before_names() {
        let none = family("m", &[], MetricKind::Gauge);
        let one = family("m", &["foo"], MetricKind::Gauge);
        let two = family("m", &["foo", "bar"], MetricKind::Gauge);

        let mut families = vec![two.clone(), none.clone(), one.clone()];
        families.sort_by(MetricFamily::order);
        assert_eq!(families, vec![none, one, two]);
    }

    #[test]
    fn test_order_by_name_first() {
        let a = family("a", &["x", "y"], MetricKind::Histogram);
        let b = family("b", &[], MetricKind::Counter);
        assert_eq!(a.order(&b), Ordering::Less);
    }

    #[test]
    fn test_sample_lookup() {
        let mut f = family("m", &["foo"], MetricKind::Gauge);
        f.samples.push(Sample::new("", vec!["x".into()], 1.0));
        f.samples.push(Sample::new("", vec!["y".into()], 2.0));
        assert_eq!(f.sample("", &["y"]).unwrap().value, 2.0);
        assert!(f.sample("", &["z"]).is_none());
    }

    #[test]
    fn test_extra_label() {
        let s = Sample::new("_bucket", vec![], 1.0).with_label("le", "+Inf");
        assert_eq!(s.extra_label("le"), Some("+Inf"));
        assert_eq!(s.extra_label("foo"), None);
    }

    #[test]
    fn test_snapshot_get_and_count() {
        let mut f = family("m", &[], MetricKind::Counter);
        f.samples.push(Sample::new("", vec![], 1.0));
        let snapshot = Snapshot::with_timestamp(vec![f], 1234567890);
        assert_eq!(snapshot.timestamp_ms, Some(1234567890));
        assert!(snapshot.get("m").is_some());
        assert!(snapshot.get("n").is_none());
        assert_eq!(snapshot.sample_count(), 1);
    }

    #[test]
    fn test_serialize_snapshot() {
        let mut f = family("m", &[], MetricKind::Histogram);
        f.samples
            .push(Sample::new("_bucket", vec![], 1.0).with_label("le", "+Inf"));
        let snapshot = Snapshot::new(vec![f]);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("timestamp_ms"));
        assert!(json.contains("\"kind\":\"histogram\""));
        assert!(json.contains("+Inf"));

        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
