//! Metric identities and descriptors.
//!
//! A metric family is identified by its namespace, name and [`MetricKind`].
//! The first registration of an identity fixes its help text, its ordered
//! label names and, for histograms, its bucket boundaries. All of that is
//! captured in a [`Descriptor`], which metric handles share through an `Arc`.
//!
//! # Examples
//!
//! ```rust
//! use registro::metric::{MetricIdentity, MetricKind};
//!
//! let id = MetricIdentity::new("test", "some_metric", MetricKind::Gauge);
//! assert_eq!(id.qualified_name(), "test_some_metric");
//!
//! let bare = MetricIdentity::new("", "some_quick_counter", MetricKind::Counter);
//! assert_eq!(bare.qualified_name(), "some_quick_counter");
//! ```

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The type of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonically increasing value, reset only explicitly.
    Counter,
    /// Value that can go up and down or be set directly.
    Gauge,
    /// Bucketed distribution of observations.
    Histogram,
}

impl MetricKind {
    /// Returns the exposition name of this kind (`counter`, `gauge`, `histogram`).
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            "histogram" => Ok(MetricKind::Histogram),
            other => Err(Error::backend(format!("unknown metric kind `{other}`"))),
        }
    }
}

/// The `(namespace, name, kind)` triple naming a metric family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricIdentity {
    namespace: String,
    name: String,
    kind: MetricKind,
}

impl MetricIdentity {
    /// Creates a new identity.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            kind,
        }
    }

    /// Returns the namespace (possibly empty).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the unqualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the metric kind.
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Returns `namespace_name`, or just `name` when the namespace is empty.
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.namespace, &self.name)
    }
}

/// Joins a namespace and a name the way exposition expects.
pub(crate) fn qualified_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}_{name}")
    }
}

/// Everything fixed by the first registration of a metric family.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    identity: MetricIdentity,
    qualified: String,
    help: String,
    label_names: Vec<String>,
    buckets: Option<Vec<f64>>,
}

impl Descriptor {
    /// Creates a descriptor. Histogram descriptors carry their boundaries.
    pub(crate) fn new(
        identity: MetricIdentity,
        help: impl Into<String>,
        label_names: Vec<String>,
        buckets: Option<Vec<f64>>,
    ) -> Self {
        let qualified = identity.qualified_name();
        Self {
            identity,
            qualified,
            help: help.into(),
            label_names,
            buckets,
        }
    }

    /// Returns the identity of this family.
    pub fn identity(&self) -> &MetricIdentity {
        &self.identity
    }

    /// Returns the qualified name.
    pub fn qualified_name(&self) -> &str {
        &self.qualified
    }

    /// Returns the metric kind.
    pub fn kind(&self) -> MetricKind {
        self.identity.kind
    }

    /// Returns the help text of the first registration.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Returns the ordered label names.
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Returns the bucket boundaries (histograms only), ascending, without `+Inf`.
    pub fn buckets(&self) -> Option<&[f64]> {
        self.buckets.as_deref()
    }

    /// Checks that `label_values` positionally matches the label names.
    pub fn check_arity(&self, label_values: &[&str]) -> Result<()> {
        if label_values.len() != self.label_names.len() {
            return Err(Error::ArityMismatch {
                name: self.qualified.clone(),
                expected: self.label_names.len(),
                actual: label_values.len(),
            });
        }
        Ok(())
    }
}

/// Validates the names passed to a registration call.
pub(crate) fn validate_names(name: &str, label_names: &[String]) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidConfiguration(
            "metric name must not be empty".into(),
        ));
    }
    for (i, label) in label_names.iter().enumerate() {
        if label.is_empty() {
            return Err(Error::InvalidConfiguration(format!(
                "label name #{i} of `{name}` is empty"
            )));
        }
        if label_names[..i].contains(label) {
            return Err(Error::InvalidConfiguration(format!(
                "label name `{label}` appears twice in `{name}`"
            )));
        }
    }
    Ok(())
}

/// Converts borrowed label values into owned strings.
pub(crate) fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [MetricKind::Counter, MetricKind::Gauge, MetricKind::Histogram] {
            assert_eq!(kind.as_str().parse::<MetricKind>().unwrap(), kind);
        }
        assert!("summary".parse::<MetricKind>().is_err());
    }

    #[test]
    fn test_qualified_name() {
        let id = MetricIdentity::new("test", "some_metric", MetricKind::Counter);
        assert_eq!(id.qualified_name(), "test_some_metric");
        assert_eq!(id.namespace(), "test");
        assert_eq!(id.name(), "some_metric");
    }

    #[test]
    fn test_qualified_name_without_namespace() {
        let id = MetricIdentity::new("", "some_quick_counter", MetricKind::Counter);
        assert_eq!(id.qualified_name(), "some_quick_counter");
    }

    #[test]
    fn test_check_arity() {
        let desc = Descriptor::new(
            MetricIdentity::new("test", "m", MetricKind::Gauge),
            "help",
            vec!["foo".into(), "bar".into()],
            None,
        );
        assert!(desc.check_arity(&["a", "b"]).is_ok());
        match desc.check_arity(&["a"]) {
            Err(Error::ArityMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_validate_names() {
        assert!(validate_names("m", &["a".into(), "b".into()]).is_ok());
        assert!(validate_names("", &[]).is_err());
        assert!(validate_names("m", &["a".into(), "a".into()]).is_err());
        assert!(validate_names("m", &["".into()]).is_err());
    }
}
