//! Histogram handle.

use tracing::trace;

use super::{Handle, Metric};
use crate::error::Result;
use crate::metric::Descriptor;
use crate::storage::Observation;

/// A bucketed distribution of observed values.
///
/// Each observation is stored as one increment of the matching bucket plus an
/// increment of the running sum; cumulative buckets are rebuilt at collection
/// time (see [`buckets`](crate::buckets)).
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use registro::registry::CollectorRegistry;
/// use registro::storage::InMemory;
///
/// let registry = CollectorRegistry::new(Arc::new(InMemory::new()));
/// let latency = registry
///     .register_histogram("rpc", "latency_seconds", "RPC latency", &[], Some(vec![0.1, 1.0]))
///     .unwrap();
///
/// latency.observe(0.05, &[]).unwrap();
/// latency.observe(0.7, &[]).unwrap();
///
/// let families = registry.collect().unwrap();
/// let count = families[0].sample("_count", &[]).unwrap();
/// assert_eq!(count.value, 2.0);
/// ```
#[derive(Debug, Clone)]
pub struct Histogram {
    handle: Handle,
}

impl Histogram {
    pub(crate) fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Returns the registered boundaries, ascending, without `+Inf`.
    pub fn buckets(&self) -> &[f64] {
        self.handle.descriptor().buckets().unwrap_or_default()
    }

    /// Records `value` for the series identified by `label_values`.
    ///
    /// `value` must be finite.
    pub fn observe(&self, value: f64, label_values: &[&str]) -> Result<()> {
        let descriptor = self.handle.descriptor();
        descriptor.check_arity(label_values)?;
        self.handle.check_finite(value)?;
        trace!(name = descriptor.qualified_name(), value, "histogram observation");
        self.handle.adapter().update_histogram(&Observation {
            name: descriptor.qualified_name(),
            help: descriptor.help(),
            label_names: descriptor.label_names(),
            label_values,
            buckets: self.buckets(),
            value,
        })
    }
}

impl Metric for Histogram {
    fn descriptor(&self) -> &Descriptor {
        self.handle.descriptor()
    }
}
